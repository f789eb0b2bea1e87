//! Show specification decoding.
//!
//! The show container itself is produced elsewhere; this module decodes the
//! JSON show specification it carries and optionally hands the raw buffer back
//! to the caller without copying it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::distances::Point;
use crate::{Error, Result};

/// Options for [`decode_show_archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeOptions {
    /// Move the input buffer into [`ShowArchive::blob`].
    #[serde(default)]
    pub return_blob: bool,
}

/// A decoded show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowArchive {
    /// The show specification document.
    pub spec: Value,
    /// The original bytes, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Vec<u8>>,
}

impl ShowArchive {
    /// Format version declared by the specification, if any.
    pub fn version(&self) -> Option<u64> {
        self.spec.get("version").and_then(Value::as_u64)
    }

    /// Number of drones in `swarm.drones`.
    pub fn drone_count(&self) -> usize {
        self.drones().map(|d| d.len()).unwrap_or(0)
    }

    /// Planned takeoff positions (`swarm.drones[*].settings.home`, XY only).
    ///
    /// Drones without a usable home position are skipped, so the result can
    /// be shorter than [`ShowArchive::drone_count`].
    pub fn home_positions(&self) -> Vec<Point> {
        self.drones()
            .map(|drones| {
                drones
                    .iter()
                    .filter_map(|drone| {
                        let home = drone.pointer("/settings/home")?.as_array()?;
                        let x = home.first()?.as_f64()?;
                        let y = home.get(1)?.as_f64()?;
                        Some([x, y])
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn drones(&self) -> Option<&Vec<Value>> {
        self.spec.pointer("/swarm/drones")?.as_array()
    }
}

/// Decode a show specification from `bytes`.
///
/// The buffer must hold a UTF-8 JSON object. A `version` field, when present,
/// must be a positive integer.
///
/// # Errors
/// [`Error::ShowDecode`] for malformed input.
pub fn decode_show_archive(bytes: Vec<u8>, options: DecodeOptions) -> Result<ShowArchive> {
    if bytes.is_empty() {
        return Err(Error::ShowDecode("show archive is empty".to_string()));
    }

    let spec: Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::ShowDecode(format!("invalid show specification: {}", e)))?;

    if !spec.is_object() {
        return Err(Error::ShowDecode(
            "show specification must be a JSON object".to_string(),
        ));
    }

    if let Some(version) = spec.get("version") {
        match version.as_u64() {
            Some(v) if v > 0 => {}
            _ => {
                return Err(Error::ShowDecode(format!(
                    "unsupported show specification version: {}",
                    version
                )))
            }
        }
    }

    Ok(ShowArchive {
        spec,
        blob: options.return_blob.then_some(bytes),
    })
}
