//! The registry of worker functions.
//!
//! Every function a worker can run is a variant of [`TaskCall`], which owns
//! its arguments. [`TaskCall::from_json`] is the string-keyed entry point used
//! when calls arrive as a function name plus JSON arguments.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assignment::assign_points_with_cancel;
use crate::cancel::CancelToken;
use crate::coordinate_frame::{fit_show_coordinate_frame, CoordinateFrame};
use crate::distances::{metric_by_name, DistanceMetric, Point};
use crate::matching::{solve_assignment_with_cancel, Assignment, CostMatrix, MatchingOptions};
use crate::show::{decode_show_archive, DecodeOptions, ShowArchive};
use crate::{Error, Result};

/// Names of the registered worker functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFunction {
    SolveAssignment,
    AssignPoints,
    DecodeShowArchive,
    FitShowCoordinateFrame,
}

impl WorkerFunction {
    pub const ALL: [WorkerFunction; 4] = [
        WorkerFunction::SolveAssignment,
        WorkerFunction::AssignPoints,
        WorkerFunction::DecodeShowArchive,
        WorkerFunction::FitShowCoordinateFrame,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WorkerFunction::SolveAssignment => "solve_assignment",
            WorkerFunction::AssignPoints => "assign_points",
            WorkerFunction::DecodeShowArchive => "decode_show_archive",
            WorkerFunction::FitShowCoordinateFrame => "fit_show_coordinate_frame",
        }
    }

    /// Argument names, in positional order.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            WorkerFunction::SolveAssignment => &["matrix", "options"],
            WorkerFunction::AssignPoints => &["sources", "targets", "metric", "options"],
            WorkerFunction::DecodeShowArchive => &["bytes", "options"],
            WorkerFunction::FitShowCoordinateFrame => {
                &["gpsPositions", "headings", "localTakeoffPoints"]
            }
        }
    }
}

impl fmt::Display for WorkerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkerFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WorkerFunction::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| Error::UnknownFunction(s.to_string()))
    }
}

/// A call to a registered worker function, owning its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCall {
    SolveAssignment {
        matrix: CostMatrix,
        options: MatchingOptions,
    },
    AssignPoints {
        sources: Vec<Point>,
        targets: Vec<Point>,
        metric: DistanceMetric,
        options: MatchingOptions,
    },
    DecodeShowArchive {
        bytes: Vec<u8>,
        options: DecodeOptions,
    },
    FitShowCoordinateFrame {
        gps_positions: Vec<Point>,
        headings: Vec<f64>,
        local_takeoff_points: Vec<Point>,
    },
}

impl TaskCall {
    pub fn function(&self) -> WorkerFunction {
        match self {
            TaskCall::SolveAssignment { .. } => WorkerFunction::SolveAssignment,
            TaskCall::AssignPoints { .. } => WorkerFunction::AssignPoints,
            TaskCall::DecodeShowArchive { .. } => WorkerFunction::DecodeShowArchive,
            TaskCall::FitShowCoordinateFrame { .. } => WorkerFunction::FitShowCoordinateFrame,
        }
    }

    /// Build a call from a function name and JSON arguments.
    ///
    /// `args` is either an object keyed by parameter name or an array of
    /// positional arguments (see [`WorkerFunction::parameters`]). Matching
    /// options are read with [`MatchingOptions::from_json`]; a show archive
    /// may be passed as an array of bytes or as a string.
    ///
    /// # Errors
    /// - [`Error::UnknownFunction`] for an unregistered name
    /// - [`Error::InvalidArguments`] for arguments of the wrong shape
    /// - [`Error::UnknownAlgorithm`] / [`Error::UnknownMetric`] for bad option values
    pub fn from_json(name: &str, args: Value) -> Result<Self> {
        let function: WorkerFunction = name.parse()?;
        let args = named_arguments(function, args)?;

        let call = match function {
            WorkerFunction::SolveAssignment => {
                let args: SolveAssignmentArgs = parse_arguments(function, args)?;
                TaskCall::SolveAssignment {
                    matrix: args.matrix,
                    options: matching_options(&args.options)?,
                }
            }
            WorkerFunction::AssignPoints => {
                let args: AssignPointsArgs = parse_arguments(function, args)?;
                let metric = match args.metric.as_deref() {
                    Some(name) => metric_by_name(name)?,
                    None => DistanceMetric::Euclidean,
                };
                TaskCall::AssignPoints {
                    sources: args.sources,
                    targets: args.targets,
                    metric,
                    options: matching_options(&args.options)?,
                }
            }
            WorkerFunction::DecodeShowArchive => {
                let args: DecodeShowArchiveArgs = parse_arguments(function, args)?;
                TaskCall::DecodeShowArchive {
                    bytes: args.bytes.into_bytes(),
                    options: args.options.unwrap_or_default(),
                }
            }
            WorkerFunction::FitShowCoordinateFrame => {
                let args: FitShowCoordinateFrameArgs = parse_arguments(function, args)?;
                TaskCall::FitShowCoordinateFrame {
                    gps_positions: args.gps_positions,
                    // JSON has no NaN; a missing heading is null
                    headings: args
                        .headings
                        .unwrap_or_default()
                        .into_iter()
                        .map(|h| h.unwrap_or(f64::NAN))
                        .collect(),
                    local_takeoff_points: args.local_takeoff_points,
                }
            }
        };
        Ok(call)
    }

    /// Contract checks that can run before the call is queued.
    ///
    /// Any error returned here is the same error the call would fail with
    /// when executed.
    pub fn validate(&self) -> Result<()> {
        match self {
            TaskCall::SolveAssignment { matrix, .. } => matrix.validate(),
            _ => Ok(()),
        }
    }

    /// Run the call on the current thread.
    pub fn run(self) -> Result<TaskOutput> {
        self.execute(&CancelToken::new())
    }

    pub(crate) fn execute(self, cancel: &CancelToken) -> Result<TaskOutput> {
        cancel.check()?;
        match self {
            TaskCall::SolveAssignment { matrix, options } => {
                solve_assignment_with_cancel(&matrix, &options, cancel)
                    .map(TaskOutput::SolveAssignment)
            }
            TaskCall::AssignPoints {
                sources,
                targets,
                metric,
                options,
            } => assign_points_with_cancel(&sources, &targets, &metric, &options, cancel)
                .map(TaskOutput::AssignPoints),
            TaskCall::DecodeShowArchive { bytes, options } => {
                decode_show_archive(bytes, options).map(TaskOutput::DecodeShowArchive)
            }
            TaskCall::FitShowCoordinateFrame {
                gps_positions,
                headings,
                local_takeoff_points,
            } => Ok(TaskOutput::FitShowCoordinateFrame(fit_show_coordinate_frame(
                &gps_positions,
                &headings,
                &local_takeoff_points,
            ))),
        }
    }
}

/// Result of a [`TaskCall`], one variant per worker function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function", content = "result", rename_all = "snake_case")]
pub enum TaskOutput {
    SolveAssignment(Assignment),
    AssignPoints(Assignment),
    DecodeShowArchive(ShowArchive),
    FitShowCoordinateFrame(Option<CoordinateFrame>),
}

impl TaskOutput {
    pub fn function(&self) -> WorkerFunction {
        match self {
            TaskOutput::SolveAssignment(_) => WorkerFunction::SolveAssignment,
            TaskOutput::AssignPoints(_) => WorkerFunction::AssignPoints,
            TaskOutput::DecodeShowArchive(_) => WorkerFunction::DecodeShowArchive,
            TaskOutput::FitShowCoordinateFrame(_) => WorkerFunction::FitShowCoordinateFrame,
        }
    }

    pub fn into_assignment(self) -> Result<Assignment> {
        match self {
            TaskOutput::SolveAssignment(a) | TaskOutput::AssignPoints(a) => Ok(a),
            other => Err(unexpected("assignment", &other)),
        }
    }

    pub fn into_show_archive(self) -> Result<ShowArchive> {
        match self {
            TaskOutput::DecodeShowArchive(archive) => Ok(archive),
            other => Err(unexpected("show archive", &other)),
        }
    }

    pub fn into_coordinate_frame(self) -> Result<Option<CoordinateFrame>> {
        match self {
            TaskOutput::FitShowCoordinateFrame(frame) => Ok(frame),
            other => Err(unexpected("coordinate frame", &other)),
        }
    }
}

fn unexpected(expected: &'static str, got: &TaskOutput) -> Error {
    Error::UnexpectedOutput {
        expected,
        got: got.function().name(),
    }
}

// =============================================================================
// JSON arguments
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SolveAssignmentArgs {
    matrix: CostMatrix,
    #[serde(default)]
    options: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AssignPointsArgs {
    sources: Vec<Point>,
    targets: Vec<Point>,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    options: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DecodeShowArchiveArgs {
    bytes: ArchiveBytes,
    #[serde(default)]
    options: Option<DecodeOptions>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArchiveBytes {
    Raw(Vec<u8>),
    Text(String),
}

impl ArchiveBytes {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            ArchiveBytes::Raw(bytes) => bytes,
            ArchiveBytes::Text(text) => text.into_bytes(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FitShowCoordinateFrameArgs {
    gps_positions: Vec<Point>,
    #[serde(default)]
    headings: Option<Vec<Option<f64>>>,
    local_takeoff_points: Vec<Point>,
}

/// Turn positional arguments into an object keyed by parameter name.
fn named_arguments(function: WorkerFunction, args: Value) -> Result<Value> {
    match args {
        Value::Object(_) => Ok(args),
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Array(values) => {
            let parameters = function.parameters();
            if values.len() > parameters.len() {
                return Err(Error::InvalidArguments(format!(
                    "{} takes at most {} arguments, got {}",
                    function,
                    parameters.len(),
                    values.len()
                )));
            }
            Ok(Value::Object(
                parameters
                    .iter()
                    .map(|p| p.to_string())
                    .zip(values)
                    .collect(),
            ))
        }
        other => Err(Error::InvalidArguments(format!(
            "{} expects an object or an array of arguments, got {}",
            function, other
        ))),
    }
}

fn parse_arguments<A: DeserializeOwned>(function: WorkerFunction, args: Value) -> Result<A> {
    serde_json::from_value(args)
        .map_err(|e| Error::InvalidArguments(format!("{}: {}", function, e)))
}

fn matching_options(value: &Value) -> Result<MatchingOptions> {
    if value.is_null() {
        Ok(MatchingOptions::default())
    } else {
        MatchingOptions::from_json(value)
    }
}
