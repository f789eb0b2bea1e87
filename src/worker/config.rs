//! Worker pool configuration.
//!
//! ## Environment
//!
//! - `SWARM_MAX_WORKERS`: number of worker threads (default: 8)
//! - `SWARM_WORKER_STACK_SIZE`: stack size per worker in bytes, decimal or `0x` hex
//!   (default: the platform default)

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default number of worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default prefix of worker thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "swarm-worker";

const ENV_MAX_WORKERS: &str = "SWARM_MAX_WORKERS";
const ENV_STACK_SIZE: &str = "SWARM_WORKER_STACK_SIZE";

/// Configuration for a [`crate::WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, and the maximum number of tasks running at once.
    pub max_workers: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size of each worker thread; `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl PoolConfig {
    /// Create a configuration with `max_workers` threads and default naming.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Self::default()
        }
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let max_workers = std::env::var(ENV_MAX_WORKERS)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_WORKERS);

        let stack_size = std::env::var(ENV_STACK_SIZE)
            .ok()
            .and_then(|s| parse_size(&s));

        Self {
            max_workers,
            stack_size,
            ..Self::default()
        }
    }

    /// Check that the configuration can start a pool.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(Error::InvalidConfig(
                "thread_name_prefix must not contain NUL bytes".to_string(),
            ));
        }
        if self.stack_size == Some(0) {
            return Err(Error::InvalidConfig("stack_size must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

/// Parse a byte count written in decimal or `0x`-prefixed hex.
fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
