//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::JsError;

/// Default wall-clock budget per top-level invocation (3 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default limit on nested frames plus native contexts
pub const DEFAULT_MAX_CALL_DEPTH: usize = 4096;

/// Tunables for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget per top-level invocation in milliseconds, 0 disables
    pub timeout_ms: u64,
    /// Combined bytecode frames and nested native contexts
    pub max_call_depth: usize,
    /// Instructions between periodic weak-collection sweeps, 0 sweeps only at
    /// the end of a top-level invocation
    pub weak_sweep_interval: u32,
    /// Instructions between interrupt and timeout polls
    pub interrupt_check_interval: u32,
    /// Allocations after which the end of a top-level invocation also
    /// collects reference cycles, 0 collects only on `checkpoint()`
    pub cycle_collection_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            weak_sweep_interval: 8192,
            interrupt_check_interval: 256,
            cycle_collection_threshold: 4096,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(source: &str) -> Result<Self, JsError> {
        let config: EngineConfig = serde_json::from_str(source)
            .map_err(|e| JsError::type_error(format!("Invalid engine config: {}", e)))?;
        Ok(config.normalized())
    }

    /// Defaults overridden by `ECMARUN_*` environment variables
    pub fn from_env() -> Result<Self, JsError> {
        let mut config = EngineConfig::default();
        if let Some(value) = read_env("ECMARUN_TIMEOUT_MS")? {
            config.timeout_ms = value;
        }
        if let Some(value) = read_env("ECMARUN_MAX_CALL_DEPTH")? {
            config.max_call_depth = value;
        }
        if let Some(value) = read_env("ECMARUN_WEAK_SWEEP_INTERVAL")? {
            config.weak_sweep_interval = value;
        }
        if let Some(value) = read_env("ECMARUN_CYCLE_COLLECTION_THRESHOLD")? {
            config.cycle_collection_threshold = value;
        }
        Ok(config.normalized())
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.interrupt_check_interval == 0 {
            self.interrupt_check_interval = 1;
        }
        self
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, JsError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| JsError::type_error(format!("{} must be a non-negative integer, got {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
