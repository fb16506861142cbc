//! Per-run shared state threaded through the orchestrator, the
//! step engine, and executor invocations.

use crate::history::ExecutionHistory;
use std::collections::HashMap;
use std::sync::RwLock;

/// State created once per suite run: the global variable map and
/// the execution history. Nothing here outlives the run, so
/// concurrent runs in one process cannot leak entries into each
/// other.
#[derive(Debug, Default)]
pub struct RunContext {
    globals: RwLock<HashMap<String, String>>,
    pub history: ExecutionHistory,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from operator-supplied variable overrides (`--var`).
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self {
            globals: RwLock::new(overrides),
            history: ExecutionHistory::new(),
        }
    }

    /// Merge suite-declared variables in. Values already present
    /// (operator overrides) are kept.
    pub fn seed_suite_vars(&self, vars: &HashMap<String, String>) {
        let mut globals =
            self.globals.write().expect("globals lock poisoned");
        for (key, value) in vars {
            globals
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Merge values in, replacing existing keys. Used for setup
    /// executor outputs, which always win.
    pub fn merge_globals(&self, vars: &HashMap<String, String>) {
        let mut globals =
            self.globals.write().expect("globals lock poisoned");
        for (key, value) in vars {
            globals.insert(key.clone(), value.clone());
        }
    }

    /// Snapshot of the global map for one resolution pass.
    pub fn globals(&self) -> HashMap<String, String> {
        self.globals
            .read()
            .expect("globals lock poisoned")
            .clone()
    }

    pub fn get_global(&self, key: &str) -> Option<String> {
        self.globals
            .read()
            .expect("globals lock poisoned")
            .get(key)
            .cloned()
    }
}
