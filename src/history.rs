//! Registry of outputs recorded by work that has already
//! executed in the current run.

use std::collections::HashMap;
use std::sync::RwLock;

/// Name-keyed registry of output mappings, appended to as steps
/// complete and read by every later placeholder resolution.
///
/// Two namespaces exist: test-case entries (keyed by a test-case
/// name or a qualified `<testcase>.<stepType>`) and executor-step
/// entries (keyed by the executor step's name). Re-recording a
/// name replaces the previous entry (last write wins), so a
/// reference by name always sees the latest execution.
///
/// Interior locking keeps the registry safe when a host process
/// drives several runs at once; within one run all access is
/// sequential.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    steps: RwLock<HashMap<String, HashMap<String, String>>>,
    executor_steps: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) a test-case namespace entry.
    pub fn record_step(&self, name: &str, output: &HashMap<String, String>) {
        self.steps
            .write()
            .expect("step registry lock poisoned")
            .insert(name.to_string(), output.clone());
    }

    /// Record (or replace) an executor-step namespace entry.
    pub fn record_executor_step(
        &self,
        name: &str,
        output: &HashMap<String, String>,
    ) {
        self.executor_steps
            .write()
            .expect("executor step registry lock poisoned")
            .insert(name.to_string(), output.clone());
    }

    /// Resolve `entry.field` against both namespaces, test-case
    /// entries first. A known entry without the field is a miss.
    pub fn lookup(&self, entry: &str, field: &str) -> Option<String> {
        if let Some(output) = self
            .steps
            .read()
            .expect("step registry lock poisoned")
            .get(entry)
        {
            return output.get(field).cloned();
        }
        self.executor_steps
            .read()
            .expect("executor step registry lock poisoned")
            .get(entry)?
            .get(field)
            .cloned()
    }

    /// Whether either namespace has recorded `entry`.
    pub fn contains(&self, entry: &str) -> bool {
        self.steps
            .read()
            .expect("step registry lock poisoned")
            .contains_key(entry)
            || self
                .executor_steps
                .read()
                .expect("executor step registry lock poisoned")
                .contains_key(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_lookup_finds_recorded_field() {
        let history = ExecutionHistory::new();
        history.record_step("login case", &output(&[("token", "abc123")]));
        assert_eq!(
            history.lookup("login case", "token").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_lookup_missing_entry_is_none() {
        let history = ExecutionHistory::new();
        assert!(history.lookup("never-ran", "field").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let history = ExecutionHistory::new();
        history.record_executor_step("login", &output(&[("token", "old")]));
        history.record_executor_step("login", &output(&[("token", "new")]));
        assert_eq!(history.lookup("login", "token").as_deref(), Some("new"));
    }

    #[test]
    fn test_step_namespace_shadows_executor_namespace() {
        let history = ExecutionHistory::new();
        history.record_step("shared", &output(&[("v", "from-steps")]));
        history.record_executor_step("shared", &output(&[("v", "from-exec")]));
        assert_eq!(
            history.lookup("shared", "v").as_deref(),
            Some("from-steps")
        );
    }

    #[test]
    fn test_known_entry_unknown_field_is_none() {
        let history = ExecutionHistory::new();
        history.record_step("case", &output(&[("a", "1")]));
        assert!(history.lookup("case", "b").is_none());
    }

    #[test]
    fn test_contains_checks_both_namespaces() {
        let history = ExecutionHistory::new();
        history.record_executor_step("exec-step", &output(&[]));
        assert!(history.contains("exec-step"));
        assert!(!history.contains("other"));
    }
}
