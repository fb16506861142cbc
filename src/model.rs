//! Data model for test-suite documents, executor libraries, and
//! run reports.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A test-suite document: suite variables, optional setup steps,
/// and an ordered list of test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    /// Suite-level variables, merged into the global scope at
    /// suite start.
    #[serde(default)]
    pub vars: HashMap<String, String>,
    #[serde(default)]
    pub setup: Option<Setup>,
    #[serde(default)]
    pub testcases: Vec<Testcase>,
}

/// Suite-level steps run once before any test case. Their
/// executor outputs become global variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Setup {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A named, ordered sequence of steps. The name doubles as the
/// key under which the case's cumulative result is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Testcase {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One executable unit: either a direct HTTP call (`type: HTTP`)
/// or an invocation of a named executor. The same shape serves
/// test-case steps and executor-internal steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// The HTTP marker or the name of an executor to invoke.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Optional step identifier; executor steps are recorded
    /// under this name (falling back to `type`) so later steps
    /// can address their outputs.
    #[serde(default)]
    pub name: Option<String>,
    /// Variable templates resolved after the step executes.
    #[serde(default)]
    pub vars: HashMap<String, String>,
    /// Input templates, seeded with global variables and
    /// forwarded to an invoked executor.
    #[serde(default)]
    pub input: HashMap<String, String>,
    /// Assertion expressions, handed to the assertion hook slot.
    /// The engine itself never interprets them.
    #[serde(default)]
    pub assertions: Vec<String>,

    // ── HTTP step fields ────────────────────────────────
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,

    /// Log-line templates, resolved and emitted after the step
    /// completes. Informational only.
    #[serde(default)]
    pub log: Vec<String>,
}

/// What one step produced: HTTP response fields for HTTP steps,
/// and an output mapping (HTTP-derived fields or a nested
/// executor's resolved output) addressable by later steps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepResult {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub output: HashMap<String, String>,
}

/// A reusable library of steps with declared input defaults and
/// output templates. The `executor` name is matched against step
/// `type` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executor {
    pub executor: String,
    /// Input defaults; the caller's resolved step input overlays
    /// these on invocation.
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Output templates, resolved once after the last internal
    /// step finishes.
    #[serde(default)]
    pub output: HashMap<String, String>,
}

impl TestSuite {
    /// Deserialize a test suite from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize the suite to a YAML string.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

impl Executor {
    /// Deserialize an executor library document from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Terminal state of one suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Completed,
    Aborted,
}

/// Result of running a single test suite.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub state: RunState,
    /// RFC3339 timestamp taken when the run started.
    pub started_at: String,
    /// Suite-level failure (setup executor error), if any.
    pub error: Option<String>,
    pub cases: Vec<CaseReport>,
    pub duration_ms: u64,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Result of running a single test case within a suite.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub steps: Vec<StepReport>,
    pub duration_ms: u64,
}

/// Result of running a single step within a test case.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step_type: String,
    pub success: bool,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_deserialization() {
        let yaml = r#"
name: payments suite
vars:
  gatewayUrl: https://api.example.com
setup:
  steps:
    - type: env-setup
testcases:
  - name: create payment
    steps:
      - type: authenticate
        input:
          user: admin
      - type: HTTP
        method: POST
        url: "{{gatewayUrl}}/payments"
        headers:
          Authorization: "Bearer {{accessToken}}"
        body: '{"amount": 10}'
        vars:
          paymentId: "{{result.body}}"
        log:
          - "created payment {{paymentId}}"
"#;

        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.name, "payments suite");
        assert_eq!(
            suite.vars.get("gatewayUrl").map(String::as_str),
            Some("https://api.example.com")
        );
        assert_eq!(suite.setup.as_ref().unwrap().steps.len(), 1);
        assert_eq!(suite.testcases.len(), 1);

        let case = &suite.testcases[0];
        assert_eq!(case.name, "create payment");
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[0].step_type, "authenticate");

        let http = &case.steps[1];
        assert_eq!(http.step_type, "HTTP");
        assert_eq!(http.method.as_deref(), Some("POST"));
        assert_eq!(http.log.len(), 1);
    }

    #[test]
    fn test_suite_roundtrip() {
        let yaml = "name: minimal\ntestcases:\n  - name: only\n    steps:\n      - type: HTTP\n        method: GET\n        url: http://localhost/x\n";
        let suite = TestSuite::from_yaml(yaml).unwrap();
        let reparsed = TestSuite::from_yaml(&suite.to_yaml().unwrap()).unwrap();
        assert_eq!(suite.name, reparsed.name);
        assert_eq!(suite.testcases.len(), reparsed.testcases.len());
    }

    #[test]
    fn test_executor_deserialization() {
        let yaml = r#"
executor: authenticate
input:
  user: default-user
steps:
  - type: HTTP
    name: login
    method: POST
    url: "{{gatewayUrl}}/auth/token"
    body: '{"user": "{{input.user}}"}'
output:
  accessToken: "{{result.body}}"
"#;

        let executor = Executor::from_yaml(yaml).unwrap();
        assert_eq!(executor.executor, "authenticate");
        assert_eq!(
            executor.input.get("user").map(String::as_str),
            Some("default-user")
        );
        assert_eq!(executor.steps[0].name.as_deref(), Some("login"));
        assert_eq!(
            executor.output.get("accessToken").map(String::as_str),
            Some("{{result.body}}")
        );
    }

    #[test]
    fn test_step_defaults_are_empty() {
        let step: Step =
            serde_yaml::from_str("type: HTTP\nmethod: GET\nurl: /x\n").unwrap();
        assert!(step.name.is_none());
        assert!(step.vars.is_empty());
        assert!(step.input.is_empty());
        assert!(step.headers.is_empty());
        assert!(step.body.is_none());
        assert!(step.log.is_empty());
        assert!(step.assertions.is_empty());
    }
}
