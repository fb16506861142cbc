//! Suite execution: setup executors, test cases, and the step
//! engine that threads shared state through every step.

use crate::context::RunContext;
use crate::http::{DispatchResponse, HttpDispatcher, ReqwestDispatcher};
use crate::model::{
    CaseReport, Executor, RunState, Step, StepReport, StepResult,
    SuiteReport, Testcase, TestSuite,
};
use crate::template::{render, Scope};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Step type marker for direct HTTP calls.
pub const HTTP_STEP_TYPE: &str = "HTTP";

/// Default bound on nested executor invocations.
pub const DEFAULT_MAX_INVOKE_DEPTH: usize = 16;

/// Hook evaluated against each completed step. Assertion
/// semantics are not part of the engine; the default accepts
/// everything.
pub trait AssertionHook: Send + Sync {
    fn evaluate(&self, assertions: &[String], result: &StepResult)
        -> Result<()>;
}

/// Accepts every step result.
pub struct NoopAssertions;

impl AssertionHook for NoopAssertions {
    fn evaluate(
        &self,
        _assertions: &[String],
        _result: &StepResult,
    ) -> Result<()> {
        Ok(())
    }
}

/// How a step dispatches, classified once per step against the
/// catalog.
enum Action {
    Http,
    Invoke(Arc<Executor>),
    Unknown,
}

/// Loaded executor definitions, keyed by name. An executor match
/// takes precedence over the HTTP marker.
pub struct ExecutorCatalog {
    executors: HashMap<String, Arc<Executor>>,
}

impl ExecutorCatalog {
    pub fn new(executors: Vec<Executor>) -> Self {
        let mut map = HashMap::new();
        for executor in executors {
            let name = executor.executor.clone();
            if map.insert(name.clone(), Arc::new(executor)).is_some() {
                warn!("duplicate executor '{name}': later definition wins");
            }
        }
        Self { executors: map }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Executor>> {
        self.executors.get(name)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    fn classify(&self, step_type: &str) -> Action {
        if let Some(def) = self.executors.get(step_type) {
            return Action::Invoke(def.clone());
        }
        if step_type.eq_ignore_ascii_case(HTTP_STEP_TYPE) {
            return Action::Http;
        }
        Action::Unknown
    }
}

/// Runs test suites against an executor catalog. One runner can
/// serve many runs; all per-run state lives in [`RunContext`].
pub struct SuiteRunner {
    catalog: ExecutorCatalog,
    dispatcher: Arc<dyn HttpDispatcher>,
    assertions: Arc<dyn AssertionHook>,
    max_invoke_depth: usize,
}

impl SuiteRunner {
    pub fn new(catalog: ExecutorCatalog) -> Self {
        Self {
            catalog,
            dispatcher: Arc::new(ReqwestDispatcher::new()),
            assertions: Arc::new(NoopAssertions),
            max_invoke_depth: DEFAULT_MAX_INVOKE_DEPTH,
        }
    }

    pub fn with_dispatcher(
        mut self,
        dispatcher: Arc<dyn HttpDispatcher>,
    ) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_assertions(
        mut self,
        assertions: Arc<dyn AssertionHook>,
    ) -> Self {
        self.assertions = assertions;
        self
    }

    pub fn with_max_invoke_depth(mut self, depth: usize) -> Self {
        self.max_invoke_depth = depth;
        self
    }

    /// Run every test file in order. Load failures are
    /// configuration errors and stop the batch; execution
    /// failures are recorded per file and the batch continues.
    pub async fn run_files(
        &self,
        files: &[PathBuf],
        overrides: &HashMap<String, String>,
    ) -> Result<Vec<SuiteReport>> {
        let mut reports = Vec::new();
        for file in files {
            let suite = crate::library::load_suite(file)?;
            let ctx = RunContext::with_overrides(overrides.clone());
            reports.push(self.run(&suite, &ctx).await);
        }
        Ok(reports)
    }

    /// Run one suite to its terminal state: suite vars into the
    /// global scope, then setup, then each test case in order.
    pub async fn run(
        &self,
        suite: &TestSuite,
        ctx: &RunContext,
    ) -> SuiteReport {
        let start = Instant::now();
        let started_at = Utc::now().to_rfc3339();
        info!("Starting test suite: {}", suite.name);

        ctx.seed_suite_vars(&suite.vars);

        if let Err(err) = self.run_setup(suite, ctx).await {
            error!("Setup failed for suite '{}': {err:#}", suite.name);
            return SuiteReport {
                name: suite.name.clone(),
                state: RunState::Aborted,
                started_at,
                error: Some(format!("setup failed: {err:#}")),
                cases: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        let mut cases = Vec::new();
        for testcase in &suite.testcases {
            cases.push(self.run_case(ctx, testcase).await);
        }

        let state = if cases.iter().all(|case| case.success) {
            RunState::Completed
        } else {
            RunState::Aborted
        };

        let report = SuiteReport {
            name: suite.name.clone(),
            state,
            started_at,
            error: None,
            cases,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Test suite finished: {} ({} ms) - {:?}",
            report.name, report.duration_ms, report.state
        );
        report
    }

    /// Setup steps invoke executors whose outputs become global
    /// variables. Steps with no matching executor are skipped.
    async fn run_setup(
        &self,
        suite: &TestSuite,
        ctx: &RunContext,
    ) -> Result<()> {
        let Some(setup) = &suite.setup else {
            return Ok(());
        };

        for step in &setup.steps {
            match self.catalog.classify(&step.step_type) {
                Action::Invoke(def) => {
                    debug!("Running setup executor: {}", def.executor);
                    let globals = ctx.globals();
                    let mut seed = step.input.clone();
                    for (key, value) in &globals {
                        seed.entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                    let scopes = [
                        Scope::Vars(&globals),
                        Scope::History(&ctx.history),
                    ];
                    let seed = seed
                        .iter()
                        .map(|(k, v)| (k.clone(), render(v, &scopes)))
                        .collect();

                    let mut stack = Vec::new();
                    let output = self
                        .invoke_executor(ctx, def, seed, &mut stack)
                        .await?;
                    ctx.merge_globals(&output);
                }
                _ => {
                    debug!(
                        "Setup step '{}' has no matching executor, skipping",
                        step.step_type
                    );
                }
            }
        }
        Ok(())
    }

    /// Run one test case. A failing step skips the rest of the
    /// case; the run continues with the next case. The case's
    /// cumulative result is recorded under the case name either
    /// way.
    async fn run_case(
        &self,
        ctx: &RunContext,
        testcase: &Testcase,
    ) -> CaseReport {
        let case_start = Instant::now();
        info!("Running test case: {}", testcase.name);

        let mut case_result: HashMap<String, String> = HashMap::new();
        let mut previous: Option<StepResult> = None;
        let mut steps = Vec::new();
        let mut case_error = None;

        for step in &testcase.steps {
            let step_start = Instant::now();
            match self
                .run_step(
                    ctx,
                    &testcase.name,
                    step,
                    &mut case_result,
                    previous.as_ref(),
                )
                .await
            {
                Ok(result) => {
                    steps.push(StepReport {
                        step_type: step.step_type.clone(),
                        success: true,
                        error: None,
                        status_code: (result.status_code != 0)
                            .then_some(result.status_code),
                        duration_ms: step_start.elapsed().as_millis()
                            as u64,
                    });
                    previous = Some(result);
                }
                Err(err) => {
                    let message = format!(
                        "step '{}' failed: {err:#}",
                        step.step_type
                    );
                    error!(
                        "Test case '{}' aborted: {message}",
                        testcase.name
                    );
                    steps.push(StepReport {
                        step_type: step.step_type.clone(),
                        success: false,
                        error: Some(format!("{err:#}")),
                        status_code: None,
                        duration_ms: step_start.elapsed().as_millis()
                            as u64,
                    });
                    case_error = Some(message);
                    break;
                }
            }
        }

        ctx.history.record_step(&testcase.name, &case_result);

        CaseReport {
            name: testcase.name.clone(),
            success: case_error.is_none(),
            error: case_error,
            steps,
            duration_ms: case_start.elapsed().as_millis() as u64,
        }
    }

    /// Run one test-case step: prepare input, dispatch, record
    /// the outcome, then resolve vars and logs.
    async fn run_step(
        &self,
        ctx: &RunContext,
        testcase_name: &str,
        step: &Step,
        case_result: &mut HashMap<String, String>,
        previous: Option<&StepResult>,
    ) -> Result<StepResult> {
        debug!("Running step: {}", step.step_type);
        let globals = ctx.globals();

        // Globals fill input keys the step did not declare.
        let mut input = step.input.clone();
        for (key, value) in &globals {
            input.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let input = {
            let mut scopes =
                vec![Scope::Vars(&globals), Scope::Vars(case_result)];
            if let Some(prev) = previous {
                scopes.push(Scope::Result(prev));
            }
            scopes.push(Scope::History(&ctx.history));
            input
                .iter()
                .map(|(k, v)| (k.clone(), render(v, &scopes)))
                .collect::<HashMap<_, _>>()
        };

        let mut result = StepResult::default();
        match self.catalog.classify(&step.step_type) {
            Action::Invoke(def) => {
                let mut stack = Vec::new();
                let output = self
                    .invoke_executor(ctx, def, input.clone(), &mut stack)
                    .await?;
                for (key, value) in &output {
                    case_result.insert(key.clone(), value.clone());
                }
                result.output.extend(output);
            }
            Action::Http => {
                let mut scopes = vec![
                    Scope::Vars(&globals),
                    Scope::Input(&input),
                    Scope::Vars(&*case_result),
                ];
                if let Some(prev) = previous {
                    scopes.push(Scope::Result(prev));
                }
                scopes.push(Scope::History(&ctx.history));

                let response = self.send_http(step, &scopes).await?;
                result.status_code = response.status_code;
                result.headers = response.headers;
                result.body = response.body;
                result
                    .output
                    .insert("body".to_string(), result.body.clone());
                result.output.insert(
                    "statusCode".to_string(),
                    result.status_code.to_string(),
                );
                case_result.insert("body".to_string(), result.body.clone());
                case_result.insert(
                    "statusCode".to_string(),
                    result.status_code.to_string(),
                );
            }
            Action::Unknown => {
                bail!(
                    "no executor or HTTP marker matches step type '{}'",
                    step.step_type
                );
            }
        }

        ctx.history.record_step(
            &format!("{testcase_name}.{}", step.step_type),
            &result.output,
        );

        let resolved_vars = {
            let mut scopes =
                vec![Scope::Vars(&globals), Scope::Result(&result)];
            if let Some(prev) = previous {
                scopes.push(Scope::Vars(&prev.output));
            }
            scopes.push(Scope::History(&ctx.history));
            step.vars
                .iter()
                .map(|(k, v)| (k.clone(), render(v, &scopes)))
                .collect::<HashMap<_, _>>()
        };
        for (key, value) in &resolved_vars {
            case_result.insert(key.clone(), value.clone());
        }

        self.assertions.evaluate(&step.assertions, &result)?;

        let scopes = [
            Scope::Vars(&globals),
            Scope::Vars(&resolved_vars),
            Scope::Vars(case_result),
            Scope::Result(&result),
            Scope::History(&ctx.history),
        ];
        for line in &step.log {
            info!("{}", render(line, &scopes));
        }

        Ok(result)
    }

    /// Run an executor's step sequence and resolve its output
    /// templates. `stack` carries the invocation chain for the
    /// recursion guard.
    fn invoke_executor<'a>(
        &'a self,
        ctx: &'a RunContext,
        def: Arc<Executor>,
        seed: HashMap<String, String>,
        stack: &'a mut Vec<String>,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<HashMap<String, String>>>
                + Send
                + 'a,
        >,
    > {
        Box::pin(async move {
            stack.push(def.executor.clone());
            if stack.len() > self.max_invoke_depth {
                bail!(
                    "executor invocation depth exceeded ({}): {}",
                    self.max_invoke_depth,
                    stack.join(" -> ")
                );
            }
            info!("Running executor: {}", def.executor);

            // The caller's resolved input wins over declared
            // defaults.
            let mut input = def.input.clone();
            input.extend(seed);

            let mut previous: Option<StepResult> = None;
            for step in &def.steps {
                let result = self
                    .run_executor_step(
                        ctx,
                        &input,
                        step,
                        previous.as_ref(),
                        &mut *stack,
                    )
                    .await?;
                previous = Some(result);
            }

            let globals = ctx.globals();
            let mut scopes = vec![Scope::Vars(&globals)];
            if let Some(ref final_result) = previous {
                scopes.push(Scope::Result(final_result));
            }
            scopes.push(Scope::Input(&input));
            scopes.push(Scope::History(&ctx.history));

            let output: HashMap<String, String> = def
                .output
                .iter()
                .map(|(k, v)| (k.clone(), render(v, &scopes)))
                .collect();
            for (key, value) in &output {
                debug!("Executor output var: {key} -> {value}");
            }

            stack.pop();
            Ok(output)
        })
    }

    /// Run one executor-internal step and record it under its
    /// name so later steps anywhere in the run can address it.
    async fn run_executor_step(
        &self,
        ctx: &RunContext,
        exec_input: &HashMap<String, String>,
        step: &Step,
        previous: Option<&StepResult>,
        stack: &mut Vec<String>,
    ) -> Result<StepResult> {
        debug!("Running executor step: {}", step.step_type);
        let globals = ctx.globals();

        // The executor's input is the owning scope here.
        let mut input = step.input.clone();
        for (key, value) in exec_input {
            input.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &globals {
            input.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let input = {
            let mut scopes =
                vec![Scope::Vars(&globals), Scope::Input(exec_input)];
            if let Some(prev) = previous {
                scopes.push(Scope::Result(prev));
            }
            scopes.push(Scope::History(&ctx.history));
            input
                .iter()
                .map(|(k, v)| (k.clone(), render(v, &scopes)))
                .collect::<HashMap<_, _>>()
        };

        let mut result = StepResult::default();
        match self.catalog.classify(&step.step_type) {
            Action::Invoke(def) => {
                let output = self
                    .invoke_executor(ctx, def, input.clone(), &mut *stack)
                    .await?;
                result.output.extend(output);
            }
            Action::Http => {
                let mut scopes =
                    vec![Scope::Vars(&globals), Scope::Input(&input)];
                if let Some(prev) = previous {
                    scopes.push(Scope::Result(prev));
                }
                scopes.push(Scope::History(&ctx.history));

                let response = self.send_http(step, &scopes).await?;
                result.status_code = response.status_code;
                result.headers = response.headers;
                result.body = response.body;
                result
                    .output
                    .insert("body".to_string(), result.body.clone());
                result.output.insert(
                    "statusCode".to_string(),
                    result.status_code.to_string(),
                );
            }
            Action::Unknown => {
                bail!(
                    "no executor or HTTP marker matches step type '{}'",
                    step.step_type
                );
            }
        }

        let resolved_vars = {
            let mut scopes =
                vec![Scope::Vars(&globals), Scope::Result(&result)];
            if let Some(prev) = previous {
                scopes.push(Scope::Vars(&prev.output));
            }
            scopes.push(Scope::History(&ctx.history));
            step.vars
                .iter()
                .map(|(k, v)| (k.clone(), render(v, &scopes)))
                .collect::<HashMap<_, _>>()
        };

        self.assertions.evaluate(&step.assertions, &result)?;

        // Vars plus outputs, addressable by the step's name.
        let mut entry = resolved_vars.clone();
        entry.extend(result.output.clone());
        let entry_name = step
            .name
            .clone()
            .unwrap_or_else(|| step.step_type.clone());
        ctx.history.record_executor_step(&entry_name, &entry);

        let scopes = [
            Scope::Vars(&globals),
            Scope::Vars(&resolved_vars),
            Scope::Input(&input),
            Scope::Result(&result),
            Scope::History(&ctx.history),
        ];
        for line in &step.log {
            info!("{}", render(line, &scopes));
        }

        Ok(result)
    }

    /// Resolve url/headers/body against the caller's scope list
    /// and perform one HTTP round trip.
    async fn send_http(
        &self,
        step: &Step,
        scopes: &[Scope<'_>],
    ) -> Result<DispatchResponse> {
        let method = step
            .method
            .as_deref()
            .ok_or_else(|| anyhow!("HTTP step is missing 'method'"))?;
        let url_template = step
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("HTTP step is missing 'url'"))?;

        let url = render(url_template, scopes);
        let headers: HashMap<String, String> = step
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), render(v, scopes)))
            .collect();
        let body = step.body.as_ref().map(|b| render(b, scopes));

        debug!("{} {}", method, url);
        self.dispatcher
            .dispatch(method, &url, &headers, body.as_deref())
            .await
    }
}
