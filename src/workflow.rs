//! Workflow executor state
//!
//! A workflow is a named list of steps, each naming a request from the
//! loaded collections. Steps run one at a time from inside the app loop;
//! this module holds the bookkeeping and the pure pieces of each step
//! (condition, pass/fail verdict, variable captures).

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::apply::{eval, evaluate_expression, ExprError, Scope};
use crate::models::{Environment, Outcome, Request, ResponsePayload, SourcePos, TransportResponse};

fn one() -> usize {
    1
}

/// A step as written in a `*.workflow.yaml` file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    /// Name of a request in the loaded collections
    pub request: String,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default = "one")]
    pub repeat: usize,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub expect_status: Option<u16>,
    /// Variable name -> source (`status`, `body`, `header:Name`, `json:/ptr`)
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

/// One executable unit after `repeat` has been expanded
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedStep {
    pub index: usize,
    pub name: String,
    pub request: String,
    pub when: Option<String>,
    pub branch: Option<String>,
    /// 1-based
    pub iteration: usize,
    pub iterations: usize,
    pub continue_on_error: bool,
    pub expect_status: Option<u16>,
    pub captures: Vec<(String, String)>,
}

impl PlannedStep {
    pub fn label(&self) -> String {
        let mut label = match &self.branch {
            Some(branch) => format!("{}/{}", branch, self.name),
            None => self.name.clone(),
        };
        if self.iterations > 1 {
            let _ = write!(label, " ({}/{})", self.iteration, self.iterations);
        }
        label
    }
}

/// Flatten a definition into the steps that will run, in order
pub fn plan(def: &WorkflowDef) -> Vec<PlannedStep> {
    let mut planned = Vec::new();
    for step in &def.steps {
        let iterations = step.repeat.max(1);
        for iteration in 1..=iterations {
            planned.push(PlannedStep {
                index: planned.len(),
                name: step.name.clone(),
                request: step.request.clone(),
                when: step.when.clone(),
                branch: step.branch.clone(),
                iteration,
                iterations,
                continue_on_error: step.continue_on_error,
                expect_status: step.expect_status,
                captures: step.capture.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            });
        }
    }
    planned
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    /// Index into the planned steps
    pub step: usize,
    pub label: String,
    pub success: bool,
    pub skipped: bool,
    pub canceled: bool,
    pub status: String,
    pub message: String,
    pub duration_ms: Option<u64>,
    pub payload: Option<ResponsePayload>,
}

impl WorkflowStepResult {
    fn base(step: &PlannedStep) -> Self {
        WorkflowStepResult {
            step: step.index,
            label: step.label(),
            success: false,
            skipped: false,
            canceled: false,
            status: String::new(),
            message: String::new(),
            duration_ms: None,
            payload: None,
        }
    }

    pub fn skipped(step: &PlannedStep, reason: impl Into<String>) -> Self {
        WorkflowStepResult {
            success: true,
            skipped: true,
            status: String::from("skipped"),
            message: reason.into(),
            ..Self::base(step)
        }
    }

    pub fn failed(step: &PlannedStep, message: impl Into<String>) -> Self {
        WorkflowStepResult {
            status: String::from("error"),
            message: message.into(),
            ..Self::base(step)
        }
    }

    /// Display-only stand-in for a step cancellation kept from running
    fn placeholder(step: &PlannedStep) -> Self {
        WorkflowStepResult {
            canceled: true,
            status: String::from("canceled"),
            message: String::from("not run"),
            ..Self::base(step)
        }
    }

    /// Verdict for a finished send. With `expect_status` set, only that
    /// status passes; otherwise any non-error status does.
    pub fn from_outcome(step: &PlannedStep, outcome: &Outcome, failed_tests: usize) -> Self {
        match outcome {
            Outcome::Completed(resp) => {
                let status_ok = match (step.expect_status, resp.payload.http_status()) {
                    (Some(expected), Some(actual)) => expected == actual,
                    _ => resp.payload.is_success(),
                };
                let mut message = Vec::new();
                if !status_ok {
                    match step.expect_status {
                        Some(expected) => message.push(format!("expected status {}", expected)),
                        None => message.push(String::from("error status")),
                    }
                }
                if failed_tests > 0 {
                    message.push(format!("{} test(s) failed", failed_tests));
                }
                WorkflowStepResult {
                    success: status_ok && failed_tests == 0,
                    status: resp.payload.status_text(),
                    message: message.join(", "),
                    duration_ms: Some(resp.duration_ms),
                    payload: Some(resp.payload.clone()),
                    ..Self::base(step)
                }
            }
            Outcome::Failed(error) => Self::failed(step, error.clone()),
            Outcome::Canceled => WorkflowStepResult {
                canceled: true,
                status: String::from("canceled"),
                ..Self::base(step)
            },
        }
    }
}

/// Run-time state of one workflow
#[derive(Clone, Debug)]
pub struct WorkflowState {
    pub name: String,
    pub steps: Vec<PlannedStep>,
    results: Vec<WorkflowStepResult>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    /// Send id of the step currently on the wire
    in_flight: Option<u64>,
    /// Outcome of the in-flight step, returned but not yet judged
    held: Option<(Outcome, Request)>,
    halted: bool,
}

impl WorkflowState {
    pub fn new(def: &WorkflowDef) -> Self {
        WorkflowState {
            name: def.name.clone(),
            steps: plan(def),
            results: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            canceled: false,
            in_flight: None,
            held: None,
            halted: false,
        }
    }

    pub fn results(&self) -> &[WorkflowStepResult] {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Next step to run, if the run is still going
    pub fn next_step(&self) -> Option<&PlannedStep> {
        if self.canceled || self.halted || self.in_flight.is_some() {
            return None;
        }
        self.steps.get(self.results.len())
    }

    /// Step whose send is on the wire, with its branch and iteration
    pub fn current_step(&self) -> Option<&PlannedStep> {
        self.in_flight.and(self.steps.get(self.results.len()))
    }

    pub fn mark_sent(&mut self, id: u64) {
        self.in_flight = Some(id);
    }

    /// Whether a completion for send `id` still belongs to this run
    pub fn accepts(&self, id: u64) -> bool {
        !self.canceled && self.in_flight == Some(id)
    }

    /// Keep the current step's outcome until its result is recorded
    pub fn hold(&mut self, outcome: Outcome, request: Request) {
        if self.in_flight.is_some() {
            self.held = Some((outcome, request));
        }
    }

    pub fn held(&self) -> Option<&(Outcome, Request)> {
        self.held.as_ref()
    }

    /// Record the next step's result. A failure halts the run unless the
    /// step allows continuing.
    pub fn record(&mut self, result: WorkflowStepResult) {
        if self.canceled || self.results.len() >= self.steps.len() {
            return;
        }
        let continue_on_error = self
            .steps
            .get(self.results.len())
            .map(|s| s.continue_on_error)
            .unwrap_or(false);
        if !result.success && !continue_on_error {
            self.halted = true;
        }
        self.in_flight = None;
        self.held = None;
        self.results.push(result);
        if self.halted || self.results.len() == self.steps.len() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Stop issuing steps. Returns the send id that should be canceled.
    pub fn cancel(&mut self) -> Option<u64> {
        if self.is_finished() {
            return None;
        }
        self.canceled = true;
        self.ended_at = Some(Utc::now());
        self.in_flight.take()
    }

    pub fn succeeded(&self) -> bool {
        !self.canceled && !self.halted && self.results.iter().all(|r| r.success)
    }

    /// Real results followed by canceled placeholders for the steps that
    /// never ran. Placeholders carry no payload and no duration.
    pub fn display_results(&self) -> Vec<WorkflowStepResult> {
        let mut rows = self.results.clone();
        if self.canceled {
            rows.extend(self.steps[self.results.len()..].iter().map(WorkflowStepResult::placeholder));
        }
        rows
    }

    pub fn summary_line(&self) -> String {
        let state = if self.canceled {
            "canceled"
        } else if !self.is_finished() {
            "running"
        } else if self.succeeded() {
            "passed"
        } else {
            "failed"
        };
        let elapsed = self
            .ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0))
            .unwrap_or(0);
        format!(
            "{} · {} · {}/{} steps · {} ms",
            self.name,
            state,
            self.results.len(),
            self.steps.len(),
            elapsed
        )
    }

    /// Step list projection
    pub fn step_lines(&self) -> String {
        step_lines(&self.summary_line(), &self.display_results())
    }
}

/// Render a header line followed by one line per step result
pub fn step_lines(header: &str, rows: &[WorkflowStepResult]) -> String {
    let mut out = format!("{}\n", header);
    for row in rows {
        let mark = if row.canceled {
            "⊘"
        } else if row.skipped {
            "-"
        } else if row.success {
            "✓"
        } else {
            "✗"
        };
        let duration = row.duration_ms.map(|d| format!(" {} ms", d)).unwrap_or_default();
        let _ = write!(out, "{} {}  {}{}", mark, row.label, row.status, duration);
        if !row.message.is_empty() {
            let _ = write!(out, "  ({})", row.message);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Evaluate a step's `when` condition
pub fn condition_holds(
    expression: &str,
    vars: &HashMap<String, String>,
    env: Option<&Environment>,
) -> Result<bool, ExprError> {
    let scope = Scope::new(vars).with_env(env);
    evaluate_expression(expression, SourcePos::default(), &scope).map(|v| eval::truthy(&v))
}

/// Variables to capture from a finished step. Sources that do not resolve
/// are left out.
pub fn captures(step: &PlannedStep, response: &TransportResponse) -> Vec<(String, String)> {
    let payload = &response.payload;
    step.captures
        .iter()
        .filter_map(|(name, source)| {
            let value = match source.split_once(':') {
                Some(("header", header)) => payload
                    .headers()
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(header.trim()))
                    .map(|(_, v)| v.clone()),
                Some(("json", pointer)) => serde_json::from_str::<Value>(payload.body())
                    .ok()
                    .and_then(|json| json.pointer(pointer.trim()).map(eval::to_text)),
                _ => match source.trim() {
                    "status" => payload.http_status().map(|s| s.to_string()),
                    "body" => Some(payload.body().to_string()),
                    other => {
                        tracing::warn!(step = %step.name, source = other, "unknown capture source");
                        None
                    }
                },
            };
            value.map(|v| (name.clone(), v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpResponse;

    fn step(name: &str) -> WorkflowStep {
        WorkflowStep {
            name: name.into(),
            request: name.into(),
            when: None,
            repeat: 1,
            branch: None,
            continue_on_error: false,
            expect_status: None,
            capture: BTreeMap::new(),
        }
    }

    fn def(names: &[&str]) -> WorkflowDef {
        WorkflowDef {
            name: "flow".into(),
            steps: names.iter().map(|n| step(n)).collect(),
        }
    }

    fn http(status: u16, body: &str) -> TransportResponse {
        TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status,
                reason: String::new(),
                headers: vec![("X-Request-Id".into(), "r-1".into())],
                body: body.into(),
            }),
            timeline: None,
            duration_ms: 8,
        }
    }

    #[test]
    fn test_plan_expands_repeat() {
        let mut d = def(&["login", "poll"]);
        d.steps[1].repeat = 3;
        d.steps[1].branch = Some("wait".into());
        let planned = plan(&d);
        assert_eq!(planned.len(), 4);
        assert_eq!(planned[3].index, 3);
        assert_eq!(planned[3].label(), "wait/poll (3/3)");
        assert_eq!(planned[0].label(), "login");
    }

    #[test]
    fn test_canceled_run_synthesizes_placeholders() {
        let mut state = WorkflowState::new(&def(&["a", "b", "c", "d", "e"]));
        for id in 1..=2 {
            let step = state.next_step().cloned().unwrap();
            state.mark_sent(id);
            state.record(WorkflowStepResult::from_outcome(&step, &Outcome::Completed(http(200, "")), 0));
        }
        state.mark_sent(3);
        assert_eq!(state.cancel(), Some(3));
        assert!(!state.accepts(3));
        assert!(state.next_step().is_none());

        assert_eq!(state.results().len(), 2);
        let shown = state.display_results();
        assert_eq!(shown.len(), 5);
        let placeholders: Vec<_> = shown.iter().filter(|r| r.canceled).collect();
        assert_eq!(placeholders.len(), 3);
        assert!(placeholders.iter().all(|r| r.payload.is_none() && r.duration_ms.is_none()));
        assert!(state.results().len() <= state.steps.len());
    }

    #[test]
    fn test_stale_result_after_cancel_ignored() {
        let mut state = WorkflowState::new(&def(&["a", "b"]));
        let step = state.next_step().cloned().unwrap();
        state.mark_sent(1);
        state.cancel();
        state.record(WorkflowStepResult::from_outcome(&step, &Outcome::Completed(http(200, "")), 0));
        assert!(state.results().is_empty());
    }

    #[test]
    fn test_held_outcome_cleared_by_record() {
        let mut state = WorkflowState::new(&def(&["a", "b"]));
        let outcome = Outcome::Completed(http(200, ""));
        state.hold(outcome.clone(), Request::default());
        assert!(state.held().is_none());

        let step = state.next_step().cloned().unwrap();
        state.mark_sent(1);
        state.hold(outcome.clone(), Request::default());
        assert!(state.held().is_some());
        assert!(state.next_step().is_none());
        state.record(WorkflowStepResult::from_outcome(&step, &outcome, 0));
        assert!(state.held().is_none());
        assert_eq!(state.next_step().map(|s| s.name.as_str()), Some("b"));
    }

    #[test]
    fn test_failure_halts_unless_continue() {
        let mut d = def(&["a", "b", "c"]);
        d.steps[1].continue_on_error = true;
        let mut state = WorkflowState::new(&d);

        let a = state.next_step().cloned().unwrap();
        state.record(WorkflowStepResult::from_outcome(&a, &Outcome::Completed(http(200, "")), 0));
        let b = state.next_step().cloned().unwrap();
        state.record(WorkflowStepResult::from_outcome(&b, &Outcome::Completed(http(500, "")), 0));
        assert!(!state.is_finished());
        let c = state.next_step().cloned().unwrap();
        state.record(WorkflowStepResult::failed(&c, "connection refused"));
        assert!(state.is_finished());
        assert!(!state.succeeded());
        assert!(state.display_results().iter().all(|r| !r.canceled));
    }

    #[test]
    fn test_expect_status() {
        let mut d = def(&["create"]);
        d.steps[0].expect_status = Some(201);
        let planned = plan(&d);
        let ok = WorkflowStepResult::from_outcome(&planned[0], &Outcome::Completed(http(201, "")), 0);
        assert!(ok.success);
        let wrong = WorkflowStepResult::from_outcome(&planned[0], &Outcome::Completed(http(200, "")), 0);
        assert!(!wrong.success);
        assert_eq!(wrong.message, "expected status 201");
    }

    #[test]
    fn test_captures() {
        let mut d = def(&["login"]);
        d.steps[0].capture = BTreeMap::from([
            ("token".to_string(), "json:/auth/token".to_string()),
            ("rid".to_string(), "header:x-request-id".to_string()),
            ("code".to_string(), "status".to_string()),
            ("missing".to_string(), "json:/nope".to_string()),
        ]);
        let planned = plan(&d);
        let mut got = captures(&planned[0], &http(200, r#"{"auth":{"token":"t1"}}"#));
        got.sort();
        assert_eq!(
            got,
            vec![
                ("code".to_string(), "200".to_string()),
                ("rid".to_string(), "r-1".to_string()),
                ("token".to_string(), "t1".to_string()),
            ]
        );
    }

    #[test]
    fn test_condition() {
        let vars = HashMap::from([("mode".to_string(), "full".to_string())]);
        assert!(condition_holds(r#"vars.mode == "full""#, &vars, None).unwrap());
        assert!(!condition_holds("vars.other ?? false", &vars, None).unwrap());
        assert!(condition_holds("vars.mode ==", &vars, None).is_err());
    }

    #[test]
    fn test_load_definition_from_yaml() {
        let yaml = r#"
name: checkout
steps:
  - name: login
    request: Login
    capture:
      token: json:/token
  - name: poll
    request: Status
    repeat: 2
    when: vars.token != null
"#;
        let def: WorkflowDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.steps[0].repeat, 1);
        assert_eq!(plan(&def).len(), 3);
    }
}
