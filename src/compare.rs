//! Compare engine: one request, many environments
//!
//! Rows keep the order environments were requested in. Each row fails or
//! succeeds on its own. Formatted snapshots are cached per environment so
//! moving the focus between rows never formats twice.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Outcome, Request};
use crate::render::ResponseSnapshot;

/// One environment's result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    pub environment: String,
    /// `None` while the send is still in flight
    pub outcome: Option<Outcome>,
    /// The request as sent, rendered as a curl command
    pub request_text: String,
    pub duration_ms: u64,
}

impl CompareResult {
    fn pending(environment: impl Into<String>) -> Self {
        CompareResult {
            environment: environment.into(),
            outcome: None,
            request_text: String::new(),
            duration_ms: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.as_ref().map(Outcome::is_failure).unwrap_or(false)
    }

    fn status(&self) -> String {
        match &self.outcome {
            None => String::from("pending"),
            Some(Outcome::Completed(resp)) => resp.payload.status_text(),
            Some(Outcome::Failed(message)) => format!("error: {}", message),
            Some(Outcome::Canceled) => String::from("canceled"),
        }
    }
}

/// Everything one compare run produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompareBundle {
    /// The request before apply specs and templates ran
    pub request: Request,
    pub baseline: String,
    pub rows: Vec<CompareResult>,
    pub started_at: DateTime<Utc>,
}

impl CompareBundle {
    pub fn new(request: Request, baseline: impl Into<String>, environments: &[String]) -> Self {
        CompareBundle {
            request,
            baseline: baseline.into(),
            rows: environments.iter().map(CompareResult::pending).collect(),
            started_at: Utc::now(),
        }
    }

    pub fn row(&self, environment: &str) -> Option<&CompareResult> {
        self.rows.iter().find(|r| r.environment == environment)
    }

    pub fn baseline_index(&self) -> Option<usize> {
        self.rows.iter().position(|r| r.environment == self.baseline)
    }

    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|r| !r.is_pending())
    }
}

/// Live state of a compare run: the bundle plus the snapshot cache and the
/// focused row
#[derive(Debug)]
pub struct CompareRun {
    pub bundle: CompareBundle,
    snapshots: HashMap<String, Arc<ResponseSnapshot>>,
    focused: usize,
    /// Set once the operator moves the focus by hand
    focus_locked: bool,
}

impl CompareRun {
    pub fn new(bundle: CompareBundle) -> Self {
        let focused = bundle.baseline_index().unwrap_or(0);
        CompareRun {
            bundle,
            snapshots: HashMap::new(),
            focused,
            focus_locked: false,
        }
    }

    /// Store the outcome for `environment`. Unknown environments are ignored.
    pub fn record(&mut self, environment: &str, outcome: Outcome, request_text: String) -> bool {
        let Some(row) = self.bundle.rows.iter_mut().find(|r| r.environment == environment) else {
            return false;
        };
        row.duration_ms = outcome.duration_ms();
        row.outcome = Some(outcome);
        row.request_text = request_text;
        self.refresh_selection();
        true
    }

    pub fn cache_snapshot(&mut self, environment: &str, snapshot: Arc<ResponseSnapshot>) {
        self.snapshots.insert(environment.to_string(), snapshot);
        self.refresh_selection();
    }

    pub fn snapshot(&self, environment: &str) -> Option<&Arc<ResponseSnapshot>> {
        self.snapshots.get(environment)
    }

    fn row_fails(&self, row: &CompareResult) -> bool {
        row.is_failure()
            || self
                .snapshots
                .get(&row.environment)
                .map(|s| s.is_failure())
                .unwrap_or(false)
    }

    /// First failing row, else the baseline, else the first row
    pub fn selection(&self) -> usize {
        self.bundle
            .rows
            .iter()
            .position(|row| self.row_fails(row))
            .or_else(|| self.bundle.baseline_index())
            .unwrap_or(0)
    }

    fn refresh_selection(&mut self) {
        if !self.focus_locked {
            self.focused = self.selection();
        }
    }

    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn focused_row(&self) -> Option<&CompareResult> {
        self.bundle.rows.get(self.focused)
    }

    pub fn focused_snapshot(&self) -> Option<&Arc<ResponseSnapshot>> {
        self.focused_row().and_then(|row| self.snapshots.get(&row.environment))
    }

    pub fn baseline_snapshot(&self) -> Option<&Arc<ResponseSnapshot>> {
        self.snapshots.get(&self.bundle.baseline)
    }

    pub fn focus(&mut self, index: usize) {
        if index < self.bundle.rows.len() {
            self.focused = index;
            self.focus_locked = true;
        }
    }

    pub fn focus_next(&mut self) {
        let len = self.bundle.rows.len();
        if len > 0 {
            self.focus((self.focused + 1) % len);
        }
    }

    pub fn focus_prev(&mut self) {
        let len = self.bundle.rows.len();
        if len > 0 {
            self.focus((self.focused + len - 1) % len);
        }
    }

    /// Compare table projection
    pub fn table(&self) -> String {
        let width = self
            .bundle
            .rows
            .iter()
            .map(|r| r.environment.len())
            .max()
            .unwrap_or(0)
            .max("ENVIRONMENT".len());
        let mut out = format!("  {:<width$}    {:<28} {}\n", "ENVIRONMENT", "STATUS", "TIME", width = width);
        for (i, row) in self.bundle.rows.iter().enumerate() {
            let cursor = if i == self.focused { '>' } else { ' ' };
            let baseline = if row.environment == self.bundle.baseline { '*' } else { ' ' };
            let mut status = row.status();
            if let Some(snapshot) = self.snapshots.get(&row.environment) {
                if let Some(tests) = &snapshot.tests {
                    let passed = tests.iter().filter(|t| t.passed).count();
                    let _ = write!(status, " [{}/{}]", passed, tests.len());
                }
            }
            let time = if row.is_pending() {
                String::from("-")
            } else {
                format!("{} ms", row.duration_ms)
            };
            let _ = writeln!(
                out,
                "{} {:<width$} {}  {:<28} {}",
                cursor,
                row.environment,
                baseline,
                status,
                time,
                width = width
            );
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, HttpResponse, ResponsePayload, TestResult, TransportResponse};

    fn completed(status: u16) -> Outcome {
        Outcome::Completed(TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status,
                reason: String::new(),
                headers: Vec::new(),
                body: String::new(),
            }),
            timeline: None,
            duration_ms: 5,
        })
    }

    fn run(envs: &[&str], baseline: &str) -> CompareRun {
        let envs: Vec<String> = envs.iter().map(|e| e.to_string()).collect();
        CompareRun::new(CompareBundle::new(
            Request::new(HttpMethod::GET, "https://{{host}}/health"),
            baseline,
            &envs,
        ))
    }

    #[test]
    fn test_first_failure_selected() {
        let mut run = run(&["dev", "stage"], "dev");
        run.record("dev", completed(200), "curl dev".into());
        run.record("stage", completed(500), "curl stage".into());
        assert_eq!(run.selection(), 1);
        assert_eq!(run.focused_row().map(|r| r.environment.as_str()), Some("stage"));
    }

    #[test]
    fn test_all_success_selects_baseline() {
        let mut run = run(&["dev", "stage", "prod"], "stage");
        for env in ["dev", "stage", "prod"] {
            run.record(env, completed(200), String::new());
        }
        assert_eq!(run.selection(), 1);
        assert!(run.bundle.is_complete());
    }

    #[test]
    fn test_failures_are_independent() {
        let mut run = run(&["dev", "stage"], "dev");
        run.record("stage", Outcome::Failed("connection refused".into()), String::new());
        assert!(run.bundle.row("stage").map(|r| r.is_failure()).unwrap_or(false));
        assert!(run.bundle.row("dev").map(|r| r.is_pending()).unwrap_or(false));
        assert!(!run.bundle.is_complete());
        assert!(!run.record("nope", completed(200), String::new()));
    }

    #[test]
    fn test_failed_tests_count_as_failure() {
        let mut run = run(&["dev", "stage"], "dev");
        run.record("dev", completed(200), String::new());
        run.record("stage", completed(200), String::new());
        assert_eq!(run.selection(), 0);

        let mut snapshot = ResponseSnapshot::summary_view("health", "200");
        snapshot.tests = Some(vec![TestResult {
            name: "has body".into(),
            passed: false,
            message: None,
        }]);
        run.cache_snapshot("stage", Arc::new(snapshot));
        assert_eq!(run.selection(), 1);
        assert!(run.table().contains("[0/1]"));
    }

    #[test]
    fn test_manual_focus_sticks() {
        let mut run = run(&["dev", "stage"], "dev");
        run.focus_next();
        assert_eq!(run.focused(), 1);
        run.record("dev", completed(503), String::new());
        assert_eq!(run.focused(), 1);
        run.focus_prev();
        assert_eq!(run.focused(), 0);
    }

    #[test]
    fn test_table_marks_baseline_and_focus() {
        let mut run = run(&["dev", "stage"], "dev");
        run.record("dev", completed(200), String::new());
        let table = run.table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("> dev"));
        assert!(lines[1].contains('*'));
        assert!(lines[2].contains("pending"));
    }
}
