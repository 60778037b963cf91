//! Response formatting - turns a raw outcome into display projections
//!
//! Runs on a blocking worker. Nothing here fails the snapshot: a body that
//! claims to be JSON but does not parse falls back to its raw text, and a
//! broken assertion becomes a failed test plus a script error.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde_json::Value;

use crate::apply::{eval, evaluate_expression, Scope};
use crate::curl::to_curl;
use crate::models::{Outcome, Request, ResponsePayload, TestResult, Timeline, TransportResponse};
use crate::render::snapshot::{ResponseSnapshot, Tab};

const TIMELINE_BAR_WIDTH: u64 = 30;

/// Everything the formatter needs to build one snapshot
#[derive(Clone, Debug)]
pub struct RenderInput {
    pub title: String,
    pub environment: Option<String>,
    /// The request as it went on the wire
    pub request: Request,
    pub vars: HashMap<String, String>,
    pub outcome: Outcome,
}

/// Build a snapshot with every projection filled in
pub fn format_snapshot(input: &RenderInput) -> ResponseSnapshot {
    let summary = summary_line(&input.outcome);
    let mut snapshot = ResponseSnapshot::build(
        input.title.clone(),
        input.environment.clone(),
        summary,
        Some(input.outcome.clone()),
        to_curl(&input.request),
    );

    match &input.outcome {
        Outcome::Completed(resp) => {
            snapshot.set(Tab::Pretty, pretty_body(&resp.payload));
            snapshot.set(Tab::Raw, raw_text(&resp.payload));
            snapshot.set(Tab::Headers, header_lines(resp.payload.headers()));

            if !input.request.tests.is_empty() {
                let (tests, script_error) = run_tests(input, resp);
                snapshot.set(Tab::Tests, test_lines(&tests, script_error.as_deref()));
                snapshot.tests = Some(tests);
                snapshot.script_error = script_error;
            }

            if let Some(timeline) = &resp.timeline {
                snapshot.set(Tab::Timeline, timeline_lines(timeline));
                snapshot.timeline = Some(timeline.clone());
            }
        }
        Outcome::Failed(message) => {
            let text = format!("Error: {}", message);
            snapshot.set(Tab::Pretty, text.clone());
            snapshot.set(Tab::Raw, text);
        }
        Outcome::Canceled => {
            snapshot.set(Tab::Pretty, "Request canceled");
            snapshot.set(Tab::Raw, "Request canceled");
        }
    }

    snapshot
}

/// One-line status used in pane titles and compare rows
pub fn summary_line(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed(resp) => format!("{} · {} ms", resp.payload.status_text(), resp.duration_ms),
        Outcome::Failed(message) => format!("Error: {}", message),
        Outcome::Canceled => String::from("Canceled"),
    }
}

fn looks_like_json(payload: &ResponsePayload) -> bool {
    let declared = match payload {
        ResponsePayload::Http(resp) => resp
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false),
        ResponsePayload::Grpc(_) => true,
    };
    let trimmed = payload.body().trim_start();
    declared || trimmed.starts_with('{') || trimmed.starts_with('[')
}

pub fn pretty_body(payload: &ResponsePayload) -> String {
    let body = payload.body();
    if body.trim().is_empty() {
        return String::from("(empty body)");
    }
    if !looks_like_json(payload) {
        return body.to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| body.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "body is not valid JSON, showing raw text");
            body.to_string()
        }
    }
}

fn raw_text(payload: &ResponsePayload) -> String {
    let status = match payload {
        ResponsePayload::Http(_) => format!("HTTP {}", payload.status_text()),
        ResponsePayload::Grpc(_) => payload.status_text(),
    };
    let headers = header_lines(payload.headers());
    if headers.is_empty() {
        format!("{}\n\n{}", status, payload.body())
    } else {
        format!("{}\n{}\n\n{}", status, headers, payload.body())
    }
}

fn header_lines(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Evaluate the request's assertions. The first expression error is kept
/// as the script error; the assertion itself counts as failed.
fn run_tests(input: &RenderInput, resp: &TransportResponse) -> (Vec<TestResult>, Option<String>) {
    let scope = Scope::new(&input.vars)
        .with_request(&input.request)
        .with_response(resp);
    let mut script_error = None;

    let results = input
        .request
        .tests
        .iter()
        .map(|test| match evaluate_expression(&test.expression, test.pos, &scope) {
            Ok(value) => {
                let passed = eval::truthy(&value);
                TestResult {
                    name: test.name.clone(),
                    passed,
                    message: (!passed).then(|| format!("evaluated to {}", eval::to_text(&value))),
                }
            }
            Err(e) => {
                let message = format!("{}: {}", test.name, e);
                tracing::warn!(test = %test.name, error = %e, "assertion failed to evaluate");
                script_error.get_or_insert_with(|| message.clone());
                TestResult {
                    name: test.name.clone(),
                    passed: false,
                    message: Some(e.to_string()),
                }
            }
        })
        .collect();

    (results, script_error)
}

fn test_lines(tests: &[TestResult], script_error: Option<&str>) -> String {
    let passed = tests.iter().filter(|t| t.passed).count();
    let mut out = format!("{}/{} passed\n", passed, tests.len());
    for test in tests {
        let mark = if test.passed { "✓" } else { "✗" };
        match &test.message {
            Some(message) => {
                let _ = writeln!(out, "{} {} ({})", mark, test.name, message);
            }
            None => {
                let _ = writeln!(out, "{} {}", mark, test.name);
            }
        }
    }
    if let Some(error) = script_error {
        let _ = write!(out, "\nScript error: {}", error);
    }
    out.trim_end().to_string()
}

fn timeline_lines(timeline: &Timeline) -> String {
    let total = timeline.total_ms().max(1);
    let mut out = String::new();
    for phase in &timeline.phases {
        let lead = phase.offset_ms * TIMELINE_BAR_WIDTH / total;
        let width = (phase.duration_ms * TIMELINE_BAR_WIDTH / total).max(1);
        let _ = writeln!(
            out,
            "{:<10} {:>6} ms  {}{} {} ms",
            phase.name,
            phase.offset_ms,
            " ".repeat(lead as usize),
            "█".repeat(width as usize),
            phase.duration_ms
        );
    }
    let _ = write!(out, "{:<10} {:>6} ms", "total", timeline.total_ms());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, HttpResponse, TestSpec};

    fn response(body: &str, content_type: &str) -> TransportResponse {
        TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status: 200,
                reason: "OK".into(),
                headers: vec![("Content-Type".into(), content_type.into())],
                body: body.into(),
            }),
            timeline: None,
            duration_ms: 12,
        }
    }

    fn input(outcome: Outcome) -> RenderInput {
        RenderInput {
            title: "get item".into(),
            environment: Some("dev".into()),
            request: Request::new(HttpMethod::GET, "https://api/items/1"),
            vars: HashMap::new(),
            outcome,
        }
    }

    #[test]
    fn test_pretty_json() {
        let snap = format_snapshot(&input(Outcome::Completed(response(r#"{"a":1}"#, "application/json"))));
        assert_eq!(snap.projection(Tab::Pretty), Some("{\n  \"a\": 1\n}"));
        assert_eq!(snap.summary, "200 OK · 12 ms");
        assert!(snap.ready);
        assert!(!snap.has(Tab::Tests));
        assert!(!snap.has(Tab::Timeline));
    }

    #[test]
    fn test_malformed_json_degrades_to_raw() {
        let snap = format_snapshot(&input(Outcome::Completed(response("{broken", "application/json"))));
        assert_eq!(snap.projection(Tab::Pretty), Some("{broken"));
        assert!(snap.projection(Tab::Raw).unwrap_or_default().starts_with("HTTP 200 OK"));
    }

    #[test]
    fn test_failure_projection() {
        let snap = format_snapshot(&input(Outcome::Failed("connection refused".into())));
        assert_eq!(snap.projection(Tab::Pretty), Some("Error: connection refused"));
        assert!(snap.is_failure());
    }

    #[test]
    fn test_assertions_and_script_error() {
        let mut inp = input(Outcome::Completed(response(r#"{"id":7}"#, "application/json")));
        inp.request.tests = vec![
            TestSpec { name: "ok".into(), expression: "response.status == 200".into(), pos: Default::default() },
            TestSpec { name: "id".into(), expression: "response.json.id == 8".into(), pos: Default::default() },
            TestSpec { name: "bad".into(), expression: "response.status ==".into(), pos: Default::default() },
        ];
        let snap = format_snapshot(&inp);
        let tests = snap.tests.clone().unwrap_or_default();
        assert_eq!(tests.len(), 3);
        assert!(tests[0].passed);
        assert!(!tests[1].passed);
        assert!(!tests[2].passed);
        assert!(snap.script_error.as_deref().unwrap_or_default().starts_with("bad:"));
        assert!(snap.is_failure());
        assert!(snap.projection(Tab::Tests).unwrap_or_default().starts_with("1/3 passed"));
    }

    #[test]
    fn test_timeline_projection() {
        let mut resp = response("", "text/plain");
        let mut timeline = Timeline::default();
        timeline.push("headers", 0, 20);
        timeline.push("body", 20, 10);
        resp.timeline = Some(timeline);
        let snap = format_snapshot(&input(Outcome::Completed(resp)));
        let text = snap.projection(Tab::Timeline).unwrap_or_default();
        assert!(text.contains("headers"));
        assert!(text.ends_with("30 ms"));
        assert_eq!(snap.projection(Tab::Pretty), Some("(empty body)"));
    }
}
