//! Immutable formatted record of one completed execution

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{Outcome, TestResult, Timeline};

/// Display tabs a pane can show
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tab {
    Pretty,
    Raw,
    Headers,
    Tests,
    Timeline,
    Compare,
    Diff,
}

impl Tab {
    pub const ALL: [Tab; 7] = [
        Tab::Pretty,
        Tab::Raw,
        Tab::Headers,
        Tab::Tests,
        Tab::Timeline,
        Tab::Compare,
        Tab::Diff,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Pretty => "Pretty",
            Tab::Raw => "Raw",
            Tab::Headers => "Headers",
            Tab::Tests => "Tests",
            Tab::Timeline => "Timeline",
            Tab::Compare => "Compare",
            Tab::Diff => "Diff",
        }
    }
}

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

fn next_snapshot_id() -> u64 {
    NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Debug)]
pub struct ResponseSnapshot {
    pub id: u64,
    pub ready: bool,
    pub title: String,
    pub environment: Option<String>,
    /// One-line status, e.g. `200 OK · 41 ms`
    pub summary: String,
    /// `None` for pending placeholders and summary views
    pub outcome: Option<Outcome>,
    pub request_text: String,
    pub timeline: Option<Timeline>,
    pub tests: Option<Vec<TestResult>>,
    pub script_error: Option<String>,
    projections: BTreeMap<Tab, String>,
}

impl ResponseSnapshot {
    pub(crate) fn build(
        title: String,
        environment: Option<String>,
        summary: String,
        outcome: Option<Outcome>,
        request_text: String,
    ) -> Self {
        ResponseSnapshot {
            id: next_snapshot_id(),
            ready: true,
            title,
            environment,
            summary,
            outcome,
            request_text,
            timeline: None,
            tests: None,
            script_error: None,
            projections: BTreeMap::new(),
        }
    }

    /// Placeholder for an execution that has not finished yet
    pub fn pending(title: impl Into<String>, environment: Option<String>) -> Self {
        let mut snapshot = ResponseSnapshot::build(
            title.into(),
            environment,
            String::from("Loading..."),
            None,
            String::new(),
        );
        snapshot.ready = false;
        snapshot.set(Tab::Pretty, "Loading...");
        snapshot
    }

    /// Snapshot carrying only display text (workflow and compare summaries)
    pub fn summary_view(title: impl Into<String>, summary: impl Into<String>) -> Self {
        ResponseSnapshot::build(title.into(), None, summary.into(), None, String::new())
    }

    pub(crate) fn set(&mut self, tab: Tab, text: impl Into<String>) {
        self.projections.insert(tab, text.into());
    }

    pub fn with_projection(mut self, tab: Tab, text: impl Into<String>) -> Self {
        self.set(tab, text);
        self
    }

    pub fn projection(&self, tab: Tab) -> Option<&str> {
        self.projections.get(&tab).map(String::as_str)
    }

    pub fn has(&self, tab: Tab) -> bool {
        self.projections.contains_key(&tab)
    }

    /// Tabs this snapshot can fill on its own (diff is decided by the panes)
    pub fn tabs(&self) -> Vec<Tab> {
        self.projections.keys().copied().collect()
    }

    /// Transport failure, error status, or a failed assertion
    pub fn is_failure(&self) -> bool {
        self.outcome.as_ref().map(Outcome::is_failure).unwrap_or(false)
            || self
                .tests
                .as_ref()
                .map(|tests| tests.iter().any(|t| !t.passed))
                .unwrap_or(false)
    }

    /// Text used when diffing two snapshots: status plus pretty body
    pub fn diff_text(&self) -> String {
        let status = match &self.outcome {
            Some(Outcome::Completed(resp)) => resp.payload.status_text(),
            Some(Outcome::Failed(err)) => format!("error: {}", err),
            Some(Outcome::Canceled) => String::from("canceled"),
            None => self.summary.clone(),
        };
        format!("{}\n{}", status, self.projection(Tab::Pretty).unwrap_or_default())
    }
}
