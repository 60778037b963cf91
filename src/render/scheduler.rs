//! Render scheduling with per-stream generation tokens
//!
//! Every formatting job is stamped with a token. When a newer job starts on
//! the same stream, or the stream is reset, older tokens stop being live and
//! their results are dropped on arrival.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::render::format::{format_snapshot, RenderInput};
use crate::render::snapshot::ResponseSnapshot;

/// Independent render streams
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StreamId {
    Main,
    Compare(String),
    Workflow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderToken {
    pub stream: StreamId,
    pub generation: u64,
}

/// Work handed to a blocking formatter
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub token: RenderToken,
    pub input: RenderInput,
}

/// Posted back into the app loop when formatting finishes
#[derive(Debug)]
pub struct RenderComplete {
    pub token: RenderToken,
    pub snapshot: ResponseSnapshot,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    next_generation: u64,
    live: HashMap<StreamId, u64>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render on `stream`, superseding any in flight
    pub fn begin(&mut self, stream: StreamId) -> RenderToken {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.live.insert(stream.clone(), generation);
        RenderToken { stream, generation }
    }

    /// True only for the live token of its stream. Accepting clears the
    /// loading state.
    pub fn accept(&mut self, token: &RenderToken) -> bool {
        match self.live.get(&token.stream) {
            Some(&live) if live == token.generation => {
                self.live.remove(&token.stream);
                true
            }
            _ => {
                tracing::debug!(stream = ?token.stream, generation = token.generation, "discarding stale render");
                false
            }
        }
    }

    pub fn reset(&mut self, stream: &StreamId) {
        self.live.remove(stream);
    }

    /// Invalidate every compare stream
    pub fn reset_compare(&mut self) {
        self.live.retain(|stream, _| !matches!(stream, StreamId::Compare(_)));
    }

    pub fn is_loading(&self, stream: &StreamId) -> bool {
        self.live.contains_key(stream)
    }
}

/// Format `job` on the blocking pool and post the result to `tx`
pub fn spawn_render(job: RenderJob, tx: mpsc::UnboundedSender<RenderComplete>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let snapshot = format_snapshot(&job.input);
        let _ = tx.send(RenderComplete {
            token: job.token,
            snapshot,
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, Outcome, Request};
    use crate::render::snapshot::Tab;

    fn job(token: RenderToken) -> RenderJob {
        RenderJob {
            token,
            input: RenderInput {
                title: "req".into(),
                environment: None,
                request: Request::new(HttpMethod::GET, "https://api/x"),
                vars: HashMap::new(),
                outcome: Outcome::Failed("boom".into()),
            },
        }
    }

    #[test]
    fn test_newer_token_supersedes_older() {
        let mut scheduler = RenderScheduler::new();
        let first = scheduler.begin(StreamId::Main);
        let second = scheduler.begin(StreamId::Main);
        assert!(scheduler.is_loading(&StreamId::Main));
        assert!(!scheduler.accept(&first));
        assert!(scheduler.accept(&second));
        assert!(!scheduler.is_loading(&StreamId::Main));
        // Accepting twice is not allowed
        assert!(!scheduler.accept(&second));
    }

    #[test]
    fn test_streams_are_independent() {
        let mut scheduler = RenderScheduler::new();
        let main = scheduler.begin(StreamId::Main);
        let dev = scheduler.begin(StreamId::Compare("dev".into()));
        let prod = scheduler.begin(StreamId::Compare("prod".into()));
        assert!(scheduler.accept(&dev));
        scheduler.reset_compare();
        assert!(!scheduler.accept(&prod));
        assert!(scheduler.accept(&main));
    }

    #[test]
    fn test_reset_invalidates() {
        let mut scheduler = RenderScheduler::new();
        let token = scheduler.begin(StreamId::Workflow);
        scheduler.reset(&StreamId::Workflow);
        assert!(!scheduler.is_loading(&StreamId::Workflow));
        assert!(!scheduler.accept(&token));
    }

    #[tokio::test]
    async fn test_stale_completion_discarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RenderScheduler::new();
        let stale = scheduler.begin(StreamId::Main);
        let live = scheduler.begin(StreamId::Main);

        spawn_render(job(stale), tx.clone()).await.unwrap();
        spawn_render(job(live.clone()), tx).await.unwrap();

        let mut accepted = Vec::new();
        while let Some(done) = rx.recv().await {
            if scheduler.accept(&done.token) {
                accepted.push(done);
            }
        }
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].token, live);
        assert_eq!(accepted[0].snapshot.projection(Tab::Pretty), Some("Error: boom"));
    }
}
