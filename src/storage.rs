use crate::compare::CompareBundle;
use crate::models::{Collection, Environment, Outcome, Request};
use crate::workflow::{WorkflowDef, WorkflowStepResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// A finished workflow run. Only steps that actually ran are kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    pub planned_steps: usize,
    pub results: Vec<WorkflowStepResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    Single {
        request: Request,
        environment: Option<String>,
        outcome: Outcome,
        at: DateTime<Utc>,
    },
    Compare(CompareBundle),
    Workflow(WorkflowRecord),
}

impl HistoryEntry {
    pub fn title(&self) -> String {
        match self {
            HistoryEntry::Single { request, .. } => format!("{} {}", request.method, request.url),
            HistoryEntry::Compare(bundle) => format!(
                "compare {} ({} envs)",
                bundle.request.name,
                bundle.rows.len()
            ),
            HistoryEntry::Workflow(record) => format!("workflow {}", record.name),
        }
    }
}

/// Where finished executions are kept
pub trait HistoryStore: Send {
    fn append(&mut self, entry: HistoryEntry);
    /// Newest first
    fn entries(&self) -> Vec<HistoryEntry>;
}

/// Bounded in-memory history
pub struct MemoryHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl MemoryHistory {
    pub fn new(limit: usize) -> Self {
        MemoryHistory {
            entries: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.limit {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Collections, environments and workflows loaded from the config dir
#[derive(Debug, Default)]
pub struct Workspace {
    pub collections: Vec<Collection>,
    pub environments: Vec<Environment>,
    pub workflows: Vec<WorkflowDef>,
}

impl Workspace {
    /// Load every `*.env.yaml`, `*.workflow.yaml` and `*.yaml` collection in
    /// `dir`. Files that fail to parse are skipped and logged.
    pub fn load(dir: &Path) -> Result<Workspace> {
        let mut workspace = Workspace::default();
        if !dir.exists() {
            return Ok(workspace);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        paths.sort();

        for path in paths {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let result = if filename.ends_with(".env.yaml") {
                read_yaml::<Environment>(&path).map(|env| workspace.environments.push(env))
            } else if filename.ends_with(".workflow.yaml") {
                read_yaml::<WorkflowDef>(&path).map(|wf| workspace.workflows.push(wf))
            } else if filename.ends_with(".yaml") && filename != "config.yaml" {
                read_yaml::<Collection>(&path).map(|col| workspace.collections.push(col))
            } else {
                continue;
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "skipping workspace file");
            }
        }

        tracing::info!(
            collections = workspace.collections.len(),
            environments = workspace.environments.len(),
            workflows = workspace.workflows.len(),
            "workspace loaded"
        );
        Ok(workspace)
    }

    pub fn find_request(&self, name: &str) -> Option<&Request> {
        self.collections.iter().find_map(|c| c.find(name))
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    pub fn workflow(&self, name: &str) -> Option<&WorkflowDef> {
        self.workflows.iter().find(|w| w.name == name)
    }

    /// Every request across collections, in load order
    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.collections.iter().flat_map(|c| c.requests.iter())
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    let value = serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;

    fn single(url: &str) -> HistoryEntry {
        HistoryEntry::Single {
            request: Request::new(HttpMethod::GET, url),
            environment: None,
            outcome: Outcome::Canceled,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_history_newest_first_and_bounded() {
        let mut history = MemoryHistory::new(2);
        history.append(single("https://a"));
        history.append(single("https://b"));
        history.append(single("https://c"));
        let titles: Vec<String> = history.entries().iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["GET https://c", "GET https://b"]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_load_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("dev.env.yaml"),
            "name: dev\nvariables:\n  host: dev.local\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("api.yaml"),
            "name: api\nrequests:\n  - name: Health\n    url: https://{{host}}/health\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("smoke.workflow.yaml"),
            "name: smoke\nsteps:\n  - name: health\n    request: Health\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.yaml"), "name: [").unwrap();
        fs::write(dir.path().join("config.yaml"), "timeout_secs: 5\n").unwrap();

        let ws = Workspace::load(dir.path()).unwrap();
        assert_eq!(ws.environments.len(), 1);
        assert_eq!(ws.collections.len(), 1);
        assert_eq!(ws.workflows.len(), 1);
        let health = ws.find_request("Health").unwrap();
        assert_eq!(health.method, HttpMethod::GET);
        assert_eq!(ws.environment("dev").and_then(|e| e.get("host")).map(String::as_str), Some("dev.local"));
        assert!(ws.workflow("smoke").is_some());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::load(&dir.path().join("nope")).unwrap();
        assert!(ws.collections.is_empty());
    }
}
