//! App state - pure data structure with no I/O logic
//!
//! Every mutation happens on the app loop. Methods that need I/O return
//! `Effect`s for the actor to carry out.

use std::collections::HashMap;

use crate::compare::CompareRun;
use crate::config::Config;
use crate::messages::ui_events::Section;
use crate::messages::{NetworkCommand, PaneView, RenderState};
use crate::models::{Environment, Request};
use crate::panes::PaneSet;
use crate::render::{RenderJob, RenderScheduler, StreamId};
use crate::storage::{HistoryStore, MemoryHistory, Workspace};
use crate::workflow::WorkflowState;

/// Work the actor performs on behalf of the state
#[derive(Debug, Clone)]
pub enum Effect {
    Network(NetworkCommand),
    Render(RenderJob),
}

/// What a send id belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum SendKind {
    Single,
    Compare(String),
    Workflow,
}

/// Bookkeeping for a send on the wire
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub kind: SendKind,
    pub title: String,
    pub environment: Option<String>,
    /// Resolved request, as handed to the transport
    pub request: Request,
}

/// Main application state - pure data, no I/O
pub struct AppState {
    pub config: Config,
    pub workspace: Workspace,
    pub shared_vars: HashMap<String, String>,
    pub current_env: Option<usize>,
    pub history: Box<dyn HistoryStore>,

    // Results
    pub panes: PaneSet,
    pub scheduler: RenderScheduler,
    pub compare: Option<CompareRun>,
    pub workflow: Option<WorkflowState>,

    // Sends in flight
    pub pending: HashMap<u64, PendingSend>,
    pub latest_send: Option<u64>,
    pub next_request_id: u64,

    // Sidebar
    pub section: Section,
    pub selected: usize,

    // Status and popups
    pub status: String,
    pub show_help: bool,
    pub export: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default(), Workspace::default())
    }
}

impl AppState {
    pub fn new(config: Config, workspace: Workspace) -> Self {
        let history = Box::new(MemoryHistory::new(config.max_history));
        Self::with_history(config, workspace, history)
    }

    pub fn with_history(config: Config, workspace: Workspace, history: Box<dyn HistoryStore>) -> Self {
        let current_env = config
            .default_environment
            .as_deref()
            .and_then(|name| workspace.environments.iter().position(|e| e.name == name))
            .or(if workspace.environments.is_empty() { None } else { Some(0) });

        AppState {
            config,
            workspace,
            shared_vars: HashMap::new(),
            current_env,
            history,
            panes: PaneSet::new(),
            scheduler: RenderScheduler::new(),
            compare: None,
            workflow: None,
            pending: HashMap::new(),
            latest_send: None,
            next_request_id: 1,
            section: Section::Requests,
            selected: 0,
            status: String::from("Ready"),
            show_help: false,
            export: None,
        }
    }

    /// Generate a unique request ID
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn current_environment(&self) -> Option<&Environment> {
        self.current_env.and_then(|i| self.workspace.environments.get(i))
    }

    pub fn cycle_environment(&mut self) {
        let count = self.workspace.environments.len();
        if count == 0 {
            self.status = String::from("No environments loaded");
            return;
        }
        let next = self.current_env.map(|i| (i + 1) % count).unwrap_or(0);
        self.current_env = Some(next);
        self.status = format!("Environment: {}", self.workspace.environments[next].name);
    }

    /// Labels of the active sidebar section
    pub fn section_items(&self) -> Vec<String> {
        match self.section {
            Section::Requests => self
                .workspace
                .requests()
                .map(|r| format!("{} {}", r.method, r.name))
                .collect(),
            Section::Workflows => self.workspace.workflows.iter().map(|w| w.name.clone()).collect(),
            Section::History => self.history.entries().iter().map(|e| e.title()).collect(),
        }
    }

    pub fn selected_request(&self) -> Option<&Request> {
        if self.section != Section::Requests {
            return None;
        }
        self.workspace.requests().nth(self.selected)
    }

    pub fn next_section(&mut self) {
        self.section = self.section.next();
        self.selected = 0;
    }

    pub fn prev_section(&mut self) {
        self.section = self.section.prev();
        self.selected = 0;
    }

    pub fn select_next(&mut self) {
        let count = self.section_items().len();
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn select_prev(&mut self) {
        let count = self.section_items().len();
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
            || self.scheduler.is_loading(&StreamId::Main)
            || self.scheduler.is_loading(&StreamId::Workflow)
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn close_help(&mut self) {
        self.show_help = false;
    }

    pub fn close_export(&mut self) {
        self.export = None;
    }

    /// Convert state to RenderState for UI
    pub fn to_render_state(&self) -> RenderState {
        let main_loading = self
            .latest_send
            .map(|id| self.pending.contains_key(&id))
            .unwrap_or(false)
            || self.scheduler.is_loading(&StreamId::Main);

        let panes = self
            .panes
            .panes()
            .map(|pane| {
                let snapshot = pane.snapshot();
                PaneView {
                    id: pane.id,
                    title: snapshot.map(|s| s.title.clone()).unwrap_or_default(),
                    summary: snapshot.map(|s| s.summary.clone()).unwrap_or_default(),
                    tabs: self.panes.available_tabs(pane.id),
                    active_tab: pane.active_tab(),
                    follow_latest: pane.follow_latest(),
                    focused: self.panes.focused() == pane.id,
                    loading: pane.follow_latest() && main_loading,
                    body: self.panes.projection(pane.id),
                    scroll: pane.viewport.offset,
                }
            })
            .collect();

        RenderState {
            section: self.section,
            items: self.section_items(),
            selected: self.selected,
            environment: self.current_environment().map(|e| e.name.clone()),
            panes,
            workflow: self.workflow.as_ref().map(|w| w.step_lines()),
            status: self.status.clone(),
            is_loading: self.is_loading(),
            show_help: self.show_help,
            export: self.export.clone(),
        }
    }
}
