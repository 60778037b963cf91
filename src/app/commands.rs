//! Command handlers - process events and produce effects

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::app::state::{AppState, Effect, PendingSend, SendKind};
use crate::apply::{apply_request_specs, ApplyError, Scope};
use crate::compare::{CompareBundle, CompareRun};
use crate::curl::to_curl;
use crate::messages::ui_events::Section;
use crate::messages::{NetworkCommand, NetworkResponse};
use crate::models::{Environment, Outcome, Request};
use crate::render::format::summary_line;
use crate::render::{format_snapshot, RenderComplete, RenderInput, RenderJob, ResponseSnapshot, StreamId, Tab};
use crate::storage::{HistoryEntry, WorkflowRecord};
use crate::templates::resolve_request;
use crate::workflow::{
    captures, condition_holds, step_lines, PlannedStep, WorkflowDef, WorkflowState, WorkflowStepResult,
};

/// Run the request's apply specs, then resolve its templates. Variable
/// edits land in `vars`; on error, edits from earlier specs stay there.
pub fn prepare_request(
    request: &Request,
    vars: &mut HashMap<String, String>,
    env: Option<&Environment>,
) -> Result<Request, ApplyError> {
    let mut patched = request.clone();
    apply_request_specs(&mut patched, vars, env)?;
    let scope = Scope::new(vars).with_request(&patched).with_env(env);
    Ok(resolve_request(&patched, &scope))
}

impl AppState {
    // ------------------------------------------------------------------
    // Sidebar
    // ------------------------------------------------------------------

    /// Enter on the sidebar
    pub fn activate(&mut self) -> Vec<Effect> {
        match self.section {
            Section::Requests => self.send_selected(),
            Section::Workflows => match self.workspace.workflows.get(self.selected).cloned() {
                Some(def) => self.start_workflow(def),
                None => Vec::new(),
            },
            Section::History => self.replay_history(self.selected),
        }
    }

    pub fn send_selected(&mut self) -> Vec<Effect> {
        match self.selected_request().cloned() {
            Some(request) => self.send_request(request),
            None => {
                self.status = String::from("Select a request first");
                Vec::new()
            }
        }
    }

    pub fn compare_selected(&mut self) -> Vec<Effect> {
        match self.selected_request().cloned() {
            Some(request) => self.start_compare(request),
            None => {
                self.status = String::from("Select a request first");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Single sends
    // ------------------------------------------------------------------

    pub fn send_request(&mut self, request: Request) -> Vec<Effect> {
        let env = self.current_environment().cloned();
        let resolved = match prepare_request(&request, &mut self.shared_vars, env.as_ref()) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(request = %request.name, error = %e, "apply failed, request not sent");
                self.status = e.to_string();
                return Vec::new();
            }
        };

        let id = self.next_id();
        tracing::info!(id, request = %request.name, "sending");
        self.pending.insert(
            id,
            PendingSend {
                kind: SendKind::Single,
                title: request.name.clone(),
                environment: env.map(|e| e.name),
                request: resolved.clone(),
            },
        );
        self.latest_send = Some(id);
        self.status = format!("Sending {}...", request.name);
        vec![Effect::Network(NetworkCommand::Send { id, request: resolved })]
    }

    /// Start formatting `outcome` on `stream`
    fn render(&mut self, stream: StreamId, pending: PendingSend, outcome: Outcome) -> Effect {
        let token = self.scheduler.begin(stream);
        Effect::Render(RenderJob {
            token,
            input: RenderInput {
                title: pending.title,
                environment: pending.environment,
                request: pending.request,
                vars: self.shared_vars.clone(),
                outcome,
            },
        })
    }

    /// Handle a response from the network layer
    pub fn handle_response(&mut self, response: NetworkResponse) -> Vec<Effect> {
        let NetworkResponse::Finished { id, outcome } = response;
        let Some(pending) = self.pending.remove(&id) else {
            tracing::debug!(id, "response for a send nobody waits on");
            return Vec::new();
        };

        match pending.kind.clone() {
            SendKind::Single => self.finish_single(id, pending, outcome),
            SendKind::Compare(env) => self.finish_compare_row(env, pending, outcome),
            SendKind::Workflow => self.finish_workflow_send(id, pending, outcome),
        }
    }

    fn finish_single(&mut self, id: u64, pending: PendingSend, outcome: Outcome) -> Vec<Effect> {
        self.history.append(HistoryEntry::Single {
            request: pending.request.clone(),
            environment: pending.environment.clone(),
            outcome: outcome.clone(),
            at: Utc::now(),
        });
        if self.latest_send != Some(id) {
            tracing::debug!(id, "superseded by a newer send, not displayed");
            return Vec::new();
        }
        self.status = summary_line(&outcome);
        vec![self.render(StreamId::Main, pending, outcome)]
    }

    /// Handle a finished render
    pub fn handle_render_complete(&mut self, done: RenderComplete) -> Vec<Effect> {
        if !self.scheduler.accept(&done.token) {
            return Vec::new();
        }
        let snapshot = Arc::new(done.snapshot);
        match done.token.stream {
            StreamId::Main => {
                self.panes.publish(snapshot);
                Vec::new()
            }
            StreamId::Compare(env) => {
                if let Some(run) = self.compare.as_mut() {
                    run.cache_snapshot(&env, snapshot);
                }
                self.publish_compare_focus();
                Vec::new()
            }
            StreamId::Workflow => self.complete_workflow_step(snapshot),
        }
    }

    // ------------------------------------------------------------------
    // Compare
    // ------------------------------------------------------------------

    /// Environments to compare across, each named once, in order
    fn compare_targets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        if self.config.compare_environments.is_empty() {
            return self
                .workspace
                .environments
                .iter()
                .map(|e| e.name.clone())
                .filter(|name| seen.insert(name.clone()))
                .collect();
        }
        self.config
            .compare_environments
            .iter()
            .filter(|name| {
                let known = self.workspace.environment(name).is_some();
                if !known {
                    tracing::warn!(environment = %name, "compare target not loaded");
                }
                known
            })
            .filter(|name| seen.insert(name.to_string()))
            .cloned()
            .collect()
    }

    /// Send `request` once per target environment. Each environment works
    /// on its own copy of the shared variables.
    pub fn start_compare(&mut self, request: Request) -> Vec<Effect> {
        let targets = self.compare_targets();
        if targets.is_empty() {
            self.status = String::from("Compare needs at least one environment");
            return Vec::new();
        }
        let baseline = self
            .config
            .compare_baseline
            .clone()
            .filter(|b| targets.contains(b))
            .or_else(|| {
                self.current_environment()
                    .map(|e| e.name.clone())
                    .filter(|n| targets.contains(n))
            })
            .unwrap_or_else(|| targets[0].clone());

        let mut effects = self.cancel_compare();
        let mut run = CompareRun::new(CompareBundle::new(request.clone(), baseline, &targets));

        for name in &targets {
            let Some(env) = self.workspace.environment(name).cloned() else {
                continue;
            };
            let mut vars = self.shared_vars.clone();
            match prepare_request(&request, &mut vars, Some(&env)) {
                Ok(resolved) => {
                    let id = self.next_id();
                    self.pending.insert(
                        id,
                        PendingSend {
                            kind: SendKind::Compare(name.clone()),
                            title: request.name.clone(),
                            environment: Some(name.clone()),
                            request: resolved.clone(),
                        },
                    );
                    effects.push(Effect::Network(NetworkCommand::Send { id, request: resolved }));
                }
                Err(e) => {
                    tracing::warn!(environment = %name, error = %e, "apply failed for compare row");
                    let outcome = Outcome::Failed(e.to_string());
                    run.record(name, outcome.clone(), to_curl(&request));
                    let pending = PendingSend {
                        kind: SendKind::Compare(name.clone()),
                        title: request.name.clone(),
                        environment: Some(name.clone()),
                        request: request.clone(),
                    };
                    effects.push(self.render(StreamId::Compare(name.clone()), pending, outcome));
                }
            }
        }

        tracing::info!(request = %request.name, environments = targets.len(), "compare started");
        self.status = format!("Comparing {} across {} environments", request.name, targets.len());
        self.compare = Some(run);
        self.complete_compare_if_done();
        let focused = self.panes.focused();
        self.panes.set_tab(focused, Tab::Compare);
        self.sync_compare_view();
        effects
    }

    /// Drop the running compare's sends and renders
    fn cancel_compare(&mut self) -> Vec<Effect> {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| matches!(p.kind, SendKind::Compare(_)))
            .map(|(id, _)| *id)
            .collect();
        self.scheduler.reset_compare();
        ids.into_iter()
            .map(|id| {
                self.pending.remove(&id);
                Effect::Network(NetworkCommand::Cancel(id))
            })
            .collect()
    }

    fn finish_compare_row(&mut self, env: String, pending: PendingSend, outcome: Outcome) -> Vec<Effect> {
        let Some(run) = self.compare.as_mut() else {
            return Vec::new();
        };
        run.record(&env, outcome.clone(), to_curl(&pending.request));
        self.complete_compare_if_done();
        self.sync_compare_view();
        vec![self.render(StreamId::Compare(env), pending, outcome)]
    }

    fn complete_compare_if_done(&mut self) {
        let Some(run) = self.compare.as_ref() else {
            return;
        };
        if !run.bundle.is_complete() {
            return;
        }
        let failures = run.bundle.rows.iter().filter(|r| r.is_failure()).count();
        tracing::info!(
            request = %run.bundle.request.name,
            failures,
            "compare finished"
        );
        self.status = format!(
            "Compare finished: {}/{} environments failed",
            failures,
            run.bundle.rows.len()
        );
        self.history.append(HistoryEntry::Compare(run.bundle.clone()));
    }

    fn sync_compare_view(&mut self) {
        match &self.compare {
            Some(run) => self.panes.set_compare(
                run.table(),
                run.focused_snapshot().cloned(),
                run.baseline_snapshot().cloned(),
            ),
            None => self.panes.clear_compare(),
        }
    }

    /// Show the focused row's cached snapshot in the following panes
    fn publish_compare_focus(&mut self) {
        let focused = self.compare.as_ref().and_then(|run| run.focused_snapshot().cloned());
        if let Some(snapshot) = focused {
            if self.panes.latest().map(|s| s.id) != Some(snapshot.id) {
                self.panes.publish(snapshot);
            }
        }
        self.sync_compare_view();
    }

    pub fn compare_focus(&mut self, forward: bool) {
        let Some(run) = self.compare.as_mut() else {
            return;
        };
        if forward {
            run.focus_next();
        } else {
            run.focus_prev();
        }
        self.publish_compare_focus();
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    pub fn start_workflow(&mut self, def: WorkflowDef) -> Vec<Effect> {
        if self.workflow.as_ref().map(|w| !w.is_finished()).unwrap_or(false) {
            self.status = String::from("A workflow is already running");
            return Vec::new();
        }
        tracing::info!(workflow = %def.name, steps = def.steps.len(), "workflow started");
        self.scheduler.reset(&StreamId::Workflow);
        self.workflow = Some(WorkflowState::new(&def));
        self.advance_workflow()
    }

    /// Issue the next step, recording skipped and failed-to-prepare steps
    /// along the way
    fn advance_workflow(&mut self) -> Vec<Effect> {
        loop {
            let env = self.current_environment().cloned();
            let Some(step) = self.workflow.as_ref().and_then(|wf| wf.next_step().cloned()) else {
                return Vec::new();
            };

            if let Some(condition) = &step.when {
                match condition_holds(condition, &self.shared_vars, env.as_ref()) {
                    Ok(true) => {}
                    Ok(false) => {
                        self.record_step(WorkflowStepResult::skipped(
                            &step,
                            format!("`{}` is false", condition),
                        ));
                        continue;
                    }
                    Err(e) => {
                        self.record_step(WorkflowStepResult::failed(&step, e.to_string()));
                        continue;
                    }
                }
            }

            let Some(request) = self.workspace.find_request(&step.request).cloned() else {
                self.record_step(WorkflowStepResult::failed(
                    &step,
                    format!("unknown request `{}`", step.request),
                ));
                continue;
            };

            match prepare_request(&request, &mut self.shared_vars, env.as_ref()) {
                Ok(resolved) => {
                    let id = self.next_id();
                    if let Some(wf) = self.workflow.as_mut() {
                        wf.mark_sent(id);
                    }
                    self.pending.insert(
                        id,
                        PendingSend {
                            kind: SendKind::Workflow,
                            title: step.label(),
                            environment: env.map(|e| e.name),
                            request: resolved.clone(),
                        },
                    );
                    self.status = format!("Workflow step {}", step.label());
                    return vec![Effect::Network(NetworkCommand::Send { id, request: resolved })];
                }
                Err(e) => {
                    self.record_step(WorkflowStepResult::failed(&step, e.to_string()));
                }
            }
        }
    }

    fn record_step(&mut self, result: WorkflowStepResult) {
        let finished_now = match self.workflow.as_mut() {
            Some(wf) => {
                let before = wf.is_finished();
                wf.record(result);
                !before && wf.is_finished()
            }
            None => false,
        };
        if finished_now {
            self.finish_workflow();
        }
    }

    /// A step's send came back: hold the outcome, then format it
    fn finish_workflow_send(&mut self, id: u64, pending: PendingSend, outcome: Outcome) -> Vec<Effect> {
        let Some(wf) = self.workflow.as_mut() else {
            return Vec::new();
        };
        if !wf.accepts(id) {
            tracing::debug!(id, "stale workflow step ignored");
            return Vec::new();
        }
        wf.hold(outcome.clone(), pending.request.clone());
        vec![self.render(StreamId::Workflow, pending, outcome)]
    }

    /// The step's snapshot is ready: judge it and move on
    fn complete_workflow_step(&mut self, snapshot: Arc<ResponseSnapshot>) -> Vec<Effect> {
        let Some(step) = self.workflow.as_ref().and_then(|wf| wf.current_step().cloned()) else {
            return Vec::new();
        };
        self.conclude_step(&step, snapshot);
        self.advance_workflow()
    }

    /// Record the step's result and apply its captures together
    fn conclude_step(&mut self, step: &PlannedStep, snapshot: Arc<ResponseSnapshot>) {
        let failed_tests = snapshot
            .tests
            .as_ref()
            .map(|tests| tests.iter().filter(|t| !t.passed).count())
            .unwrap_or(0);
        let result = match &snapshot.outcome {
            Some(outcome) => WorkflowStepResult::from_outcome(step, outcome, failed_tests),
            None => WorkflowStepResult::failed(step, "no response"),
        };
        if let Some(response) = snapshot.outcome.as_ref().and_then(|o| o.response()) {
            for (name, value) in captures(step, response) {
                tracing::debug!(step = %step.name, var = %name, "captured");
                self.shared_vars.insert(name, value);
            }
        }
        self.panes.publish(snapshot);
        self.record_step(result);
    }

    /// A step that already came back but is still formatting is judged
    /// in place, so cancel never drops an executed step
    fn settle_returned_step(&mut self) {
        let Some((step, (outcome, request))) = self
            .workflow
            .as_ref()
            .and_then(|wf| Some((wf.current_step()?.clone(), wf.held()?.clone())))
        else {
            return;
        };
        let input = RenderInput {
            title: step.label(),
            environment: self.current_environment().map(|e| e.name.clone()),
            request,
            vars: self.shared_vars.clone(),
            outcome,
        };
        let snapshot = Arc::new(format_snapshot(&input));
        self.conclude_step(&step, snapshot);
    }

    fn finish_workflow(&mut self) {
        let Some(wf) = self.workflow.as_ref() else {
            return;
        };
        tracing::info!(
            workflow = %wf.name,
            canceled = wf.canceled,
            executed = wf.results().len(),
            planned = wf.steps.len(),
            "workflow finished"
        );
        self.history.append(HistoryEntry::Workflow(WorkflowRecord {
            name: wf.name.clone(),
            started_at: wf.started_at,
            ended_at: wf.ended_at,
            canceled: wf.canceled,
            planned_steps: wf.steps.len(),
            results: wf.results().to_vec(),
        }));
        let summary = ResponseSnapshot::summary_view(format!("workflow {}", wf.name), wf.summary_line())
            .with_projection(Tab::Pretty, wf.step_lines());
        self.status = wf.summary_line();
        self.panes.publish(Arc::new(summary));
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Cancel the running workflow, or else every send in flight
    pub fn cancel(&mut self) -> Vec<Effect> {
        let running = self.workflow.as_ref().map(|w| !w.is_finished()).unwrap_or(false);
        if running {
            self.settle_returned_step();
            self.scheduler.reset(&StreamId::Workflow);
            if self.workflow.as_ref().map(|w| w.is_finished()).unwrap_or(true) {
                return Vec::new();
            }
            let in_flight = self.workflow.as_mut().and_then(|wf| wf.cancel());
            let mut effects = Vec::new();
            if let Some(id) = in_flight {
                self.pending.remove(&id);
                effects.push(Effect::Network(NetworkCommand::Cancel(id)));
            }
            self.finish_workflow();
            return effects;
        }

        if self.pending.is_empty() {
            self.status = String::from("Nothing to cancel");
            return Vec::new();
        }
        self.status = String::from("Canceling...");
        self.pending
            .keys()
            .map(|id| Effect::Network(NetworkCommand::Cancel(*id)))
            .collect()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Re-display a history entry through the same render paths as a live run
    pub fn replay_history(&mut self, index: usize) -> Vec<Effect> {
        let Some(entry) = self.history.entries().into_iter().nth(index) else {
            return Vec::new();
        };
        match entry {
            HistoryEntry::Single {
                request,
                environment,
                outcome,
                ..
            } => {
                let pending = PendingSend {
                    kind: SendKind::Single,
                    title: request.name.clone(),
                    environment,
                    request,
                };
                vec![self.render(StreamId::Main, pending, outcome)]
            }
            HistoryEntry::Compare(bundle) => {
                let mut effects = self.cancel_compare();
                let request = bundle.request.clone();
                let rows = bundle.rows.clone();
                self.compare = Some(CompareRun::new(bundle));
                for row in rows {
                    let Some(outcome) = row.outcome else {
                        continue;
                    };
                    let pending = PendingSend {
                        kind: SendKind::Compare(row.environment.clone()),
                        title: request.name.clone(),
                        environment: Some(row.environment.clone()),
                        request: request.clone(),
                    };
                    effects.push(self.render(StreamId::Compare(row.environment), pending, outcome));
                }
                let focused = self.panes.focused();
                self.panes.set_tab(focused, Tab::Compare);
                self.sync_compare_view();
                effects
            }
            HistoryEntry::Workflow(record) => {
                let header = format!(
                    "{} · {} · {}/{} steps",
                    record.name,
                    if record.canceled { "canceled" } else { "finished" },
                    record.results.len(),
                    record.planned_steps
                );
                let mut text = step_lines(&header, &record.results);
                let not_run = record.planned_steps.saturating_sub(record.results.len());
                if record.canceled && not_run > 0 {
                    text.push_str(&format!("\n⊘ {} step(s) not run", not_run));
                }
                let summary = ResponseSnapshot::summary_view(format!("workflow {}", record.name), header)
                    .with_projection(Tab::Pretty, text);
                self.panes.publish(Arc::new(summary));
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Panes
    // ------------------------------------------------------------------

    pub fn next_tab(&mut self) {
        let focused = self.panes.focused();
        self.panes.cycle_tab(focused, true);
    }

    pub fn prev_tab(&mut self) {
        let focused = self.panes.focused();
        self.panes.cycle_tab(focused, false);
    }

    pub fn toggle_pin(&mut self) {
        let focused = self.panes.focused();
        self.panes.toggle_pin(focused);
    }

    pub fn scroll(&mut self, delta: i32) {
        let focused = self.panes.focused();
        self.panes.scroll(focused, delta);
    }

    // ------------------------------------------------------------------
    // cURL
    // ------------------------------------------------------------------

    /// Show the selected request as the curl command it would send.
    /// Works on a copy of the shared variables.
    pub fn export_curl(&mut self) {
        let Some(request) = self.selected_request().cloned() else {
            self.status = String::from("Select a request first");
            return;
        };
        let env = self.current_environment().cloned();
        let mut vars = self.shared_vars.clone();
        match prepare_request(&request, &mut vars, env.as_ref()) {
            Ok(resolved) => self.export = Some(to_curl(&resolved)),
            Err(e) => self.status = e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{ApplySpec, HttpMethod, HttpResponse, ResponsePayload, TestSpec, TransportResponse};
    use crate::panes::PaneId;
    use crate::storage::{HistoryStore, MemoryHistory, Workspace};
    use crate::workflow::WorkflowStep;
    use std::collections::BTreeMap;

    fn ok(status: u16, body: &str) -> Outcome {
        Outcome::Completed(TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status,
                reason: String::new(),
                headers: vec![("Content-Type".into(), "application/json".into())],
                body: body.into(),
            }),
            timeline: None,
            duration_ms: 3,
        })
    }

    fn request(name: &str) -> Request {
        let mut request = Request::new(HttpMethod::GET, format!("https://{{{{host}}}}/{}", name));
        request.name = name.into();
        request
    }

    fn workspace() -> Workspace {
        let mut collection = crate::models::Collection::new("api");
        for name in ["a", "b", "c", "d", "e"] {
            collection.requests.push(request(name));
        }
        Workspace {
            collections: vec![collection],
            environments: vec![
                Environment::new("dev").with("host", "dev.local"),
                Environment::new("stage").with("host", "stage.local"),
            ],
            workflows: Vec::new(),
        }
    }

    fn state() -> AppState {
        AppState::new(Config::default(), workspace())
    }

    /// Split effects into sends and render jobs
    fn split(effects: Vec<Effect>) -> (Vec<(u64, Request)>, Vec<RenderJob>) {
        let mut sends = Vec::new();
        let mut renders = Vec::new();
        for effect in effects {
            match effect {
                Effect::Network(NetworkCommand::Send { id, request }) => sends.push((id, request)),
                Effect::Render(job) => renders.push(job),
                Effect::Network(_) => {}
            }
        }
        (sends, renders)
    }

    /// Format synchronously and feed the completion back
    fn finish_renders(state: &mut AppState, jobs: Vec<RenderJob>) -> Vec<Effect> {
        jobs.into_iter()
            .flat_map(|job| {
                let snapshot = format_snapshot(&job.input);
                state.handle_render_complete(RenderComplete {
                    token: job.token,
                    snapshot,
                })
            })
            .collect()
    }

    fn respond(state: &mut AppState, id: u64, outcome: Outcome) -> Vec<RenderJob> {
        split(state.handle_response(NetworkResponse::Finished { id, outcome })).1
    }

    #[test]
    fn test_send_resolves_templates_for_current_env() {
        let mut state = state();
        let (sends, _) = split(state.send_request(request("a")));
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].1.url, "https://dev.local/a");
        assert!(state.is_loading());
    }

    #[test]
    fn test_apply_error_blocks_send() {
        let mut state = state();
        let mut req = request("a");
        req.apply = vec![
            ApplySpec::new(r#"{ vars: { seen: "yes" } }"#),
            ApplySpec::new("{ headers: }").at(4, 3),
        ];
        let effects = state.send_request(req);
        assert!(effects.is_empty());
        assert!(state.status.contains("apply #2"));
        assert!(state.status.contains("line 4"));
        // Edits from the first spec stay
        assert_eq!(state.shared_vars.get("seen").map(String::as_str), Some("yes"));
    }

    #[test]
    fn test_only_latest_send_is_displayed() {
        let mut state = state();
        let (first, _) = split(state.send_request(request("a")));
        let (second, _) = split(state.send_request(request("b")));

        // Newer response first, then the older one
        let jobs = respond(&mut state, second[0].0, ok(200, r#"{"n":2}"#));
        finish_renders(&mut state, jobs);
        let stale = respond(&mut state, first[0].0, ok(200, r#"{"n":1}"#));
        assert!(stale.is_empty());

        let shown = state.panes.snapshot(PaneId::Primary).cloned().unwrap();
        assert_eq!(shown.title, "b");
        assert_eq!(state.history.entries().len(), 2);
    }

    #[test]
    fn test_stale_render_token_discarded() {
        let mut state = state();
        let (sends, _) = split(state.send_request(request("a")));
        let mut jobs = respond(&mut state, sends[0].0, ok(200, "{}"));
        let job = jobs.remove(0);
        // A replay starts a newer render on the same stream
        let newer = state.scheduler.begin(StreamId::Main);
        let effects = state.handle_render_complete(RenderComplete {
            token: job.token.clone(),
            snapshot: format_snapshot(&job.input),
        });
        assert!(effects.is_empty());
        assert!(state.panes.snapshot(PaneId::Primary).is_none());
        assert_ne!(job.token, newer);
    }

    #[test]
    fn test_pinned_pane_keeps_snapshot() {
        let mut state = state();
        let (sends, _) = split(state.send_request(request("a")));
        let jobs = respond(&mut state, sends[0].0, ok(200, "{}"));
        finish_renders(&mut state, jobs);
        state.panes.toggle_split();

        let (sends, _) = split(state.send_request(request("b")));
        let jobs = respond(&mut state, sends[0].0, ok(200, "{}"));
        finish_renders(&mut state, jobs);

        let primary = state.panes.snapshot(PaneId::Primary).cloned().unwrap();
        let secondary = state.panes.snapshot(PaneId::Secondary).cloned().unwrap();
        assert_eq!(primary.title, "b");
        assert_eq!(secondary.title, "a");
        assert!(state.panes.diff_available());
    }

    #[test]
    fn test_compare_selects_first_failure() {
        let mut state = state();
        let (sends, _) = split(state.start_compare(request("a")));
        assert_eq!(sends.len(), 2);
        let by_env: HashMap<String, u64> = state
            .pending
            .iter()
            .filter_map(|(id, p)| p.environment.clone().map(|e| (e, *id)))
            .collect();

        let mut jobs = respond(&mut state, by_env["dev"], ok(200, "{}"));
        jobs.extend(respond(&mut state, by_env["stage"], ok(500, "{}")));
        finish_renders(&mut state, jobs);

        let run = state.compare.as_ref().unwrap();
        assert!(run.bundle.is_complete());
        assert_eq!(run.focused_row().map(|r| r.environment.as_str()), Some("stage"));
        assert!(run.bundle.rows[1].request_text.contains("stage.local"));
        assert_eq!(state.panes.latest().map(|s| s.environment.clone()), Some(Some("stage".into())));
        assert!(state.panes.diff_available());
        assert!(matches!(state.history.entries()[0], HistoryEntry::Compare(_)));
    }

    #[test]
    fn test_compare_repeated_environment_sent_once() {
        let mut state = state();
        state.config.compare_environments = vec!["dev".into(), "dev".into()];
        let (sends, _) = split(state.start_compare(request("a")));
        assert_eq!(sends.len(), 1);
        let jobs = respond(&mut state, sends[0].0, ok(200, "{}"));
        finish_renders(&mut state, jobs);

        let run = state.compare.as_ref().unwrap();
        assert_eq!(run.bundle.rows.len(), 1);
        assert!(run.bundle.is_complete());
        assert_eq!(state.history.entries().len(), 1);
    }

    #[test]
    fn test_compare_all_success_uses_baseline() {
        let mut state = state();
        state.config.compare_baseline = Some("stage".into());
        let (sends, _) = split(state.start_compare(request("a")));
        let mut jobs = Vec::new();
        for (id, _) in sends {
            jobs.extend(respond(&mut state, id, ok(200, "{}")));
        }
        finish_renders(&mut state, jobs);
        let run = state.compare.as_ref().unwrap();
        assert_eq!(run.focused_row().map(|r| r.environment.as_str()), Some("stage"));
    }

    #[test]
    fn test_compare_failed_assertion_selected() {
        let mut state = state();
        let mut req = request("a");
        req.tests = vec![TestSpec {
            name: "dev only".into(),
            expression: r#"response.json.env == "dev""#.into(),
            pos: Default::default(),
        }];
        let (sends, _) = split(state.start_compare(req));
        let mut jobs = Vec::new();
        for (id, sent) in sends {
            let env = if sent.url.contains("dev") { "dev" } else { "stage" };
            jobs.extend(respond(&mut state, id, ok(200, &format!(r#"{{"env":"{}"}}"#, env))));
        }
        finish_renders(&mut state, jobs);
        let run = state.compare.as_ref().unwrap();
        assert_eq!(run.focused_row().map(|r| r.environment.as_str()), Some("stage"));
    }

    #[test]
    fn test_compare_history_replay_rebuilds_bundle() {
        let mut state = state();
        let (sends, _) = split(state.start_compare(request("a")));
        let mut jobs = Vec::new();
        for (id, _) in sends {
            jobs.extend(respond(&mut state, id, ok(200, "{}")));
        }
        finish_renders(&mut state, jobs);
        state.compare = None;

        let (_, jobs) = split(state.replay_history(0));
        assert_eq!(jobs.len(), 2);
        finish_renders(&mut state, jobs);
        let run = state.compare.as_ref().unwrap();
        assert!(run.snapshot("dev").is_some());
        assert!(run.snapshot("stage").is_some());
    }

    fn five_step_workflow() -> WorkflowDef {
        WorkflowDef {
            name: "five".into(),
            steps: ["a", "b", "c", "d", "e"]
                .iter()
                .map(|name| WorkflowStep {
                    name: name.to_string(),
                    request: name.to_string(),
                    when: None,
                    repeat: 1,
                    branch: None,
                    continue_on_error: false,
                    expect_status: None,
                    capture: BTreeMap::new(),
                })
                .collect(),
        }
    }

    /// Drive one workflow step to completion, returning the next sends
    fn complete_step(state: &mut AppState, id: u64, outcome: Outcome) -> Vec<(u64, Request)> {
        let jobs = respond(state, id, outcome);
        split(finish_renders(state, jobs)).0
    }

    #[test]
    fn test_workflow_cancel_after_two_steps() {
        let mut state = state();
        let (mut sends, _) = split(state.start_workflow(five_step_workflow()));
        for _ in 0..2 {
            let (id, _) = sends.remove(0);
            sends = complete_step(&mut state, id, ok(200, "{}"));
        }
        let (third, _) = sends.remove(0);

        let effects = state.cancel();
        assert!(matches!(&effects[..], [Effect::Network(NetworkCommand::Cancel(id))] if *id == third));

        // The canceled send reporting back is ignored
        assert!(respond(&mut state, third, Outcome::Canceled).is_empty());

        let wf = state.workflow.as_ref().unwrap();
        assert!(wf.canceled);
        assert_eq!(wf.results().len(), 2);
        let shown = wf.display_results();
        assert_eq!(shown.len(), 5);
        assert_eq!(shown.iter().filter(|r| r.canceled).count(), 3);

        match &state.history.entries()[0] {
            HistoryEntry::Workflow(record) => {
                assert!(record.canceled);
                assert_eq!(record.results.len(), 2);
            }
            other => panic!("unexpected history entry {:?}", other),
        }
    }

    #[test]
    fn test_workflow_cancel_keeps_returned_step() {
        let mut state = state();
        let mut def = five_step_workflow();
        def.steps[0].capture = BTreeMap::from([("t".to_string(), "json:/t".to_string())]);
        let (sends, _) = split(state.start_workflow(def));
        let first = sends[0].0;

        // Step one is back but still formatting
        let jobs = respond(&mut state, first, ok(200, r#"{"t":"kept"}"#));
        assert_eq!(jobs.len(), 1);
        assert!(!state.shared_vars.contains_key("t"));

        let effects = state.cancel();
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::Network(NetworkCommand::Cancel(id)) if *id == first)));

        let wf = state.workflow.as_ref().unwrap();
        assert!(wf.canceled);
        assert_eq!(wf.results().len(), 1);
        assert!(!wf.results()[0].canceled);
        assert!(wf.results()[0].success);
        assert!(!wf.display_results()[0].canceled);
        assert_eq!(state.shared_vars.get("t").map(String::as_str), Some("kept"));

        // The render finishing late changes nothing
        assert!(finish_renders(&mut state, jobs).is_empty());
        assert_eq!(state.workflow.as_ref().unwrap().results().len(), 1);

        match &state.history.entries()[0] {
            HistoryEntry::Workflow(record) => {
                assert!(record.canceled);
                assert_eq!(record.results.len(), 1);
            }
            other => panic!("unexpected history entry {:?}", other),
        }
    }

    #[test]
    fn test_workflow_cancel_on_last_returned_step_finishes_run() {
        let mut state = state();
        let mut def = five_step_workflow();
        def.steps.truncate(1);
        let (sends, _) = split(state.start_workflow(def));
        respond(&mut state, sends[0].0, ok(200, "{}"));

        assert!(state.cancel().is_empty());
        let wf = state.workflow.as_ref().unwrap();
        assert!(!wf.canceled);
        assert!(wf.succeeded());
        assert_eq!(state.history.entries().len(), 1);
    }

    #[test]
    fn test_workflow_captures_feed_next_step() {
        let mut state = state();
        let mut def = five_step_workflow();
        def.steps.truncate(2);
        def.steps[0].capture = BTreeMap::from([("token".to_string(), "json:/token".to_string())]);
        state.workspace.collections[0].requests[1].apply =
            vec![ApplySpec::new(r#"{ headers: { Authorization: "Bearer " + vars.token } }"#)];

        let (sends, _) = split(state.start_workflow(def));
        let next = complete_step(&mut state, sends[0].0, ok(200, r#"{"token":"t-9"}"#));
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].1.headers.get("authorization"), Some("Bearer t-9"));

        let done = complete_step(&mut state, next[0].0, ok(200, "{}"));
        assert!(done.is_empty());
        let wf = state.workflow.as_ref().unwrap();
        assert!(wf.is_finished());
        assert!(wf.succeeded());
        let latest = state.panes.latest().cloned().unwrap();
        assert!(latest.title.starts_with("workflow"));
    }

    #[test]
    fn test_workflow_skip_and_halt() {
        let mut state = state();
        let mut def = five_step_workflow();
        def.steps.truncate(3);
        def.steps[0].when = Some("vars.enabled == \"yes\"".into());
        def.steps[2].request = "missing".into();

        let (sends, _) = split(state.start_workflow(def));
        // Step one is skipped, so the first send is step two
        assert_eq!(sends[0].1.url, "https://dev.local/b");
        let next = complete_step(&mut state, sends[0].0, ok(500, "{}"));
        assert!(next.is_empty());
        let wf = state.workflow.as_ref().unwrap();
        assert!(wf.is_finished());
        assert_eq!(wf.results().len(), 2);
        assert!(wf.results()[0].skipped);
        assert!(!wf.results()[1].success);
    }

    #[test]
    fn test_cancel_single_send() {
        let mut state = state();
        let (sends, _) = split(state.send_request(request("a")));
        let effects = state.cancel();
        assert!(matches!(&effects[..], [Effect::Network(NetworkCommand::Cancel(id))] if *id == sends[0].0));
        let jobs = respond(&mut state, sends[0].0, Outcome::Canceled);
        finish_renders(&mut state, jobs);
        let shown = state.panes.snapshot(PaneId::Primary).cloned().unwrap();
        assert_eq!(shown.projection(Tab::Pretty), Some("Request canceled"));
        assert!(!shown.is_failure());
    }

    #[test]
    fn test_export_curl_uses_resolved_request() {
        let mut state = state();
        state.export_curl();
        assert_eq!(state.export.as_deref(), Some("curl \\\n  'https://dev.local/a'"));
    }

    #[test]
    fn test_history_store_is_pluggable() {
        let history: Box<dyn HistoryStore> = Box::new(MemoryHistory::new(1));
        let mut state = AppState::with_history(Config::default(), workspace(), history);
        let (sends, _) = split(state.send_request(request("a")));
        respond(&mut state, sends[0].0, ok(200, "{}"));
        let (sends, _) = split(state.send_request(request("b")));
        respond(&mut state, sends[0].0, ok(200, "{}"));
        assert_eq!(state.history.entries().len(), 1);
    }
}
