//! App actor - message loop processing UI events, network responses and
//! finished renders

use tokio::sync::mpsc;

use crate::app::state::{AppState, Effect};
use crate::messages::{NetworkCommand, NetworkResponse, RenderState, UiEvent};
use crate::render::{spawn_render, RenderComplete};

/// App actor that owns the state and carries out its effects
pub struct AppActor {
    state: AppState,
    network_tx: mpsc::UnboundedSender<NetworkCommand>,
    render_tx: mpsc::UnboundedSender<RenderState>,
    done_tx: mpsc::UnboundedSender<RenderComplete>,
    done_rx: Option<mpsc::UnboundedReceiver<RenderComplete>>,
}

impl AppActor {
    pub fn new(
        state: AppState,
        network_tx: mpsc::UnboundedSender<NetworkCommand>,
        render_tx: mpsc::UnboundedSender<RenderState>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        AppActor {
            state,
            network_tx,
            render_tx,
            done_tx,
            done_rx: Some(done_rx),
        }
    }

    /// Run the actor message loop
    pub async fn run(
        mut self,
        mut ui_rx: mpsc::UnboundedReceiver<UiEvent>,
        mut net_rx: mpsc::UnboundedReceiver<NetworkResponse>,
    ) {
        let Some(mut done_rx) = self.done_rx.take() else {
            return;
        };

        // Send initial render state
        let _ = self.render_tx.send(self.state.to_render_state());

        loop {
            tokio::select! {
                Some(event) = ui_rx.recv() => {
                    if self.handle_ui_event(event) {
                        // Quit signal received
                        let _ = self.network_tx.send(NetworkCommand::Shutdown);
                        break;
                    }
                }
                Some(response) = net_rx.recv() => {
                    let effects = self.state.handle_response(response);
                    self.run_effects(effects);
                }
                Some(done) = done_rx.recv() => {
                    let effects = self.state.handle_render_complete(done);
                    self.run_effects(effects);
                }
                else => break,
            }
            let _ = self.render_tx.send(self.state.to_render_state());
        }
        tracing::info!("app actor stopped");
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Network(cmd) => {
                    let _ = self.network_tx.send(cmd);
                }
                Effect::Render(job) => {
                    spawn_render(job, self.done_tx.clone());
                }
            }
        }
    }

    /// Handle a UI event, returns true if quit was requested
    fn handle_ui_event(&mut self, event: UiEvent) -> bool {
        let effects = match event {
            // Sidebar
            UiEvent::NextSection => {
                self.state.next_section();
                Vec::new()
            }
            UiEvent::PrevSection => {
                self.state.prev_section();
                Vec::new()
            }
            UiEvent::SelectNext => {
                self.state.select_next();
                Vec::new()
            }
            UiEvent::SelectPrev => {
                self.state.select_prev();
                Vec::new()
            }
            UiEvent::Activate => self.state.activate(),

            // Execution
            UiEvent::SendRequest => self.state.send_selected(),
            UiEvent::CompareRequest => self.state.compare_selected(),
            UiEvent::CancelRequest => self.state.cancel(),
            UiEvent::CycleEnvironment => {
                self.state.cycle_environment();
                Vec::new()
            }

            // Panes
            UiEvent::NextTab => {
                self.state.next_tab();
                Vec::new()
            }
            UiEvent::PrevTab => {
                self.state.prev_tab();
                Vec::new()
            }
            UiEvent::ToggleSplit => {
                self.state.panes.toggle_split();
                Vec::new()
            }
            UiEvent::TogglePin => {
                self.state.toggle_pin();
                Vec::new()
            }
            UiEvent::FocusNextPane => {
                self.state.panes.focus_next();
                Vec::new()
            }
            UiEvent::ScrollUp => {
                self.state.scroll(-1);
                Vec::new()
            }
            UiEvent::ScrollDown => {
                self.state.scroll(1);
                Vec::new()
            }
            UiEvent::Resize(height) => {
                self.state.panes.set_viewport_height(height);
                Vec::new()
            }

            // Compare rows
            UiEvent::CompareNext => {
                self.state.compare_focus(true);
                Vec::new()
            }
            UiEvent::ComparePrev => {
                self.state.compare_focus(false);
                Vec::new()
            }

            // cURL
            UiEvent::ExportCurl => {
                self.state.export_curl();
                Vec::new()
            }
            UiEvent::CloseExport => {
                self.state.close_export();
                Vec::new()
            }

            // Popups
            UiEvent::ToggleHelp => {
                self.state.toggle_help();
                Vec::new()
            }
            UiEvent::CloseHelp => {
                self.state.close_help();
                Vec::new()
            }

            // System
            UiEvent::Quit => return true,
        };

        self.run_effects(effects);
        false
    }
}
