//! Network actor - runs sends in the Tokio runtime

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::messages::{NetworkCommand, NetworkResponse};
use crate::models::Outcome;
use crate::network::{Transport, TransportError};

/// Network actor that processes send commands
pub struct NetworkActor {
    transport: Arc<dyn Transport>,
    response_tx: mpsc::UnboundedSender<NetworkResponse>,
    active_requests: JoinSet<u64>,
    cancel_handles: HashMap<u64, CancellationToken>,
}

impl NetworkActor {
    pub fn new(transport: Arc<dyn Transport>, response_tx: mpsc::UnboundedSender<NetworkResponse>) -> Self {
        NetworkActor {
            transport,
            response_tx,
            active_requests: JoinSet::new(),
            cancel_handles: HashMap::new(),
        }
    }

    /// Run the network actor message loop
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<NetworkCommand>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(NetworkCommand::Send { id, request }) => {
                            let cancel = CancellationToken::new();
                            self.cancel_handles.insert(id, cancel.clone());

                            let transport = self.transport.clone();
                            let response_tx = self.response_tx.clone();

                            self.active_requests.spawn(async move {
                                tracing::info!(id, url = %request.url, method = %request.method, "Executing request");
                                let outcome = match transport.send(&request, &cancel).await {
                                    Ok(response) => Outcome::Completed(response),
                                    Err(TransportError::Canceled) => Outcome::Canceled,
                                    Err(e) => Outcome::Failed(e.to_string()),
                                };
                                tracing::info!(id, failed = outcome.is_failure(), "Request finished");
                                let _ = response_tx.send(NetworkResponse::Finished { id, outcome });
                                id
                            });
                        }

                        Some(NetworkCommand::Cancel(id)) => {
                            if let Some(cancel) = self.cancel_handles.remove(&id) {
                                tracing::info!(id, "Cancelling request");
                                cancel.cancel();
                            }
                        }

                        Some(NetworkCommand::Shutdown) | None => {
                            for (_, cancel) in self.cancel_handles.drain() {
                                cancel.cancel();
                            }
                            break;
                        }
                    }
                }

                Some(result) = self.active_requests.join_next() => {
                    if let Ok(id) = result {
                        self.cancel_handles.remove(&id);
                    }
                }
            }
        }
    }
}
