//! Network messages - communication between App and Network layers

use crate::models::{Outcome, Request};

/// Commands sent from App layer to Network layer
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    /// Send a request whose templates have already been resolved
    Send { id: u64, request: Request },
    /// Cancel a pending send
    Cancel(u64),
    /// Shutdown the network actor
    Shutdown,
}

/// Responses sent from Network layer to App layer
#[derive(Debug, Clone)]
pub enum NetworkResponse {
    /// A send ended: completed, failed or canceled. Sent exactly once per id.
    Finished { id: u64, outcome: Outcome },
}

impl NetworkResponse {
    /// Get the request ID from the response
    pub fn id(&self) -> u64 {
        match self {
            NetworkResponse::Finished { id, .. } => *id,
        }
    }
}
