//! Network layer - request execution
//!
//! The Network actor receives send commands and reports one outcome per send.

pub mod actor;
pub mod client;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{Request, TransportResponse};

pub use actor::NetworkActor;
pub use client::HttpTransport;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("request timed out ({0}s)")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Protocol(String),
    #[error("error reading body: {0}")]
    Body(String),
    #[error("cannot read body file {path}: {message}")]
    File { path: String, message: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("canceled")]
    Canceled,
}

/// Something that can put a request on the wire
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, stopping early once `cancel` fires
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Result<TransportResponse, TransportError>;
}
