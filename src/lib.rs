//! # Relay TUI
//!
//! A terminal API client built around patchable requests.
//!
//! ## Features
//! - Apply specs: expressions that patch a request before it is sent
//! - Template placeholders resolved from request, shared and environment variables
//! - Split response panes with pinning and a diff tab
//! - Compare one request across environments
//! - Workflows: sequential steps with conditions, repeats and captures
//! - Request history with replay
//! - cURL export
//!
//! ## Architecture
//! Actor-based with channels:
//! - UI Layer (Ratatui) - synchronous
//! - App Layer (State machine)
//! - Network Layer (Tokio runtime)
//! - Render workers (blocking pool), results checked against render tokens

pub mod apply;
pub mod app;
pub mod compare;
pub mod config;
pub mod constants;
pub mod curl;
pub mod messages;
pub mod models;
pub mod network;
pub mod panes;
pub mod render;
pub mod storage;
pub mod templates;
pub mod ui;
pub mod workflow;

// Re-export commonly used types
pub use models::{Request, HttpMethod, Header, Headers, AuthType, Collection, Environment, Outcome};
pub use curl::to_curl;
pub use apply::{apply, evaluate_expression, ApplyError, ExprError};
pub use messages::{UiEvent, NetworkCommand, NetworkResponse, RenderState};
pub use app::{AppState, AppActor};
pub use network::{NetworkActor, Transport, TransportError};
