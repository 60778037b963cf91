//! App layer - central state management and command processing
//!
//! The App actor receives UI events, network responses and finished
//! renders, updates state, and emits network commands, render jobs and
//! render state.

pub mod state;
pub mod actor;
pub mod commands;

pub use state::{AppState, Effect};
pub use actor::AppActor;
pub use commands::prepare_request;
