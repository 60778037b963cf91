//! Render pipeline - formatting responses into snapshots off the app loop

pub mod diff;
pub mod format;
pub mod scheduler;
pub mod snapshot;

pub use format::{format_snapshot, RenderInput};
pub use scheduler::{spawn_render, RenderComplete, RenderJob, RenderScheduler, RenderToken, StreamId};
pub use snapshot::{ResponseSnapshot, Tab};
