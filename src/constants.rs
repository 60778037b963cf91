//! Application constants
//!
//! Centralized location for magic strings and configuration defaults.

/// Default URL for new HTTP requests
pub const DEFAULT_HTTP_URL: &str = "https://httpbin.org/get";

/// Application name
pub const APP_NAME: &str = "Relay";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory under $HOME holding config, environments, collections and workflows
pub const CONFIG_DIR_NAME: &str = ".relay";

/// Default per-send timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retained history entries
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default log file name (relative to the config dir)
pub const DEFAULT_LOG_FILE: &str = "relay.log";

/// Placeholder shown when a diff has nothing to compare
pub const DIFF_UNAVAILABLE: &str = "Diff unavailable: needs two ready responses";

/// Placeholder shown when two compared responses match
pub const DIFF_IDENTICAL: &str = "Responses are identical";
