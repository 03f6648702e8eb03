//! # Configuration
//!
//! Process-level configuration loaded from environment variables.
//!
//! - `controller`: work queue, worker pool and cache-sync settings
//! - `server`: HTTP server settings for metrics and probes
//!
//! Command-line flags parsed in `main.rs` take precedence over the values
//! loaded here.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
