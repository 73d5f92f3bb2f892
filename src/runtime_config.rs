//! # Runtime Configuration Module
//!
//! Environment-variable tuning for the embedded server. These knobs affect how the
//! background server behaves, not what it serves; the served surface is configured
//! through [`crate::server::ServerConfig`].
//!
//! ## Environment Variables
//!
//! ### `DASHR_STACK_SIZE`
//!
//! Stack size for the may coroutines that run the accept loop and connection handlers.
//! Accepts decimal (`65536`) or hexadecimal (`0x10000`). Default: `0x10000` (64 KB).
//! Session applications run on these stacks, so rendering-heavy sessions may need more.
//!
//! ### `DASHR_SHUTDOWN_TIMEOUT_MS`
//!
//! How long `stop()` waits for the background thread to exit. Default: `5000`.
//!
//! ### `DASHR_PING_TIMEOUT_MS`
//!
//! Request timeout for liveness pings and the self-issued shutdown request.
//! Default: `2000`.
//!
//! ### `DASHR_STARTUP_TIMEOUT_MS`
//!
//! How long `start()` waits for the listener to report that it bound. Default: `2000`.
//!
//! ## Usage
//!
//! ```rust
//! use dashrouter::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 2_000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for server coroutines in bytes
    pub stack_size: usize,
    /// Upper bound on `stop()` waiting for the server thread
    pub shutdown_timeout: Duration,
    /// Timeout for ping and self-issued shutdown requests
    pub ping_timeout: Duration,
    /// Upper bound on `start()` waiting for the bind result
    pub startup_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            ping_timeout: Duration::from_millis(DEFAULT_PING_TIMEOUT_MS),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                lookup(key)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(default),
            )
        };
        let stack_size = lookup("DASHR_STACK_SIZE")
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);

        RuntimeConfig {
            stack_size,
            shutdown_timeout: millis("DASHR_SHUTDOWN_TIMEOUT_MS", DEFAULT_SHUTDOWN_TIMEOUT_MS),
            ping_timeout: millis("DASHR_PING_TIMEOUT_MS", DEFAULT_PING_TIMEOUT_MS),
            startup_timeout: millis("DASHR_STARTUP_TIMEOUT_MS", DEFAULT_STARTUP_TIMEOUT_MS),
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}
