//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use parley_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_OUTBOUND_QUEUE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + websocket listener.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Human-readable name reported by `/info`.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Parley Relay"`
    pub instance_name: String,

    /// Frames buffered per connection before further writes to it are dropped.
    /// Env: `OUTBOUND_QUEUE_SIZE`
    /// Default: `256`
    pub outbound_queue_size: usize,

    /// Sustained HTTP requests per second allowed per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `10`
    pub rate_limit_per_sec: f64,

    /// Burst size of the per-IP token bucket.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            instance_name: "Parley Relay".to_string(),
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(name) = var("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        if let Some(val) = var("OUTBOUND_QUEUE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbound_queue_size = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_QUEUE_SIZE, using default"),
            }
        }

        if let Some(val) = var("RATE_LIMIT_PER_SEC") {
            match parse_positive(&val) {
                Some(rate) => config.rate_limit_per_sec = rate,
                None => tracing::warn!(value = %val, "Invalid RATE_LIMIT_PER_SEC, using default"),
            }
        }

        if let Some(val) = var("RATE_LIMIT_BURST") {
            match parse_positive(&val) {
                Some(burst) => config.rate_limit_burst = burst,
                None => tracing::warn!(value = %val, "Invalid RATE_LIMIT_BURST, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}
