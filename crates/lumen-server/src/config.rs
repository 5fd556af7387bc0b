//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use lumen_shared::constants::DEFAULT_HTTP_PORT;

/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and websocket listener.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: none (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Directory where uploaded images are stored.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 10 MiB
    pub max_upload_size: usize,

    /// Externally visible base URL, used to build upload URLs.
    /// Env: `PUBLIC_URL`
    /// Default: `http://localhost:5001`
    pub public_url: String,

    /// Origins allowed by CORS. Empty means any origin.
    /// Env: `CLIENT_URL` (comma-separated)
    pub allowed_origins: Vec<String>,

    /// Session lifetime in hours.
    /// Env: `SESSION_TTL_HOURS`
    /// Default: `168` (one week). At most ten years.
    pub session_ttl_hours: i64,

    /// Sustained requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    pub rate_limit_per_sec: f64,

    /// Burst size per client IP.
    /// Env: `RATE_LIMIT_BURST`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_size: 10 * 1024 * 1024, // 10 MiB
            public_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            allowed_origins: Vec::new(),
            session_ttl_hours: 24 * 7,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup("UPLOAD_DIR").filter(|d| !d.is_empty()) {
            config.upload_dir = PathBuf::from(dir);
        }

        if let Some(size) = parse_var::<usize>(&lookup, "MAX_UPLOAD_SIZE") {
            config.max_upload_size = size;
        }

        if let Some(url) = lookup("PUBLIC_URL").filter(|u| !u.is_empty()) {
            config.public_url = url.trim_end_matches('/').to_string();
        }

        if let Some(origins) = lookup("CLIENT_URL") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(hours) = parse_var::<i64>(&lookup, "SESSION_TTL_HOURS") {
            if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
                config.session_ttl_hours = hours;
            } else {
                tracing::warn!(
                    hours,
                    max = MAX_SESSION_TTL_HOURS,
                    "SESSION_TTL_HOURS out of range, using default"
                );
            }
        }

        if let Some(rate) = parse_var::<f64>(&lookup, "RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate;
        }

        if let Some(burst) = parse_var::<f64>(&lookup, "RATE_LIMIT_BURST") {
            config.rate_limit_burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
