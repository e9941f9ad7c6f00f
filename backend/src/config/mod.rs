//! Server configuration.
//!
//! Read from the environment (a `.env` file is loaded first if present):
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TABWRIGHT_HOST` | `0.0.0.0` | Bind address |
//! | `TABWRIGHT_PORT` | `3000` | Bind port |
//! | `TABWRIGHT_MAX_UPLOAD_MB` | `50` | Largest accepted upload |
//! | `TABWRIGHT_STATIC_DIR` | unset | Directory served at `/` (a built frontend) |
//!
//! Invalid values fall back to the default with a warning. CLI flags
//! override the environment.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::api::logs::log_warning;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// HTTP server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        // Try loading .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup (the environment, or a map in tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let host = parse_or(&lookup, "TABWRIGHT_HOST", defaults.host);
        let port = parse_or(&lookup, "TABWRIGHT_PORT", defaults.port);
        let max_upload_mb = parse_or(&lookup, "TABWRIGHT_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB);
        let static_dir = lookup("TABWRIGHT_STATIC_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            static_dir,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the bind address
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Serve a static directory at `/`
    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = Some(dir);
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log_warning(format!("Invalid {key}='{raw}', using the default"));
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().to_string(), format!("{DEFAULT_HOST}:3000"));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TABWRIGHT_HOST", "127.0.0.1"),
            ("TABWRIGHT_PORT", "8080"),
            ("TABWRIGHT_MAX_UPLOAD_MB", "5"),
            ("TABWRIGHT_STATIC_DIR", "frontend/dist"),
        ]));
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.static_dir, Some(PathBuf::from("frontend/dist")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TABWRIGHT_HOST", "not-an-ip"),
            ("TABWRIGHT_PORT", "99999"),
        ]));
        assert_eq!(config.host, ServerConfig::default().host);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::default()
            .with_port(9000)
            .with_host(IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
    }
}
