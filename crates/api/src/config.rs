use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderValue;
use zenith_studio::ConfigError;

/// HTTP server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: IpAddr,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<HeaderValue>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            cors_origins: vec![HeaderValue::from_static("http://localhost:5173")],
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let host = match get("HOST") {
            Some(value) => value.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError {
                var: "HOST",
                reason: e.to_string(),
                value,
            })?,
            None => defaults.host,
        };

        let port = match get("PORT") {
            Some(value) => value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
                var: "PORT",
                reason: e.to_string(),
                value,
            })?,
            None => defaults.port,
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|origin| {
                    HeaderValue::from_str(origin).map_err(|e| ConfigError {
                        var: "CORS_ORIGINS",
                        value: origin.to_string(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.cors_origins,
        };

        let request_timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(value) => value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
                var: "REQUEST_TIMEOUT_SECS",
                reason: e.to_string(),
                value,
            })?,
            None => defaults.request_timeout_secs,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.cors_origins.len(), 1);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = ServerConfig::from_lookup(|var| match var {
            "CORS_ORIGINS" => Some("http://a.test, http://b.test,".into()),
            "PORT" => Some("8080".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = ServerConfig::from_lookup(|var| (var == "PORT").then(|| "http".to_string()));
        assert_matches!(result, Err(ConfigError { var: "PORT", .. }));
    }
}
