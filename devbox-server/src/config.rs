use std::time::Duration;

use anyhow::{Context, Result};
use devbox_orchestrations::ReleaseSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Namespace holding the devboxes; the kube client's default when unset
    pub namespace: Option<String>,
    /// Registry prefix of released images
    pub registry_addr: String,
    pub release: ReleaseSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ReleaseSettings::default();

        let poll_interval = match lookup("RELEASE_POLL_INTERVAL_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .context("RELEASE_POLL_INTERVAL_SECS must be a whole number of seconds")?,
            ),
            None => defaults.poll_interval,
        };
        let max_poll_attempts = match lookup("RELEASE_MAX_POLL_ATTEMPTS") {
            Some(attempts) => attempts
                .parse()
                .context("RELEASE_MAX_POLL_ATTEMPTS must be a positive number")?,
            None => defaults.max_poll_attempts,
        };

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: lookup("SERVER_PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            namespace: lookup("DEVBOX_NAMESPACE").filter(|ns| !ns.is_empty()),
            registry_addr: lookup("REGISTRY_ADDR").context("REGISTRY_ADDR must be set")?,
            release: ReleaseSettings {
                poll_interval,
                max_poll_attempts,
            },
        })
    }
}

/// Base URL of the API used by the client subcommands
pub fn api_url() -> String {
    std::env::var("DEVBOX_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("REGISTRY_ADDR", "hub.example.io")]).unwrap();

        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.namespace, None);
        assert_eq!(config.registry_addr, "hub.example.io");
        assert_eq!(config.release, ReleaseSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("REGISTRY_ADDR", "hub.example.io"),
            ("SERVER_PORT", "9000"),
            ("DEVBOX_NAMESPACE", "ns-dev"),
            ("RELEASE_POLL_INTERVAL_SECS", "1"),
            ("RELEASE_MAX_POLL_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.namespace.as_deref(), Some("ns-dev"));
        assert_eq!(config.release.poll_interval, Duration::from_secs(1));
        assert_eq!(config.release.max_poll_attempts, 5);
    }

    #[test]
    fn test_missing_registry_fails() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("REGISTRY_ADDR"));
    }

    #[test]
    fn test_invalid_numbers_fail() {
        assert!(load(&[("REGISTRY_ADDR", "r"), ("SERVER_PORT", "http")]).is_err());
        assert!(load(&[("REGISTRY_ADDR", "r"), ("RELEASE_MAX_POLL_ATTEMPTS", "-1")]).is_err());
        assert!(load(&[("REGISTRY_ADDR", "r"), ("RELEASE_POLL_INTERVAL_SECS", "1.5")]).is_err());
    }
}
