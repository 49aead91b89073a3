//! Configuration management for the Turnstile replay tool.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::admission::PolicyConfig;
use crate::error::{Result, TurnstileError};

/// Main configuration for the `turnstile` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Traffic to replay
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Policy the traffic is replayed against
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Remote address the requests come from
    #[serde(default = "default_remote_addr")]
    pub remote_addr: String,

    /// Number of requests to send
    #[serde(default = "default_requests")]
    pub requests: u64,

    /// Pause between requests in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            remote_addr: default_remote_addr(),
            requests: default_requests(),
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_remote_addr() -> String {
    "127.0.0.1:40000".to_string()
}

fn default_requests() -> u64 {
    10
}

fn default_interval_ms() -> u64 {
    100
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::RejectAction;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.replay.remote_addr, "127.0.0.1:40000");
        assert_eq!(config.replay.requests, 10);
        assert_eq!(config.replay.interval_ms, 100);
        assert_eq!(config.policy, PolicyConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
replay:
  remote_addr: "198.51.100.4:5000"
  requests: 3
policy:
  allow: 2
  per_ms: 250
  then:
    - action: deny
"#
        )
        .unwrap();

        let config = TurnstileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.replay.remote_addr, "198.51.100.4:5000");
        assert_eq!(config.replay.requests, 3);
        assert_eq!(config.replay.interval_ms, 100);
        assert_eq!(config.policy.allow, 2);
        assert_eq!(config.policy.then, vec![RejectAction::Deny]);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "replay: [not, a, map]").unwrap();

        let result = TurnstileConfig::from_file(file.path());
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }
}
