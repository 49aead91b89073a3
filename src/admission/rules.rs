//! Declarative policy configuration.
//!
//! This module loads a policy description from YAML and turns it into a
//! root [`Policy`]:
//!
//! ```yaml
//! allow: 100
//! per_secs: 60
//! then:
//!   - action: deny
//!   - action: extend_ban
//!     secs: 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::policy::Policy;
use super::reject::Then;
use crate::error::{Result, TurnstileError};

/// Configuration for a single root policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Accesses allowed per client (0 means unlimited)
    #[serde(default)]
    pub allow: u64,
    /// Idle window in seconds (added to `per_ms`; both 0 means forever)
    #[serde(default)]
    pub per_secs: u64,
    /// Idle window in milliseconds
    #[serde(default)]
    pub per_ms: u64,
    /// Reject chain, run in order for denied requests
    #[serde(default)]
    pub then: Vec<RejectAction>,
}

/// A reject handler, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RejectAction {
    Pass,
    Deny,
    ExtendBan { secs: u64 },
}

impl From<RejectAction> for Then {
    fn from(action: RejectAction) -> Self {
        match action {
            RejectAction::Pass => Then::pass(),
            RejectAction::Deny => Then::deny(),
            RejectAction::ExtendBan { secs } => Then::extend_ban(Duration::from_secs(secs)),
        }
    }
}

impl PolicyConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading policy configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy config: {}", e)))
    }

    /// Get the configured idle window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.per_secs) + Duration::from_millis(self.per_ms)
    }

    /// Build a root policy with a fresh store and no downstream handler.
    pub fn build(&self) -> Policy {
        Policy::new()
            .allow(self.allow)
            .per(self.window())
            .then(self.then.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::policy::{EVER, UNLIMITED};
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
allow: 100
per_secs: 60
then:
  - action: deny
  - action: extend_ban
    secs: 300
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.allow, 100);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert_eq!(
            config.then,
            vec![RejectAction::Deny, RejectAction::ExtendBan { secs: 300 }]
        );
    }

    #[test]
    fn test_parse_defaults() {
        let config = PolicyConfig::from_yaml("allow: 3").unwrap();
        assert_eq!(config.allow, 3);
        assert_eq!(config.window(), EVER);
        assert!(config.then.is_empty());
    }

    #[test]
    fn test_window_combines_units() {
        let config = PolicyConfig::from_yaml("per_secs: 1\nper_ms: 500").unwrap();
        assert_eq!(config.window(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_unknown_action_fails() {
        let yaml = r#"
then:
  - action: explode
"#;
        let result = PolicyConfig::from_yaml(yaml);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_build_policy() {
        let config = PolicyConfig {
            allow: 5,
            per_secs: 10,
            per_ms: 0,
            then: vec![RejectAction::Pass, RejectAction::Deny],
        };

        let policy = config.build();
        assert_eq!(policy.threshold(), 5);
        assert_eq!(policy.window(), Duration::from_secs(10));
        assert_eq!(policy.reject_chain_len(), 2);
        assert!(!policy.has_downstream());
    }

    #[test]
    fn test_build_default_is_unlimited() {
        let policy = PolicyConfig::default().build();
        assert_eq!(policy.threshold(), UNLIMITED);
        assert_eq!(policy.window(), EVER);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "allow: 7\nthen:\n  - action: pass").unwrap();

        let config = PolicyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.allow, 7);
        assert_eq!(config.then, vec![RejectAction::Pass]);
    }

    #[test]
    fn test_from_missing_file() {
        let result = PolicyConfig::from_file("/nonexistent/turnstile.yaml");
        assert!(matches!(result, Err(TurnstileError::Io(_))));
    }
}
