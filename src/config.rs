//! Configuration for the detection helpers

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::compat::ConnectionKind;
use crate::error::{Error, Result};

/// Knobs of the detection helpers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Processes whose command line contains this are never matched by
    /// command-line search, so the tool does not find itself
    pub self_marker: String,
    /// Program queried as `<service_command> <name> status`
    pub service_command: String,
    /// Kind used when a listening-port search does not name one
    pub default_connection_kind: ConnectionKind,
    /// `timeout` parameter written into HTTP checks, in whole seconds
    #[serde(with = "secs")]
    pub http_check_timeout: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            self_marker: "procwatch".to_string(),
            service_command: "service".to_string(),
            default_connection_kind: ConnectionKind::Inet,
            http_check_timeout: Duration::from_secs(10),
        }
    }
}

impl DetectionConfig {
    pub fn builder() -> DetectionConfigBuilder {
        DetectionConfigBuilder::default()
    }

    /// Load and validate a JSON config file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.self_marker.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "self_marker cannot be empty".to_string(),
            ));
        }
        if self.service_command.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "service_command cannot be empty".to_string(),
            ));
        }
        if self.http_check_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "http_check_timeout must be positive".to_string(),
            ));
        }
        if self.http_check_timeout.subsec_nanos() != 0 {
            return Err(Error::InvalidConfiguration(format!(
                "http_check_timeout must be whole seconds, got {:?}",
                self.http_check_timeout
            )));
        }
        Ok(())
    }
}

/// Builder for [`DetectionConfig`]
#[derive(Debug, Default)]
pub struct DetectionConfigBuilder {
    config: DetectionConfig,
}

impl DetectionConfigBuilder {
    pub fn self_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.self_marker = marker.into();
        self
    }

    pub fn service_command(mut self, command: impl Into<String>) -> Self {
        self.config.service_command = command.into();
        self
    }

    pub fn default_connection_kind(mut self, kind: ConnectionKind) -> Self {
        self.config.default_connection_kind = kind;
        self
    }

    pub fn http_check_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_check_timeout = Duration::from_secs(secs);
        self
    }

    pub fn build(self) -> Result<DetectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_check_timeout, Duration::from_secs(10));
        assert_eq!(config.default_connection_kind, ConnectionKind::Inet);
    }

    #[test]
    fn test_builder() -> Result<()> {
        let config = DetectionConfig::builder()
            .self_marker("agent-setup")
            .service_command("systemctl-status")
            .default_connection_kind(ConnectionKind::Tcp)
            .http_check_timeout_secs(30)
            .build()?;

        assert_eq!(config.self_marker, "agent-setup");
        assert_eq!(config.service_command, "systemctl-status");
        assert_eq!(config.default_connection_kind, ConnectionKind::Tcp);
        assert_eq!(config.http_check_timeout, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn test_builder_validation() {
        assert!(DetectionConfig::builder().self_marker("  ").build().is_err());
        assert!(DetectionConfig::builder().service_command("").build().is_err());
        assert!(DetectionConfig::builder()
            .http_check_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_sub_second_timeout_rejected() {
        let config = DetectionConfig {
            http_check_timeout: Duration::from_millis(1500),
            ..DetectionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));

        let below_one = DetectionConfig {
            http_check_timeout: Duration::from_millis(500),
            ..DetectionConfig::default()
        };
        assert!(below_one.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"self_marker": "monitor-setup", "default_connection_kind": "tcp6"}}"#
        )
        .unwrap();

        let config = DetectionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.self_marker, "monitor-setup");
        assert_eq!(config.default_connection_kind, ConnectionKind::Tcp6);
        assert_eq!(config.service_command, "service");
        assert_eq!(config.http_check_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"http_check_timeout": 0}}"#).unwrap();
        assert!(matches!(
            DetectionConfig::from_file(file.path()),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
