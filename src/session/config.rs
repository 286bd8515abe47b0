//! Session configuration.

use std::time::Duration;

use crate::ble::transport::DeviceFilter;
use crate::ble::uuids::YINMIK_NAME_PREFIXES;
use crate::error::{Error, Result};

/// Default discovery window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);
/// Default deadline for opening a link and subscribing.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default deadline for a measurement reply.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(8);
/// Extra time a transport gets beyond the scan window before the scan is
/// abandoned.
pub const SCAN_GRACE: Duration = Duration::from_secs(2);

/// Tunables for a [`WandSession`](crate::WandSession).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// How long `scan()` listens for advertisements.
    pub scan_duration: Duration,
    /// Deadline covering link, service discovery and subscription.
    pub connect_timeout: Duration,
    /// Deadline for a reading after the request is written.
    pub read_timeout: Duration,
    /// Advertised-name prefixes accepted as wands.
    pub name_prefixes: Vec<String>,
    /// Write a handshake right after subscribing.
    pub handshake_on_connect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            name_prefixes: YINMIK_NAME_PREFIXES.iter().map(|p| p.to_string()).collect(),
            handshake_on_connect: true,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discovery window.
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read deadline.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Replace the accepted name prefixes.
    pub fn with_name_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable the handshake on connect.
    pub fn with_handshake_on_connect(mut self, enabled: bool) -> Self {
        self.handshake_on_connect = enabled;
        self
    }

    /// Scan filter built from the accepted name prefixes.
    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::with_prefixes(self.name_prefixes.iter().cloned())
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero duration or an empty
    /// prefix list.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("scan_duration", self.scan_duration),
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    value: format!("{:?}", value),
                });
            }
        }

        if self.name_prefixes.is_empty() || self.name_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidParameter {
                name: "name_prefixes".to_string(),
                value: format!("{:?}", self.name_prefixes),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(8));
        assert_eq!(config.name_prefixes.len(), YINMIK_NAME_PREFIXES.len());
        assert!(config.handshake_on_connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::new()
            .with_scan_duration(Duration::from_secs(2))
            .with_read_timeout(Duration::from_millis(500))
            .with_name_prefixes(["POOL"])
            .with_handshake_on_connect(false);

        assert_eq!(config.scan_duration, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert_eq!(config.name_prefixes, vec!["POOL".to_string()]);
        assert!(!config.handshake_on_connect);
        assert_eq!(config.device_filter().name_prefixes, vec!["POOL".to_string()]);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let config = SessionConfig::new().with_read_timeout(Duration::ZERO);
        match config.validate() {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "read_timeout"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_prefixes() {
        let none: [&str; 0] = [];
        assert!(SessionConfig::new().with_name_prefixes(none).validate().is_err());
        assert!(SessionConfig::new().with_name_prefixes(["  "]).validate().is_err());
    }
}
