//! Runtime configuration for the remote-control server
//!
//! The tick period and keep-alive timeout were tuned empirically against a
//! very limited socket stack, so both stay configurable. The liveness
//! ceiling is derived from them rather than configured directly.

use crate::error::RemoteError;
use remote_protocol::{DEFAULT_BUFFER_SIZE, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Address the listening socket binds to
    pub bind_addr: String,
    /// Sleep between two network-thread iterations
    pub tick_period_ms: u64,
    /// Connection is dropped after this long without a valid packet
    pub keep_alive_timeout_ms: u64,
    /// Upper bound for a follow-up read once a frame has started
    pub frame_read_timeout_ms: u64,
    /// Pause before retrying a failed bind
    pub bind_retry_backoff_ms: u64,
    /// Largest accepted payload; longer frames are reported as malformed
    pub max_payload_len: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            tick_period_ms: 2,
            keep_alive_timeout_ms: 10_000,
            frame_read_timeout_ms: 20,
            bind_retry_backoff_ms: 1_000,
            max_payload_len: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RemoteConfig {
    /// Loads a JSON configuration file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let raw = std::fs::read_to_string(path)?;
        let config: RemoteConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.tick_period_ms == 0 {
            return Err(RemoteError::Config("tick_period_ms must be positive".into()));
        }
        if self.frame_read_timeout_ms == 0 {
            return Err(RemoteError::Config(
                "frame_read_timeout_ms must be positive".into(),
            ));
        }
        if self.max_payload_len == 0 || self.max_payload_len as u64 > u32::MAX as u64 {
            return Err(RemoteError::Config(format!(
                "max_payload_len must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.bind_addr.is_empty() {
            return Err(RemoteError::Config("bind_addr must not be empty".into()));
        }
        Ok(())
    }

    /// Replaces the host and/or port of `bind_addr`. A part left as `None`
    /// keeps its current value.
    pub fn override_bind(&mut self, host: Option<&str>, port: Option<u16>) {
        if host.is_none() && port.is_none() {
            return;
        }

        let (current_host, current_port) = match self.bind_addr.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.to_string()),
            None => (self.bind_addr.clone(), DEFAULT_PORT.to_string()),
        };

        let host = match host {
            // Bare IPv6 literals need brackets in a socket address
            Some(host) if host.contains(':') && !host.starts_with('[') => format!("[{}]", host),
            Some(host) => host.to_string(),
            None => current_host,
        };
        let port = port.map(|port| port.to_string()).unwrap_or(current_port);

        self.bind_addr = format!("{}:{}", host, port);
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn frame_read_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_read_timeout_ms)
    }

    pub fn bind_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.bind_retry_backoff_ms)
    }

    /// Number of ticks without traffic before the connection is torn down
    pub fn liveness_ceiling(&self) -> u32 {
        let ticks = self.keep_alive_timeout_ms / self.tick_period_ms.max(1);
        ticks.clamp(1, u32::MAX as u64) as u32
    }
}
