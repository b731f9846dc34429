// src/config.rs

//! Manages client configuration: loading, defaults, and validation.

use crate::core::protocol::Credentials;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Connection settings for a single CitrineDB endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    /// Host of the CitrineDB server.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port of the CitrineDB server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a single TCP connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How many reconnect attempts are made after a session is lost.
    /// `0` means a lost session is immediately fatal.
    #[serde(default = "default_max_reconnections")]
    pub max_reconnections: u32,
    /// Delay before the first reconnect attempt.
    #[serde(default = "default_reconnection_delay_min_ms")]
    pub reconnection_delay_min_ms: u64,
    /// Ceiling for the exponential reconnect backoff.
    #[serde(default = "default_reconnection_delay_max_ms")]
    pub reconnection_delay_max_ms: u64,
    /// Silence on the wire after which a heartbeat probe is sent.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Additional silence after a probe before the session is declared dead.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// How many connection losses a single pending operation survives
    /// before its client is failed with `ConnectionLost`.
    #[serde(default = "default_operation_retries")]
    pub operation_retries: u32,
    /// Capacity of the outbound pipeline buffer.
    #[serde(default = "default_pipeline_buffer")]
    pub pipeline_buffer: usize,
    /// Credentials attached to packages that do not carry explicit ones.
    #[serde(default)]
    pub default_credentials: Option<Credentials>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    2113
}
fn default_connect_timeout_ms() -> u64 {
    1_000
}
fn default_max_reconnections() -> u32 {
    10
}
fn default_reconnection_delay_min_ms() -> u64 {
    250
}
fn default_reconnection_delay_max_ms() -> u64 {
    10_000
}
fn default_heartbeat_interval_ms() -> u64 {
    750
}
fn default_heartbeat_timeout_ms() -> u64 {
    2_000
}
fn default_operation_retries() -> u32 {
    3
}
fn default_pipeline_buffer() -> usize {
    512
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_reconnections: default_max_reconnections(),
            reconnection_delay_min_ms: default_reconnection_delay_min_ms(),
            reconnection_delay_max_ms: default_reconnection_delay_max_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            operation_retries: default_operation_retries(),
            pipeline_buffer: default_pipeline_buffer(),
            default_credentials: None,
        }
    }
}

impl ClientConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the connection manager cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(anyhow!("connect_timeout_ms must be greater than zero"));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms == 0 {
            return Err(anyhow!(
                "heartbeat_interval_ms and heartbeat_timeout_ms must be greater than zero"
            ));
        }
        if self.reconnection_delay_min_ms == 0 {
            return Err(anyhow!("reconnection_delay_min_ms must be greater than zero"));
        }
        if self.reconnection_delay_min_ms > self.reconnection_delay_max_ms {
            return Err(anyhow!(
                "reconnection_delay_min_ms ({}) exceeds reconnection_delay_max_ms ({})",
                self.reconnection_delay_min_ms,
                self.reconnection_delay_max_ms
            ));
        }
        if self.pipeline_buffer == 0 {
            return Err(anyhow!("pipeline_buffer must be greater than zero"));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnection_delay_min(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_min_ms)
    }

    pub fn reconnection_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_max_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}
