//! Controller configuration.
//!
//! Timings and channel sizes for a connection. Every field has a default, so
//! a JSON document only needs to name what it changes:
//!
//! ```
//! use std::time::Duration;
//! use zwave_controller::ControllerConfig;
//!
//! let config = ControllerConfig::from_json_str(r#"{ "request_timeout_ms": 5000 }"#).unwrap();
//! assert_eq!(config.request_timeout(), Duration::from_secs(5));
//! assert_eq!(config.retry_count, 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Retransmissions of an unanswered request before the hard timeout is armed
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Interval between retransmissions in milliseconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Hard timeout after the last retransmission, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How long `fetch_node_info` waits for the node's information frame
    #[serde(default = "default_node_info_timeout")]
    pub node_info_timeout_ms: u64,

    /// Frames queued for the writer task before senders wait
    #[serde(default = "default_writer_channel_capacity")]
    pub writer_channel_capacity: usize,

    /// Unsolicited frames buffered per subscriber before it lags
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Size of the transport read buffer
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_interval() -> u64 {
    1100
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_node_info_timeout() -> u64 {
    10_000
}

fn default_writer_channel_capacity() -> usize {
    64
}

fn default_notification_capacity() -> usize {
    64
}

fn default_read_buffer_size() -> usize {
    256
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_interval_ms: default_retry_interval(),
            request_timeout_ms: default_request_timeout(),
            node_info_timeout_ms: default_node_info_timeout(),
            writer_channel_capacity: default_writer_channel_capacity(),
            notification_capacity: default_notification_capacity(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ControllerConfig {
    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Retransmission interval.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Hard timeout after retries are exhausted.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Bound on the wait for a node information frame.
    pub fn node_info_timeout(&self) -> Duration {
        Duration::from_millis(self.node_info_timeout_ms)
    }
}
