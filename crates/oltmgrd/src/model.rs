//! Result types returned by the poller and the Telnet session manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One ONU in a per-PON listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuInfo {
    pub board: u8,
    pub pon: u8,
    #[serde(rename = "onu_id")]
    pub id: u32,
    pub name: String,
    pub onu_type: String,
    pub serial_number: String,
    pub rx_power: String,
    pub status: String,
}

/// Full detail for a single ONU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuDetail {
    pub board: u8,
    pub pon: u8,
    #[serde(rename = "onu_id")]
    pub id: u32,
    pub name: String,
    pub description: String,
    pub onu_type: String,
    pub serial_number: String,
    pub rx_power: String,
    pub tx_power: String,
    pub status: String,
    pub ip_address: String,
    pub last_online: String,
    pub last_offline: String,
    pub uptime: String,
    pub last_down_time_duration: String,
    #[serde(rename = "offline_reason")]
    pub last_offline_reason: String,
    pub gpon_optical_distance: String,
}

/// Board/PON/ONU address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OnuId {
    pub board: u8,
    pub pon: u8,
    #[serde(rename = "onu_id")]
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuSerialNumber {
    pub board: u8,
    pub pon: u8,
    #[serde(rename = "onu_id")]
    pub id: u32,
    pub serial_number: String,
}

/// One page of a per-PON listing plus the total ONU count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuPage {
    pub onus: Vec<OnuInfo>,
    pub total: usize,
}

/// Outcome of one CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelnetResponse {
    pub command: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl TelnetResponse {
    pub fn ok(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            error: None,
            success: true,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(command: impl Into<String>, error: impl ToString) -> Self {
        Self {
            command: command.into(),
            output: String::new(),
            error: Some(error.to_string()),
            success: false,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of a command sequence. `success` is true only if every command succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelnetBatchResponse {
    pub responses: Vec<TelnetResponse>,
    pub success: bool,
    #[serde(with = "duration_millis")]
    pub total_time: Duration,
}

impl TelnetBatchResponse {
    pub fn new(responses: Vec<TelnetResponse>, total_time: Duration) -> Self {
        let success = responses.iter().all(|r| r.success);
        Self {
            responses,
            success,
            total_time,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.responses.iter().filter(|r| !r.success).count()
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
