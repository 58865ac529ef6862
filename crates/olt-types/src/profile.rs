//! Firmware-specific OID constants.
//!
//! A profile holds everything the OID formulas need: the two enterprise base
//! OIDs, the per-field table prefixes, the per-board numeric bases and the
//! per-PON increments. Profiles are immutable statics selected once at startup.

use crate::OidError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OLT firmware release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FirmwareVersion {
    #[serde(rename = "v2.1")]
    V21,
    #[default]
    #[serde(rename = "v2.2")]
    V22,
}

impl FirmwareVersion {
    /// Returns the OID profile for this firmware.
    pub fn profile(self) -> &'static OidProfile {
        match self {
            FirmwareVersion::V21 => &V2_1,
            FirmwareVersion::V22 => &V2_2,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareVersion::V21 => write!(f, "v2.1"),
            FirmwareVersion::V22 => write!(f, "v2.2"),
        }
    }
}

impl FromStr for FirmwareVersion {
    type Err = OidError;

    /// Accepts "v2.1", "V2.1", "2.1" and "v2.1.0" style strings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let version = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        match version {
            "2.1" | "2.1.0" => Ok(FirmwareVersion::V21),
            "2.2" | "2.2.0" => Ok(FirmwareVersion::V22),
            _ => Err(OidError::UnknownFirmware(s.to_string())),
        }
    }
}

/// Which enterprise base OID a field lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseOid {
    First,
    Second,
}

/// Numeric bases for one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardBase {
    pub onu_id_base: u32,
    pub onu_type_base: u32,
}

/// Table prefixes for the twelve per-ONU fields, relative to a base OID.
/// `None` marks a table the firmware does not expose over SNMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPrefixes {
    pub onu_id_name: Option<&'static str>,
    pub onu_type: Option<&'static str>,
    pub serial_number: Option<&'static str>,
    pub rx_power: Option<&'static str>,
    pub tx_power: Option<&'static str>,
    pub status: Option<&'static str>,
    pub ip_address: Option<&'static str>,
    pub description: Option<&'static str>,
    pub last_online: Option<&'static str>,
    pub last_offline: Option<&'static str>,
    pub offline_reason: Option<&'static str>,
    pub optical_distance: Option<&'static str>,
}

/// Firmware-specific OID formula constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OidProfile {
    pub version: FirmwareVersion,
    pub base_oid_1: &'static str,
    pub base_oid_2: &'static str,
    pub prefixes: FieldPrefixes,
    /// Indexed by board ID minus one.
    pub boards: [BoardBase; 2],
    pub onu_id_increment: u32,
    pub onu_type_increment: u32,
}

impl OidProfile {
    /// Returns the enterprise base OID string.
    pub fn base(&self, base: BaseOid) -> &'static str {
        match base {
            BaseOid::First => self.base_oid_1,
            BaseOid::Second => self.base_oid_2,
        }
    }

    /// Returns the numeric bases for a board, if the board exists.
    pub fn board(&self, board: u8) -> Option<&BoardBase> {
        usize::from(board)
            .checked_sub(1)
            .and_then(|idx| self.boards.get(idx))
    }
}

/// Profile for V2.2 firmware. Identity fields and type fields are numbered
/// from separate bases and live under different enterprise subtrees.
pub static V2_2: OidProfile = OidProfile {
    version: FirmwareVersion::V22,
    base_oid_1: ".1.3.6.1.4.1.3902.1082",
    base_oid_2: ".1.3.6.1.4.1.3902.1012",
    prefixes: FieldPrefixes {
        onu_id_name: Some(".500.10.2.3.3.1.2"),
        onu_type: Some(".3.50.11.2.1.17"),
        serial_number: Some(".500.10.2.3.3.1.18"),
        rx_power: Some(".500.20.2.2.2.1.10"),
        tx_power: Some(".3.50.12.1.1.14"),
        status: Some(".500.10.2.3.8.1.4"),
        ip_address: Some(".3.50.16.1.1.10"),
        description: Some(".500.10.2.3.3.1.3"),
        last_online: Some(".500.10.2.3.8.1.5"),
        last_offline: Some(".500.10.2.3.8.1.6"),
        offline_reason: Some(".500.10.2.3.8.1.7"),
        optical_distance: Some(".500.10.2.3.10.1.2"),
    },
    boards: [
        BoardBase {
            onu_id_base: 285_278_464,
            onu_type_base: 268_500_992,
        },
        BoardBase {
            onu_id_base: 285_278_720,
            onu_type_base: 268_566_528,
        },
    ],
    onu_id_increment: 1,
    onu_type_increment: 256,
};

/// Profile for V2.1 firmware. Every field is indexed by the PON index
/// `268500992 + board * 8192 + pon * 256` under a single enterprise subtree.
///
/// V2.1 has no name, optical, IP, description or online-history tables.
/// ONUs are enumerated from the serial number table, the type is the
/// ONU model column and the status is the online state column.
pub static V2_1: OidProfile = OidProfile {
    version: FirmwareVersion::V21,
    base_oid_1: ".1.3.6.1.4.1.3902.1012",
    base_oid_2: ".1.3.6.1.4.1.3902.1012",
    prefixes: FieldPrefixes {
        onu_id_name: None,
        onu_type: Some(".3.13.3.1.10"),
        serial_number: Some(".3.13.3.1.5"),
        rx_power: None,
        tx_power: None,
        status: Some(".3.31.4.1.100"),
        ip_address: None,
        description: None,
        last_online: None,
        last_offline: None,
        offline_reason: None,
        optical_distance: None,
    },
    boards: [
        BoardBase {
            onu_id_base: 268_509_184,
            onu_type_base: 268_509_184,
        },
        BoardBase {
            onu_id_base: 268_517_376,
            onu_type_base: 268_517_376,
        },
    ],
    onu_id_increment: 256,
    onu_type_increment: 256,
};
