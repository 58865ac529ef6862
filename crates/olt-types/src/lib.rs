//! Common GPON OLT types shared by the device-communication daemons.
//!
//! This crate is free of I/O and provides:
//!
//! - [`FirmwareVersion`] / [`OidProfile`]: firmware-specific SNMP OID constants
//! - [`generate_board_pon_oid`] / [`BoardPonMap`]: formula-based OID addressing
//!   for every board/PON combination
//! - [`SnmpValue`] / [`SnmpPdu`]: typed SNMP variable bindings
//! - [`extract`]: conversions from raw SNMP values into display strings

pub mod extract;
mod oid;
mod profile;
mod value;

pub use oid::{
    generate_board_pon_oid, initialize_board_pon_map, BoardPonConfig, BoardPonKey, BoardPonMap,
    OidField, SuffixKind, MAX_BOARD, MAX_PON, MIN_BOARD, MIN_PON,
};
pub use profile::{BaseOid, BoardBase, FieldPrefixes, FirmwareVersion, OidProfile, V2_1, V2_2};
pub use value::{SnmpPdu, SnmpValue};

/// Errors raised while computing OIDs or decoding device values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OidError {
    #[error("invalid board ID: {0} (must be 1-2)")]
    InvalidBoard(u8),

    #[error("invalid PON ID: {0} (must be 1-16)")]
    InvalidPon(u8),

    #[error("unknown firmware version: {0}")]
    UnknownFirmware(String),

    #[error("config not found for board {board} and pon {pon}")]
    ConfigNotFound { board: u8, pon: u8 },

    #[error("{field:?} is not available over SNMP on firmware {firmware}")]
    UnsupportedField {
        field: OidField,
        firmware: FirmwareVersion,
    },

    #[error("board/PON map has {found} entries, expected {expected}")]
    IncompleteMap { found: usize, expected: usize },

    #[error("invalid date time value: {0}")]
    InvalidDateTime(String),

    #[error("unexpected SNMP value: expected {expected}, got {found}")]
    InvalidValue {
        expected: &'static str,
        found: &'static str,
    },
}
