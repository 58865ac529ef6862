//! Formula-based OID generation for board/PON combinations.
//!
//! Every per-ONU table on the OLT is indexed by one of two numeric suffixes
//! derived from the board and PON:
//!
//! ```text
//! onu_id_suffix   = board.onu_id_base   + pon * onu_id_increment
//! onu_type_suffix = board.onu_type_base + pon * onu_type_increment
//! ```
//!
//! The type, Tx power and IP tables use the type suffix, all other tables use
//! the ID suffix. This follows the device MIB layout and must not be
//! "normalized".

use crate::profile::{BaseOid, OidProfile};
use crate::OidError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lowest valid board ID.
pub const MIN_BOARD: u8 = 1;
/// Highest valid board ID.
pub const MAX_BOARD: u8 = 2;
/// Lowest valid PON ID.
pub const MIN_PON: u8 = 1;
/// Highest valid PON ID.
pub const MAX_PON: u8 = 16;

/// Key identifying one PON port on one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardPonKey {
    pub board: u8,
    pub pon: u8,
}

impl BoardPonKey {
    pub const fn new(board: u8, pon: u8) -> Self {
        Self { board, pon }
    }

    /// Checks the key against the supported board and PON ranges.
    pub fn validate(&self) -> Result<(), OidError> {
        if !(MIN_BOARD..=MAX_BOARD).contains(&self.board) {
            return Err(OidError::InvalidBoard(self.board));
        }
        if !(MIN_PON..=MAX_PON).contains(&self.pon) {
            return Err(OidError::InvalidPon(self.pon));
        }
        Ok(())
    }

    /// Iterates every valid key, board-major.
    pub fn all() -> impl Iterator<Item = BoardPonKey> {
        (MIN_BOARD..=MAX_BOARD)
            .flat_map(|board| (MIN_PON..=MAX_PON).map(move |pon| BoardPonKey::new(board, pon)))
    }
}

impl fmt::Display for BoardPonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "board {} pon {}", self.board, self.pon)
    }
}

/// Which numeric suffix a table is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixKind {
    OnuId,
    OnuType,
}

/// The twelve per-ONU SNMP fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OidField {
    OnuIdName,
    OnuType,
    SerialNumber,
    RxPower,
    TxPower,
    Status,
    IpAddress,
    Description,
    LastOnline,
    LastOffline,
    OfflineReason,
    OpticalDistance,
}

impl OidField {
    pub const ALL: [OidField; 12] = [
        OidField::OnuIdName,
        OidField::OnuType,
        OidField::SerialNumber,
        OidField::RxPower,
        OidField::TxPower,
        OidField::Status,
        OidField::IpAddress,
        OidField::Description,
        OidField::LastOnline,
        OidField::LastOffline,
        OidField::OfflineReason,
        OidField::OpticalDistance,
    ];

    pub fn suffix_kind(self) -> SuffixKind {
        match self {
            OidField::OnuType | OidField::TxPower | OidField::IpAddress => SuffixKind::OnuType,
            _ => SuffixKind::OnuId,
        }
    }

    /// Enterprise subtree the field is polled under.
    pub fn base(self) -> BaseOid {
        match self {
            OidField::OnuType | OidField::TxPower | OidField::IpAddress => BaseOid::Second,
            _ => BaseOid::First,
        }
    }

    /// Optical power and IP rows carry an extra `.1` instance arc after the ONU ID.
    pub fn has_instance_arc(self) -> bool {
        matches!(
            self,
            OidField::RxPower | OidField::TxPower | OidField::IpAddress
        )
    }

    fn prefix(self, profile: &OidProfile) -> Option<&'static str> {
        let p = &profile.prefixes;
        match self {
            OidField::OnuIdName => p.onu_id_name,
            OidField::OnuType => p.onu_type,
            OidField::SerialNumber => p.serial_number,
            OidField::RxPower => p.rx_power,
            OidField::TxPower => p.tx_power,
            OidField::Status => p.status,
            OidField::IpAddress => p.ip_address,
            OidField::Description => p.description,
            OidField::LastOnline => p.last_online,
            OidField::LastOffline => p.last_offline,
            OidField::OfflineReason => p.offline_reason,
            OidField::OpticalDistance => p.optical_distance,
        }
    }
}

/// Per board/PON table OIDs, relative to the profile's base OIDs.
/// Tables the firmware does not expose are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPonConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_id_name_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_type_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_serial_number_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_rx_power_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_tx_power_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_status_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_ip_address_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_description_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_last_online_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_last_offline_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_last_offline_reason_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_gpon_optical_distance_oid: Option<String>,
}

impl BoardPonConfig {
    pub fn field(&self, field: OidField) -> Option<&str> {
        let oid = match field {
            OidField::OnuIdName => &self.onu_id_name_oid,
            OidField::OnuType => &self.onu_type_oid,
            OidField::SerialNumber => &self.onu_serial_number_oid,
            OidField::RxPower => &self.onu_rx_power_oid,
            OidField::TxPower => &self.onu_tx_power_oid,
            OidField::Status => &self.onu_status_oid,
            OidField::IpAddress => &self.onu_ip_address_oid,
            OidField::Description => &self.onu_description_oid,
            OidField::LastOnline => &self.onu_last_online_oid,
            OidField::LastOffline => &self.onu_last_offline_oid,
            OidField::OfflineReason => &self.onu_last_offline_reason_oid,
            OidField::OpticalDistance => &self.onu_gpon_optical_distance_oid,
        };
        oid.as_deref()
    }
}

/// Computes the table OIDs for one board/PON under the given profile.
///
/// # Errors
///
/// Returns [`OidError::InvalidBoard`] or [`OidError::InvalidPon`] when the
/// IDs fall outside the supported ranges.
///
/// # Examples
///
/// ```
/// use olt_types::{generate_board_pon_oid, V2_2};
///
/// let cfg = generate_board_pon_oid(&V2_2, 1, 1).unwrap();
/// assert_eq!(cfg.onu_id_name_oid.as_deref(), Some(".500.10.2.3.3.1.2.285278465"));
/// ```
pub fn generate_board_pon_oid(
    profile: &OidProfile,
    board: u8,
    pon: u8,
) -> Result<BoardPonConfig, OidError> {
    let key = BoardPonKey::new(board, pon);
    key.validate()?;

    let base = profile.board(board).ok_or(OidError::InvalidBoard(board))?;
    let pon = u32::from(pon);
    let onu_id_suffix = base.onu_id_base + pon * profile.onu_id_increment;
    let onu_type_suffix = base.onu_type_base + pon * profile.onu_type_increment;

    let oid = |field: OidField| {
        let suffix = match field.suffix_kind() {
            SuffixKind::OnuId => onu_id_suffix,
            SuffixKind::OnuType => onu_type_suffix,
        };
        field
            .prefix(profile)
            .map(|prefix| format!("{prefix}.{suffix}"))
    };

    Ok(BoardPonConfig {
        onu_id_name_oid: oid(OidField::OnuIdName),
        onu_type_oid: oid(OidField::OnuType),
        onu_serial_number_oid: oid(OidField::SerialNumber),
        onu_rx_power_oid: oid(OidField::RxPower),
        onu_tx_power_oid: oid(OidField::TxPower),
        onu_status_oid: oid(OidField::Status),
        onu_ip_address_oid: oid(OidField::IpAddress),
        onu_description_oid: oid(OidField::Description),
        onu_last_online_oid: oid(OidField::LastOnline),
        onu_last_offline_oid: oid(OidField::LastOffline),
        onu_last_offline_reason_oid: oid(OidField::OfflineReason),
        onu_gpon_optical_distance_oid: oid(OidField::OpticalDistance),
    })
}

/// Immutable table of [`BoardPonConfig`] for every valid board/PON.
#[derive(Debug, Clone)]
pub struct BoardPonMap {
    profile: &'static OidProfile,
    entries: BTreeMap<BoardPonKey, BoardPonConfig>,
}

/// Builds the full board/PON map, failing on the first bad entry.
pub fn initialize_board_pon_map(profile: &'static OidProfile) -> Result<BoardPonMap, OidError> {
    let entries = BoardPonKey::all()
        .map(|key| generate_board_pon_oid(profile, key.board, key.pon).map(|cfg| (key, cfg)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(BoardPonMap { profile, entries })
}

impl BoardPonMap {
    /// Number of entries a complete map holds.
    pub const EXPECTED_ENTRIES: usize =
        (MAX_BOARD - MIN_BOARD + 1) as usize * (MAX_PON - MIN_PON + 1) as usize;

    pub fn profile(&self) -> &'static OidProfile {
        self.profile
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, board: u8, pon: u8) -> Result<&BoardPonConfig, OidError> {
        self.entries
            .get(&BoardPonKey::new(board, pon))
            .ok_or(OidError::ConfigNotFound { board, pon })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BoardPonKey, &BoardPonConfig)> {
        self.entries.iter()
    }

    /// Confirms every valid board/PON has an entry.
    pub fn validate(&self) -> Result<(), OidError> {
        for key in BoardPonKey::all() {
            self.get(key.board, key.pon)?;
        }
        if self.entries.len() != Self::EXPECTED_ENTRIES {
            return Err(OidError::IncompleteMap {
                found: self.entries.len(),
                expected: Self::EXPECTED_ENTRIES,
            });
        }
        Ok(())
    }

    pub fn supports(&self, field: OidField) -> bool {
        field.prefix(self.profile).is_some()
    }

    /// Table whose rows enumerate the ONUs of a PON: the name table where
    /// the firmware has one, otherwise the serial number table.
    pub fn inventory_field(&self) -> OidField {
        if self.supports(OidField::OnuIdName) {
            OidField::OnuIdName
        } else {
            OidField::SerialNumber
        }
    }

    /// Full OID of the table a walk over `field` should start from.
    ///
    /// # Errors
    ///
    /// [`OidError::UnsupportedField`] when the firmware has no such table.
    pub fn table_oid(&self, board: u8, pon: u8, field: OidField) -> Result<String, OidError> {
        let cfg = self.get(board, pon)?;
        let table = cfg.field(field).ok_or(OidError::UnsupportedField {
            field,
            firmware: self.profile.version,
        })?;
        Ok(format!("{}{}", self.profile.base(field.base()), table))
    }

    /// Full OID of one ONU's row in the `field` table.
    pub fn onu_oid(
        &self,
        board: u8,
        pon: u8,
        onu: u32,
        field: OidField,
    ) -> Result<String, OidError> {
        let mut oid = self.table_oid(board, pon, field)?;
        oid.push('.');
        oid.push_str(&onu.to_string());
        if field.has_instance_arc() {
            oid.push_str(".1");
        }
        Ok(oid)
    }
}
