//! Typed SNMP variable bindings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value half of an SNMP variable binding.
///
/// Which variant a device returns depends on the table being read; callers
/// use the `as_*` helpers for the type they expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectId(String),
    IpAddress([u8; 4]),
    Counter(u64),
    TimeTicks(u32),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Integer view of numeric values.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            SnmpValue::Counter(v) => i64::try_from(*v).ok(),
            SnmpValue::TimeTicks(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SnmpValue::OctetString(b) => Some(b),
            _ => None,
        }
    }

    /// Text view of string-like values. Octet strings are decoded lossily.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SnmpValue::OctetString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            SnmpValue::ObjectId(oid) => Some(oid.clone()),
            SnmpValue::IpAddress([a, b, c, d]) => Some(format!("{a}.{b}.{c}.{d}")),
            _ => None,
        }
    }

    /// True for the v2c exception values returned in place of data.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SnmpValue::Integer(_) => "integer",
            SnmpValue::OctetString(_) => "octet-string",
            SnmpValue::ObjectId(_) => "object-identifier",
            SnmpValue::IpAddress(_) => "ip-address",
            SnmpValue::Counter(_) => "counter",
            SnmpValue::TimeTicks(_) => "timeticks",
            SnmpValue::Null => "null",
            SnmpValue::NoSuchObject => "no-such-object",
            SnmpValue::NoSuchInstance => "no-such-instance",
            SnmpValue::EndOfMibView => "end-of-mib-view",
        }
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Integer(v) => write!(f, "{v}"),
            SnmpValue::Counter(v) => write!(f, "{v}"),
            SnmpValue::TimeTicks(v) => write!(f, "{v}"),
            SnmpValue::Null => write!(f, "null"),
            other => match other.as_text() {
                Some(text) => write!(f, "{text}"),
                None => write!(f, "{}", other.type_name()),
            },
        }
    }
}

/// One (OID, value) pair returned by a GET or WALK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpPdu {
    pub oid: String,
    pub value: SnmpValue,
}

impl SnmpPdu {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_views() {
        assert_eq!(SnmpValue::Integer(-5).as_integer(), Some(-5));
        assert_eq!(SnmpValue::Counter(42).as_integer(), Some(42));
        assert_eq!(SnmpValue::Counter(u64::MAX).as_integer(), None);
        assert_eq!(SnmpValue::TimeTicks(100).as_integer(), Some(100));
        assert_eq!(SnmpValue::OctetString(b"1".to_vec()).as_integer(), None);
    }

    #[test]
    fn test_text_views() {
        assert_eq!(
            SnmpValue::OctetString(b"onu-7".to_vec()).as_text().as_deref(),
            Some("onu-7")
        );
        assert_eq!(
            SnmpValue::IpAddress([10, 0, 0, 1]).as_text().as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(SnmpValue::Integer(1).as_text(), None);
    }

    #[test]
    fn test_exceptions() {
        assert!(SnmpValue::NoSuchInstance.is_exception());
        assert!(SnmpValue::EndOfMibView.is_exception());
        assert!(!SnmpValue::Null.is_exception());
    }

    #[test]
    fn test_display() {
        assert_eq!(SnmpValue::Integer(4).to_string(), "4");
        assert_eq!(SnmpValue::OctetString(b"abc".to_vec()).to_string(), "abc");
        assert_eq!(SnmpValue::NoSuchObject.to_string(), "no-such-object");
    }
}
