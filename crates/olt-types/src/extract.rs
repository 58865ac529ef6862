//! Conversions from raw SNMP values to the display strings reported for an ONU.
//!
//! Extractors that only label a value (`extract_status`, `extract_name`, ...)
//! never fail and fall back to `"Unknown"`. Converters that parse structured
//! data return an [`OidError`].

use crate::{OidError, SnmpValue};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Write;

/// Format used for device timestamps.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const UNKNOWN: &str = "Unknown";

/// ONU ID from the last arc of a row OID.
pub fn extract_onu_id(oid: &str) -> Option<u32> {
    oid.rsplit('.').next().and_then(|arc| arc.parse().ok())
}

/// Name-like text fields (name, type, description, IP).
pub fn extract_name(value: &SnmpValue) -> String {
    value.as_text().unwrap_or_else(|| UNKNOWN.to_string())
}

fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (32..=126).contains(b))
}

fn upper_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

/// GPON serial number: 4 ASCII vendor bytes followed by 4 bytes rendered as
/// uppercase hex, e.g. `5A 54 45 47 D8 24 CD F3` becomes `ZTEGD824CDF3`.
///
/// Values the device already renders as readable text are returned as-is.
pub fn extract_serial_number(value: &SnmpValue) -> String {
    let Some(raw) = value.as_bytes() else {
        return String::new();
    };
    let data = raw.strip_prefix(b"1,").unwrap_or(raw);

    if data.len() >= 8 && is_printable(data) {
        return String::from_utf8_lossy(data).into_owned();
    }

    if data.len() < 8 {
        if is_printable(data) {
            return String::from_utf8_lossy(data).into_owned();
        }
        return upper_hex(data).to_lowercase();
    }

    let vendor = String::from_utf8_lossy(&data[..4]);
    format!("{}{}", vendor, upper_hex(&data[4..8]))
}

/// Optical power in dBm: `raw * 0.002 - 30`, two decimals.
pub fn convert_power(value: &SnmpValue) -> Result<String, OidError> {
    let raw = value.as_integer().ok_or(OidError::InvalidValue {
        expected: "integer",
        found: value.type_name(),
    })?;
    let dbm = raw as f64 * 0.002 - 30.0;
    Ok(format!("{dbm:.2}"))
}

/// ONU operational state.
pub fn extract_status(value: &SnmpValue) -> &'static str {
    match value.as_integer() {
        Some(1) => "Logging",
        Some(2) => "LOS",
        Some(3) => "Synchronization",
        Some(4) => "Online",
        Some(5) => "Dying Gasp",
        Some(6) => "Auth Failed",
        Some(7) => "Offline",
        _ => UNKNOWN,
    }
}

/// Cause of the ONU's last transition to offline.
pub fn extract_offline_reason(value: &SnmpValue) -> &'static str {
    match value.as_integer() {
        Some(1) => "Unknown",
        Some(2) => "LOS",
        Some(3) => "LOSi",
        Some(4) => "LOFi",
        Some(5) => "sfi",
        Some(6) => "loai",
        Some(7) => "loami",
        Some(8) => "AuthFail",
        Some(9) => "PowerOff",
        Some(10) => "deactiveSucc",
        Some(11) => "deactiveFail",
        Some(12) => "Reboot",
        Some(13) => "Shutdown",
        _ => UNKNOWN,
    }
}

/// Optical distance in meters.
pub fn extract_optical_distance(value: &SnmpValue) -> String {
    match value.as_integer() {
        Some(meters) => meters.to_string(),
        None => UNKNOWN.to_string(),
    }
}

/// Decodes the 8-byte device timestamp
/// (year u16 BE, month, day, hour, minute, second, reserved).
pub fn convert_date_time(bytes: &[u8]) -> Result<String, OidError> {
    if bytes.len() != 8 {
        return Err(OidError::InvalidDateTime(format!(
            "invalid byte array length: expected 8 bytes, got {}",
            bytes.len()
        )));
    }

    let year = i32::from(u16::from_be_bytes([bytes[0], bytes[1]]));
    let (month, day, hour, minute, second) = (bytes[2], bytes[3], bytes[4], bytes[5], bytes[6]);

    if !(1..=12).contains(&month) {
        return Err(OidError::InvalidDateTime(format!("invalid month: {month}")));
    }
    if !(1..=31).contains(&day) {
        return Err(OidError::InvalidDateTime(format!("invalid day: {day}")));
    }
    if hour > 23 {
        return Err(OidError::InvalidDateTime(format!("invalid hour: {hour}")));
    }
    if minute > 59 {
        return Err(OidError::InvalidDateTime(format!("invalid minute: {minute}")));
    }
    if second > 59 {
        return Err(OidError::InvalidDateTime(format!("invalid second: {second}")));
    }

    let datetime = NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
        .ok_or_else(|| {
            OidError::InvalidDateTime(format!("invalid date: {year}-{month:02}-{day:02}"))
        })?;

    Ok(datetime.format(DATE_TIME_FORMAT).to_string())
}

/// Parses a timestamp previously produced by [`convert_date_time`].
pub fn parse_date_time(s: &str) -> Result<NaiveDateTime, OidError> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .map_err(|e| OidError::InvalidDateTime(format!("{s}: {e}")))
}

/// Renders a duration as `"D days H hours M minutes S seconds"`.
pub fn format_duration(total_seconds: i64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{days} days {hours} hours {minutes} minutes {seconds} seconds")
}

/// Elapsed time between two device timestamps, formatted with [`format_duration`].
pub fn duration_between(from: &str, to: &str) -> Result<String, OidError> {
    let from = parse_date_time(from)?;
    let to = parse_date_time(to)?;
    Ok(format_duration((to - from).num_seconds()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn octets(b: &[u8]) -> SnmpValue {
        SnmpValue::OctetString(b.to_vec())
    }

    #[test]
    fn test_extract_onu_id() {
        assert_eq!(extract_onu_id(".1.3.6.1.4.1.3902.1082.500.10.2.3.3.1.2.285278465.12"), Some(12));
        assert_eq!(extract_onu_id("1.3.6.7"), Some(7));
        assert_eq!(extract_onu_id("1.3.6.x"), None);
        assert_eq!(extract_onu_id(""), None);
    }

    #[test]
    fn test_extract_name() {
        assert_eq!(extract_name(&octets(b"customer-a")), "customer-a");
        assert_eq!(extract_name(&SnmpValue::Integer(3)), "Unknown");
    }

    #[test]
    fn test_serial_number_binary() {
        let v = octets(&[0x5A, 0x54, 0x45, 0x47, 0xD8, 0x24, 0xCD, 0xF3]);
        assert_eq!(extract_serial_number(&v), "ZTEGD824CDF3");
    }

    #[test]
    fn test_serial_number_readable() {
        assert_eq!(extract_serial_number(&octets(b"1,ZTEGC1234567")), "ZTEGC1234567");
        assert_eq!(extract_serial_number(&octets(b"HWTC12345678")), "HWTC12345678");
    }

    #[test]
    fn test_serial_number_short() {
        assert_eq!(extract_serial_number(&octets(b"ABC")), "ABC");
        assert_eq!(extract_serial_number(&octets(&[0x01, 0xFF])), "01ff");
        assert_eq!(extract_serial_number(&SnmpValue::Integer(1)), "");
    }

    #[test]
    fn test_convert_power() {
        assert_eq!(convert_power(&SnmpValue::Integer(6000)).unwrap(), "-18.00");
        assert_eq!(convert_power(&SnmpValue::Integer(15000)).unwrap(), "0.00");
        assert_eq!(convert_power(&SnmpValue::Integer(4321)).unwrap(), "-21.36");
        assert!(convert_power(&octets(b"x")).is_err());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(extract_status(&SnmpValue::Integer(4)), "Online");
        assert_eq!(extract_status(&SnmpValue::Integer(2)), "LOS");
        assert_eq!(extract_status(&SnmpValue::Integer(5)), "Dying Gasp");
        assert_eq!(extract_status(&SnmpValue::Integer(99)), "Unknown");
        assert_eq!(extract_status(&octets(b"4")), "Unknown");
    }

    #[test]
    fn test_offline_reason_labels() {
        assert_eq!(extract_offline_reason(&SnmpValue::Integer(9)), "PowerOff");
        assert_eq!(extract_offline_reason(&SnmpValue::Integer(13)), "Shutdown");
        assert_eq!(extract_offline_reason(&SnmpValue::Integer(0)), "Unknown");
    }

    #[test]
    fn test_optical_distance() {
        assert_eq!(extract_optical_distance(&SnmpValue::Integer(1532)), "1532");
        assert_eq!(extract_optical_distance(&SnmpValue::Null), "Unknown");
    }

    #[test]
    fn test_convert_date_time() {
        let bytes = [0x07, 0xE8, 3, 15, 8, 30, 45, 0];
        assert_eq!(convert_date_time(&bytes).unwrap(), "2024-03-15 08:30:45");
    }

    #[test]
    fn test_convert_date_time_rejects_bad_input() {
        assert!(convert_date_time(&[0x07, 0xE8, 3]).is_err());
        assert!(convert_date_time(&[0x07, 0xE8, 13, 1, 0, 0, 0, 0]).is_err());
        assert!(convert_date_time(&[0x07, 0xE8, 1, 0, 0, 0, 0, 0]).is_err());
        assert!(convert_date_time(&[0x07, 0xE8, 1, 1, 24, 0, 0, 0]).is_err());
        assert!(convert_date_time(&[0x07, 0xE8, 2, 31, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 days 0 hours 0 minutes 0 seconds");
        assert_eq!(
            format_duration(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5),
            "2 days 3 hours 4 minutes 5 seconds"
        );
    }

    #[test]
    fn test_duration_between() {
        let d = duration_between("2024-03-15 08:00:00", "2024-03-16 09:01:02").unwrap();
        assert_eq!(d, "1 days 1 hours 1 minutes 2 seconds");
        assert!(duration_between("garbage", "2024-03-16 09:01:02").is_err());
    }
}
