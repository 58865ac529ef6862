//! Configuration for oltmgrd.
//!
//! Loaded from a TOML file (every field has a default), then overridden from
//! environment variables, then validated. Default location:
//! /etc/oltmgrd/oltmgrd.toml

use crate::error::{OltError, Result};
use olt_types::FirmwareVersion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/oltmgrd/oltmgrd.toml";

/// SNMP agent on the OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpConfig {
    #[serde(default = "default_snmp_host")]
    pub host: String,

    #[serde(default = "default_snmp_port")]
    pub port: u16,

    #[serde(default = "default_snmp_community")]
    pub community: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,

    /// Resends after a timeout
    #[serde(default = "default_snmp_retries")]
    pub retries: u32,
}

/// Redis cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use the in-process cache instead of Redis when false
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub db: u32,
}

/// OLT addressing and polling behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OltConfig {
    /// Selects the OID profile
    #[serde(default)]
    pub firmware: FirmwareVersion,

    /// TTL of cached per-PON ONU lists
    #[serde(default = "default_onu_list_ttl")]
    pub onu_list_ttl_secs: u64,

    /// TTL of cached free ONU ID lists
    #[serde(default = "default_empty_onu_id_ttl")]
    pub empty_onu_id_ttl_secs: u64,

    /// Highest ONU ID a PON can hold
    #[serde(default = "default_max_onu_id")]
    pub max_onu_id: u32,
}

/// Telnet CLI session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelnetConfig {
    #[serde(default = "default_telnet_host")]
    pub host: String,

    #[serde(default = "default_telnet_port")]
    pub port: u16,

    #[serde(default = "default_telnet_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub enable_password: String,

    /// Overall operation timeout in seconds
    #[serde(default = "default_telnet_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Idle time after which the session is reconnected or closed
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,

    /// Longest a caller waits for the session to be released
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_login_prompt")]
    pub login_prompt: String,

    #[serde(default = "default_password_prompt")]
    pub password_prompt: String,

    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,

    #[serde(default = "default_enable_prompt")]
    pub enable_prompt: String,

    #[serde(default = "default_config_prompt")]
    pub config_prompt: String,
}

/// Complete oltmgrd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OltmgrConfig {
    #[serde(default)]
    pub snmp: SnmpConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub olt: OltConfig,

    #[serde(default)]
    pub telnet: TelnetConfig,
}

// Default functions
fn default_true() -> bool {
    true
}

fn default_snmp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_community() -> String {
    "public".to_string()
}

fn default_snmp_timeout() -> u64 {
    3
}

fn default_snmp_retries() -> u32 {
    1
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_onu_list_ttl() -> u64 {
    600
}

fn default_empty_onu_id_ttl() -> u64 {
    300
}

fn default_max_onu_id() -> u32 {
    128
}

fn default_telnet_host() -> String {
    "136.1.1.100".to_string()
}

fn default_telnet_port() -> u16 {
    23
}

fn default_telnet_username() -> String {
    "admin".to_string()
}

fn default_telnet_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

fn default_pool_size() -> usize {
    1
}

fn default_max_idle() -> u64 {
    300
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_login_prompt() -> String {
    "Username:".to_string()
}

fn default_password_prompt() -> String {
    "Password:".to_string()
}

fn default_user_prompt() -> String {
    "ZXAN>".to_string()
}

fn default_enable_prompt() -> String {
    "ZXAN#".to_string()
}

fn default_config_prompt() -> String {
    "ZXAN(config)#".to_string()
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            host: default_snmp_host(),
            port: default_snmp_port(),
            community: default_snmp_community(),
            timeout_secs: default_snmp_timeout(),
            retries: default_snmp_retries(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
        }
    }
}

impl Default for OltConfig {
    fn default() -> Self {
        Self {
            firmware: FirmwareVersion::default(),
            onu_list_ttl_secs: default_onu_list_ttl(),
            empty_onu_id_ttl_secs: default_empty_onu_id_ttl(),
            max_onu_id: default_max_onu_id(),
        }
    }
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            host: default_telnet_host(),
            port: default_telnet_port(),
            username: default_telnet_username(),
            password: String::new(),
            enable_password: String::new(),
            timeout_secs: default_telnet_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay(),
            pool_size: default_pool_size(),
            max_idle_secs: default_max_idle(),
            acquire_timeout_secs: default_acquire_timeout(),
            login_prompt: default_login_prompt(),
            password_prompt: default_password_prompt(),
            user_prompt: default_user_prompt(),
            enable_prompt: default_enable_prompt(),
            config_prompt: default_config_prompt(),
        }
    }
}

impl SnmpConfig {
    /// `host:port` target string
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn url(&self) -> String {
        match self.password.as_deref() {
            Some(pw) if !pw.is_empty() => {
                format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl OltConfig {
    pub fn onu_list_ttl(&self) -> Duration {
        Duration::from_secs(self.onu_list_ttl_secs)
    }

    pub fn empty_onu_id_ttl(&self) -> Duration {
        Duration::from_secs(self.empty_onu_id_ttl_secs)
    }
}

impl TelnetConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// The three CLI prompts, most privileged first.
    pub fn prompts(&self) -> [&str; 3] {
        [
            self.config_prompt.as_str(),
            self.enable_prompt.as_str(),
            self.user_prompt.as_str(),
        ]
    }

    /// Validate Telnet settings
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(OltError::config("telnet host is required"));
        }
        if self.port == 0 {
            return Err(OltError::config("telnet port must be between 1 and 65535"));
        }
        if self.username.is_empty() {
            return Err(OltError::config("telnet username is required"));
        }
        if self.password.is_empty() {
            return Err(OltError::config("telnet password is required"));
        }
        if self.timeout_secs == 0 {
            return Err(OltError::config("telnet timeout must be greater than 0"));
        }
        if self.pool_size < 1 {
            return Err(OltError::config("telnet pool size must be at least 1"));
        }
        Ok(())
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| OltError::config(format!("invalid value for {}: {}", key, e)))
}

impl OltmgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                OltError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(OltError::Io(e)),
        }
    }

    /// Load from file, apply process environment overrides, then validate SNMP/OLT settings
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OltError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SNMP_HOST") {
            self.snmp.host = v;
        }
        if let Some(v) = lookup("SNMP_PORT") {
            self.snmp.port = parse_override("SNMP_PORT", &v)?;
        }
        if let Some(v) = lookup("SNMP_COMMUNITY") {
            self.snmp.community = v;
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.redis.host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.redis.port = parse_override("REDIS_PORT", &v)?;
        }
        if let Some(v) = lookup("REDIS_PASSWORD") {
            self.redis.password = Some(v);
        }
        if let Some(v) = lookup("REDIS_DB") {
            self.redis.db = parse_override("REDIS_DB", &v)?;
        }
        if let Some(v) = lookup("OLT_FIRMWARE_VERSION") {
            self.olt.firmware = parse_override("OLT_FIRMWARE_VERSION", &v)?;
        }
        if let Some(v) = lookup("TELNET_HOST") {
            self.telnet.host = v;
        }
        if let Some(v) = lookup("TELNET_PORT") {
            self.telnet.port = parse_override("TELNET_PORT", &v)?;
        }
        if let Some(v) = lookup("TELNET_USERNAME") {
            self.telnet.username = v;
        }
        if let Some(v) = lookup("TELNET_PASSWORD") {
            self.telnet.password = v;
        }
        if let Some(v) = lookup("TELNET_ENABLE_PASSWORD") {
            self.telnet.enable_password = v;
        }
        if let Some(v) = lookup("TELNET_TIMEOUT") {
            self.telnet.timeout_secs = parse_override("TELNET_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("TELNET_RETRY_COUNT") {
            self.telnet.retry_count = parse_override("TELNET_RETRY_COUNT", &v)?;
        }
        if let Some(v) = lookup("TELNET_RETRY_DELAY") {
            self.telnet.retry_delay_secs = parse_override("TELNET_RETRY_DELAY", &v)?;
        }
        Ok(())
    }

    /// Validate the settings every subcommand needs. Telnet settings are
    /// validated separately when a session manager is built.
    pub fn validate(&self) -> Result<()> {
        if self.snmp.host.is_empty() {
            return Err(OltError::config("snmp host is required"));
        }
        if self.snmp.port == 0 {
            return Err(OltError::config("snmp port must be > 0"));
        }
        if self.snmp.timeout_secs == 0 {
            return Err(OltError::config("snmp timeout must be > 0"));
        }
        if self.redis.enabled && self.redis.port == 0 {
            return Err(OltError::config("redis port must be > 0"));
        }
        if self.olt.max_onu_id == 0 {
            return Err(OltError::config("max_onu_id must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OltmgrConfig::default();
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.snmp.timeout_secs, 3);
        assert_eq!(config.redis.url(), "redis://localhost:6379/0");
        assert_eq!(config.olt.firmware, FirmwareVersion::V22);
        assert_eq!(config.olt.onu_list_ttl(), Duration::from_secs(600));
        assert_eq!(config.olt.empty_onu_id_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_telnet_defaults() {
        let t = TelnetConfig::default();
        assert_eq!(t.address(), "136.1.1.100:23");
        assert_eq!(t.username, "admin");
        assert_eq!(t.timeout(), Duration::from_secs(30));
        assert_eq!(t.connect_timeout(), Duration::from_secs(10));
        assert_eq!(t.retry_count, 3);
        assert_eq!(t.retry_delay(), Duration::from_secs(2));
        assert_eq!(t.pool_size, 1);
        assert_eq!(t.max_idle_time(), Duration::from_secs(300));
        assert_eq!(t.prompts(), ["ZXAN(config)#", "ZXAN#", "ZXAN>"]);
    }

    #[test]
    fn test_telnet_validation() {
        let mut t = TelnetConfig {
            password: "secret".to_string(),
            ..TelnetConfig::default()
        };
        assert!(t.validate().is_ok());

        t.password.clear();
        assert!(t.validate().is_err());

        t.password = "secret".to_string();
        t.port = 0;
        assert!(t.validate().is_err());

        t.port = 23;
        t.pool_size = 0;
        assert!(t.validate().is_err());

        t.pool_size = 1;
        t.timeout_secs = 0;
        assert!(t.validate().is_err());

        t.timeout_secs = 30;
        t.host.clear();
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_redis_url_with_password() {
        let r = RedisConfig {
            password: Some("pw".to_string()),
            db: 2,
            ..RedisConfig::default()
        };
        assert_eq!(r.url(), "redis://:pw@localhost:6379/2");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OltmgrConfig::default();
        config
            .apply_overrides(lookup(&[
                ("SNMP_HOST", "10.0.0.5"),
                ("SNMP_COMMUNITY", "private"),
                ("REDIS_PORT", "6380"),
                ("OLT_FIRMWARE_VERSION", "v2.1"),
                ("TELNET_PASSWORD", "pw"),
                ("TELNET_RETRY_COUNT", "5"),
            ]))
            .unwrap();

        assert_eq!(config.snmp.target(), "10.0.0.5:161");
        assert_eq!(config.snmp.community, "private");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.olt.firmware, FirmwareVersion::V21);
        assert_eq!(config.telnet.password, "pw");
        assert_eq!(config.telnet.retry_count, 5);
    }

    #[test]
    fn test_bad_env_override() {
        let mut config = OltmgrConfig::default();
        let err = config
            .apply_overrides(lookup(&[("SNMP_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("SNMP_PORT"));

        let err = config
            .apply_overrides(lookup(&[("OLT_FIRMWARE_VERSION", "v9")]))
            .unwrap_err();
        assert!(err.to_string().contains("OLT_FIRMWARE_VERSION"));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[snmp]
host = "192.168.10.2"
community = "olt"

[olt]
firmware = "v2.1"

[telnet]
password = "zte"
"#
        )
        .unwrap();

        let config = OltmgrConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.snmp.host, "192.168.10.2");
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.olt.firmware, FirmwareVersion::V21);
        assert_eq!(config.telnet.password, "zte");
        assert_eq!(config.telnet.user_prompt, "ZXAN>");
        assert_eq!(config.redis, RedisConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OltmgrConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, OltmgrConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[snmp\nport = ").unwrap();
        assert!(OltmgrConfig::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oltmgrd.toml");
        let mut config = OltmgrConfig::default();
        config.telnet.host = "10.1.1.1".to_string();
        config.save(&path).unwrap();

        let reloaded = OltmgrConfig::load_or_default(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
