//! Bridge configuration.
//!
//! Loaded once at startup from a TOML, JSON or YAML file (chosen by
//! extension). Every key is optional; missing keys fall back to the defaults
//! below, field by field inside the `udmx` and `artnet` groups.
//!
//! ```toml
//! timeout = 1000          # reconnect backoff (ms)
//! writeTimeout = 1000     # per device call (ms)
//! health = 8080           # or false
//!
//! [udmx]
//! vendorId = 0x16c0
//! deviceId = 0x05dc
//!
//! [artnet]
//! port = 6454
//! universe = 0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use dmx_protocol::health::{ArtnetEcho, ConfigEcho};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config extension {0:?} (expected .toml, .json, .yml or .yaml)")]
    UnsupportedExtension(String),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Reconnect backoff in milliseconds
    #[serde(default = "default_timeout", deserialize_with = "timeout_or_default")]
    pub timeout: u64,
    /// Upper bound for one device connect/write call, in milliseconds
    #[serde(default = "default_write_timeout", deserialize_with = "write_timeout_or_default")]
    pub write_timeout: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub udmx: UdmxSection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artnet: ArtnetSection,
    /// Health API port (`None` = disabled). Accepts `false` or a port number.
    #[serde(default, deserialize_with = "deserialize_health")]
    pub health: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdmxSection {
    #[serde(default = "default_vendor_id", deserialize_with = "vendor_id_or_default")]
    pub vendor_id: u16,
    #[serde(default = "default_device_id", deserialize_with = "device_id_or_default")]
    pub device_id: u16,
}

impl Default for UdmxSection {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            device_id: default_device_id(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ArtnetSection {
    #[serde(default = "default_artnet_port", deserialize_with = "artnet_port_or_default")]
    pub port: u16,
    #[serde(default = "default_universe", deserialize_with = "universe_or_default")]
    pub universe: u16,
}

impl Default for ArtnetSection {
    fn default() -> Self {
        Self {
            port: default_artnet_port(),
            universe: default_universe(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            write_timeout: default_write_timeout(),
            udmx: UdmxSection::default(),
            artnet: ArtnetSection::default(),
            health: None,
        }
    }
}

fn default_timeout() -> u64 { dmx_protocol::DEFAULT_RECONNECT_MS }
fn default_write_timeout() -> u64 { dmx_protocol::DEFAULT_WRITE_TIMEOUT_MS }
fn default_vendor_id() -> u16 { dmx_protocol::UDMX_VENDOR_ID }
fn default_device_id() -> u16 { dmx_protocol::UDMX_PRODUCT_ID }
fn default_artnet_port() -> u16 { dmx_protocol::DEFAULT_ARTNET_PORT }
fn default_universe() -> u16 { dmx_protocol::DEFAULT_UNIVERSE }

// An explicit `null` falls back to the default, same as a missing key.

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

macro_rules! or_default {
    ($name:ident, $ty:ty, $default:ident) => {
        fn $name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<$ty, D::Error> {
            Ok(Option::<$ty>::deserialize(deserializer)?.unwrap_or_else($default))
        }
    };
}

or_default!(timeout_or_default, u64, default_timeout);
or_default!(write_timeout_or_default, u64, default_write_timeout);
or_default!(vendor_id_or_default, u16, default_vendor_id);
or_default!(device_id_or_default, u16, default_device_id);
or_default!(artnet_port_or_default, u16, default_artnet_port);
or_default!(universe_or_default, u16, default_universe);

/// `health` is either `false` or a port number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHealth {
    Enabled(bool),
    Port(u64),
}

fn deserialize_health<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<RawHealth>::deserialize(deserializer)? {
        None | Some(RawHealth::Enabled(false)) => Ok(None),
        Some(RawHealth::Enabled(true)) => Err(D::Error::custom(
            "`health` must be false or a port number, not true",
        )),
        Some(RawHealth::Port(port)) => match u16::try_from(port) {
            Ok(port) if port > 0 => Ok(Some(port)),
            _ => Err(D::Error::custom(format!("`health` port {port} is out of range"))),
        },
    }
}

impl BridgeConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout)
    }

    /// Static subset shown by `GET /health/config`.
    pub fn config_echo(&self) -> ConfigEcho {
        ConfigEcho {
            artnet: ArtnetEcho {
                port: self.artnet.port,
                universe: self.artnet.universe,
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("`timeout` must be greater than 0".into()));
        }
        if self.write_timeout == 0 {
            return Err(ConfigError::Invalid("`writeTimeout` must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "yml" | "yaml" => Ok(Self::Yaml),
            other => Err(ConfigError::UnsupportedExtension(other.to_string())),
        }
    }
}

/// Parse a configuration document and validate it.
pub fn parse_config(contents: &str, format: Format, path: &Path) -> Result<BridgeConfig, ConfigError> {
    let parsed: Result<BridgeConfig, String> = match format {
        Format::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
    };
    let config = parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file. Relative paths are resolved against the
/// current working directory.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let path = match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    };
    let format = Format::from_path(&path)?;

    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    parse_config(&contents, format, &path)
}
