//! Server configuration
//!
//! Layered with figment, lowest priority first: compiled defaults,
//! `$HOME/.chat-server/config.yaml`, `./config/config.yaml`, `./config.yaml`,
//! an explicit file, then `CHAT_SERVER_*` environment variables. Search-path
//! files are optional; an explicit file must exist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handler::ConnectionSettings;

/// Environment variable prefix, e.g. `CHAT_SERVER_LISTEN_ADDRESS`
pub const ENV_PREFIX: &str = "CHAT_SERVER_";

/// File name looked up in each search directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Supported transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
}

/// Every server-tunable parameter
///
/// Unknown keys are rejected so a misspelt setting fails loudly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket address to listen on; `:9000` means every interface
    pub listen_address: String,
    pub transport: Transport,
    /// Longest accepted inbound line in bytes
    pub max_message_bytes: usize,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Upper bound on writing one outbound message, e.g. `5s`
    #[serde(with = "duration_format")]
    pub write_timeout: Duration,
    /// Idle limit between inbound messages; `0s` disables it
    #[serde(with = "duration_format")]
    pub read_timeout: Duration,
    /// Per-client outbound queue capacity
    pub outbound_queue_capacity: usize,
    /// Capacity of the shared event channel into the hub
    pub event_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9000".to_string(),
            transport: Transport::Tcp,
            max_message_bytes: 4096,
            log_level: "info".to_string(),
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::ZERO,
            outbound_queue_capacity: 256,
            event_queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from the default locations, an optional explicit file and the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(AppError::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let config: Config = Self::figment(explicit).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider stack without extracting
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        for path in search_paths() {
            if path.is_file() {
                figment = figment.merge(Yaml::file_exact(path));
            }
        }
        if let Some(path) = explicit {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.listen_address.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "listen_address cannot be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("max_message_bytes", self.max_message_bytes),
            ("outbound_queue_capacity", self.outbound_queue_capacity),
            ("event_queue_capacity", self.event_queue_capacity),
        ] {
            if value == 0 {
                return Err(AppError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.write_timeout.is_zero() {
            return Err(AppError::InvalidConfig(
                "write_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Address to bind; a bare `:port` listens on every interface
    pub fn bind_address(&self) -> String {
        let address = self.listen_address.trim();
        if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_string()
        }
    }

    /// Limits handed to every accepted connection
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            outbound_capacity: self.outbound_queue_capacity,
            max_message_bytes: self.max_message_bytes,
            write_timeout: self.write_timeout,
            read_timeout: (!self.read_timeout.is_zero()).then_some(self.read_timeout),
        }
    }
}

/// Default config file locations, lowest priority first
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".chat-server").join(CONFIG_FILE));
    }
    paths.push(PathBuf::from("config").join(CONFIG_FILE));
    paths.push(PathBuf::from(CONFIG_FILE));
    paths
}

/// Durations written as `250ms`, `5s`, `1m30s` or `1.5h`
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is zero.
pub mod duration_format {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    const NANOS_PER_SEC: u128 = 1_000_000_000;

    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        if text == "0" {
            return Ok(Duration::ZERO);
        }
        if text.is_empty() {
            return Err("empty duration".to_string());
        }

        let mut total: u128 = 0;
        let mut rest = text;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let (number, tail) = rest.split_at(number_len);
            let unit_len = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);

            let scale: u128 = match unit {
                "ns" => 1,
                "us" | "µs" => 1_000,
                "ms" => 1_000_000,
                "s" => NANOS_PER_SEC,
                "m" => 60 * NANOS_PER_SEC,
                "h" => 3600 * NANOS_PER_SEC,
                "" => return Err(format!("missing unit in duration {:?}", text)),
                other => return Err(format!("unknown unit {:?} in duration {:?}", other, text)),
            };
            total += scaled(number, scale).ok_or_else(|| format!("invalid duration {:?}", text))?;
            rest = tail;
        }

        u64::try_from(total)
            .map(Duration::from_nanos)
            .map_err(|_| format!("duration {:?} is too large", text))
    }

    // `number` in units of `scale` nanoseconds; fractions past 18 digits are ignored
    fn scaled(number: &str, scale: u128) -> Option<u128> {
        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let fraction = &fraction[..fraction.len().min(18)];
        let fraction_nanos = if fraction.is_empty() {
            0
        } else {
            let digits: u128 = fraction.parse().ok()?;
            digits * scale / 10u128.pow(fraction.len() as u32)
        };
        whole.checked_mul(scale)?.checked_add(fraction_nanos)
    }

    pub fn format(value: Duration) -> String {
        let nanos = value.as_nanos();
        if nanos % NANOS_PER_SEC == 0 {
            format!("{}s", nanos / NANOS_PER_SEC)
        } else if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}us", nanos / 1_000)
        } else {
            format!("{}ns", nanos)
        }
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as \"5s\" or \"250ms\"")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            if v == 0 {
                Ok(Duration::ZERO)
            } else {
                Err(E::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            if v == 0 {
                Ok(Duration::ZERO)
            } else {
                Err(E::invalid_value(Unexpected::Signed(v), &self))
            }
        }
    }
}
