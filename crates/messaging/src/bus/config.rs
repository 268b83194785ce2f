//! Transport settings.

use std::str::FromStr;
use std::time::Duration;

use crate::error::BusError;

/// How many broker acknowledgements a publish waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequiredAcks {
    /// Fire and forget.
    None,
    /// The stream leader stored the message.
    Leader,
    /// Every replica stored the message.
    #[default]
    All,
}

impl FromStr for RequiredAcks {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(RequiredAcks::None),
            "leader" | "one" | "1" => Ok(RequiredAcks::Leader),
            "all" | "-1" => Ok(RequiredAcks::All),
            _ => Err(BusError::InvalidSetting {
                setting: "required_acks",
                value: s.to_string(),
            }),
        }
    }
}

/// Payload compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn is_enabled(&self) -> bool {
        *self != Compression::None
    }
}

impl FromStr for Compression {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(BusError::InvalidSetting {
                setting: "compression",
                value: s.to_string(),
            }),
        }
    }
}

/// Bus connection, writer and reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub brokers: Vec<String>,

    /// JetStream stream holding every topic.
    pub stream: String,

    /// Messages per consumer fetch.
    pub batch_size: usize,

    /// Bytes per consumer fetch.
    pub batch_bytes: usize,

    /// How long a fetch waits to fill a batch.
    pub batch_timeout: Duration,
    pub required_acks: RequiredAcks,

    /// Transport-level attempts per publish.
    pub max_attempts: u32,
    pub compression: Compression,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["nats://localhost:4222".to_string()],
            stream: "DOMAIN_EVENTS".to_string(),
            batch_size: 100,
            batch_bytes: 1_048_576,
            batch_timeout: Duration::from_millis(10),
            required_acks: RequiredAcks::All,
            max_attempts: 3,
            compression: Compression::None,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_acks() {
        assert_eq!("none".parse::<RequiredAcks>().unwrap(), RequiredAcks::None);
        assert_eq!("Leader".parse::<RequiredAcks>().unwrap(), RequiredAcks::Leader);
        assert_eq!("-1".parse::<RequiredAcks>().unwrap(), RequiredAcks::All);
        assert!("most".parse::<RequiredAcks>().is_err());
    }

    #[test]
    fn parses_compression() {
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!(!"none".parse::<Compression>().unwrap().is_enabled());
        assert!("brotli".parse::<Compression>().is_err());
    }

    #[test]
    fn defaults() {
        let config = BusConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.required_acks, RequiredAcks::All);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }
}
