//! Configuration — environment-driven knobs for the host binary.
//!
//! DESIGN
//! ======
//! Numeric settings fall back to their defaults when unset or unparsable,
//! so a typo never stops a casual session from starting. The trust mode is
//! the exception: it decides whether holder identity is checked at all, so an
//! unrecognized value is an error instead of a silent default.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::ErrorCode;
use crate::services::hold::DEFAULT_HOLD_TIMEOUT;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TICK_MS: u64 = 33;
const DEFAULT_PUZZLE_COLS: usize = 8;
const DEFAULT_PUZZLE_ROWS: usize = 6;
const DEFAULT_PIECE_SIZE: f64 = 60.0;
const DEFAULT_PUZZLE_SEED: u64 = 0x5EED;
const DEFAULT_FACT_CHANNEL_CAPACITY: usize = 1024;

/// Longest accepted hold timeout: one day.
const MAX_HOLD_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown trust mode: {0} (expected `verified` or `trusted`)")]
    UnknownTrustMode(String),
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
    #[error("{key} must be at most {max}")]
    OutOfRange { key: &'static str, max: u64 },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTrustMode(_) => "E_CONFIG_TRUST_MODE",
            Self::Zero { .. } => "E_CONFIG_ZERO",
            Self::OutOfRange { .. } => "E_CONFIG_RANGE",
        }
    }
}

/// Whether holder identity is checked on pick-up and put-down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// Every intent is checked against the session registry and the holder.
    #[default]
    Verified,
    /// Single-player deployments: the only client is not adversarial.
    Trusted,
}

impl FromStr for TrustMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => Ok(Self::Verified),
            "trusted" => Ok(Self::Trusted),
            _ => Err(ConfigError::UnknownTrustMode(s.to_owned())),
        }
    }
}

/// Settings the authority itself depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub hold_timeout: Duration,
    pub trust: TrustMode,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self { hold_timeout: DEFAULT_HOLD_TIMEOUT, trust: TrustMode::Verified }
    }
}

/// Everything the host binary reads at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub tick: Duration,
    pub authority: AuthorityConfig,
    pub cols: usize,
    pub rows: usize,
    pub piece_width: f64,
    pub piece_height: f64,
    pub seed: u64,
    pub fact_channel_capacity: usize,
}

impl ServerConfig {
    /// # Errors
    ///
    /// Returns `UnknownTrustMode` for an unrecognized `TRUST_MODE` and `Zero`
    /// for a tick or channel capacity of zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let trust = match std::env::var("TRUST_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => TrustMode::default(),
        };

        let tick_ms = env_parse("TICK_MS", DEFAULT_TICK_MS);
        if tick_ms == 0 {
            return Err(ConfigError::Zero { key: "TICK_MS" });
        }
        let hold_timeout_secs = env_parse("HOLD_TIMEOUT_SECS", DEFAULT_HOLD_TIMEOUT.as_secs());
        if hold_timeout_secs > MAX_HOLD_TIMEOUT_SECS {
            return Err(ConfigError::OutOfRange { key: "HOLD_TIMEOUT_SECS", max: MAX_HOLD_TIMEOUT_SECS });
        }
        let fact_channel_capacity = env_parse("FACT_CHANNEL_CAPACITY", DEFAULT_FACT_CHANNEL_CAPACITY);
        if fact_channel_capacity == 0 {
            return Err(ConfigError::Zero { key: "FACT_CHANNEL_CAPACITY" });
        }

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            tick: Duration::from_millis(tick_ms),
            authority: AuthorityConfig {
                hold_timeout: Duration::from_secs(hold_timeout_secs),
                trust,
            },
            cols: env_parse("PUZZLE_COLS", DEFAULT_PUZZLE_COLS),
            rows: env_parse("PUZZLE_ROWS", DEFAULT_PUZZLE_ROWS),
            piece_width: env_parse("PIECE_WIDTH", DEFAULT_PIECE_SIZE),
            piece_height: env_parse("PIECE_HEIGHT", DEFAULT_PIECE_SIZE),
            seed: env_parse("PUZZLE_SEED", DEFAULT_PUZZLE_SEED),
            fact_channel_capacity,
        })
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
