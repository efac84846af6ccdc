//! Configuration management with validation and defaults
//!
//! Every section has production defaults; a TOML file and `KENO_*`
//! environment variables may override them.

use crate::errors::{ConfigurationError, KenoResult};
use crate::game::Paytable;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KenoConfig {
    pub game: GameConfig,
    pub timing: TimingConfig,
    pub rtp: RtpConfig,
    pub jackpot: JackpotConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Game rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// N: numbers are drawn from 1..=pool_size
    pub pool_size: u8,
    /// K: winning numbers per round
    pub draw_size: u8,
    pub min_picks: u8,
    pub max_picks: u8,
    pub min_stake: u64,
    pub first_round_id: u64,
    /// Finished rounds kept for display
    pub history_len: usize,
    pub paytable: Paytable,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            pool_size: 80,
            draw_size: 20,
            min_picks: 1,
            max_picks: 10,
            min_stake: 1,
            first_round_id: 1,
            history_len: 20,
            paytable: Paytable::standard(),
        }
    }
}

/// Phase timing and retry pacing, all in milliseconds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Betting window of a new round
    pub wait_ms: u64,
    /// Delay between revealed balls
    pub reveal_interval_ms: u64,
    /// Pause between a finished round and the next one
    pub cooldown_ms: u64,
    /// Upper bound on an idle sleep of the round loop
    pub poll_ms: u64,
    /// First delay after a failed step
    pub retry_delay_ms: u64,
    /// Backoff ceiling for repeated storage failures
    pub max_backoff_ms: u64,
    /// Delay before re-writing a ball that failed to persist
    pub reveal_retry_ms: u64,
    pub reveal_retry_attempts: u32,
    /// A running round idle for this many reveal intervals is force-advanced
    pub stall_multiplier: u32,
    pub settlement_attempts: u32,
    pub heartbeat_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_ms: 90_000,
            reveal_interval_ms: 3_500,
            cooldown_ms: 15_000,
            poll_ms: 1_000,
            retry_delay_ms: 5_000,
            max_backoff_ms: 60_000,
            reveal_retry_ms: 2_000,
            reveal_retry_attempts: 5,
            stall_multiplier: 5,
            settlement_attempts: 3,
            heartbeat_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn stall_threshold_ms(&self) -> u64 {
        self.reveal_interval_ms
            .saturating_mul(self.stall_multiplier as u64)
    }
}

/// Winning-set selection strategy
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawStrategy {
    /// Closest-to-band search over random candidates
    RtpBand,
    /// RTP band search, preferring numbers adjacent to players' picks
    NearMiss,
}

/// What the payout ratio is measured against
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RtpScope {
    /// payout / this round's stake
    Round,
    /// (lifetime paid + payout) / (lifetime staked + this round's stake)
    Global,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    pub strategy: DrawStrategy,
    pub scope: RtpScope,
    pub floor: f64,
    pub ceiling: f64,
    /// Candidate sets tried per draw
    pub trials: u32,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            strategy: DrawStrategy::RtpBand,
            scope: RtpScope::Round,
            floor: 0.0,
            ceiling: 0.70,
            trials: 100,
        }
    }
}

/// Progressive jackpot funded from settled stakes
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JackpotConfig {
    /// Share of each round's settled stake added to the pool, in basis points
    pub contribution_bps: u32,
    /// Smallest pick count whose full hit wins the pool
    pub min_picks: u8,
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            contribution_bps: 0,
            min_picks: 8,
        }
    }
}

impl JackpotConfig {
    pub fn enabled(&self) -> bool {
        self.contribution_bps > 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Rocksdb,
            data_directory: "./DB/keno_data".to_string(),
            clear_on_start: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "keno=info,tower_http=info".to_string(),
        }
    }
}

impl KenoConfig {
    /// Persistent deployment
    pub fn production() -> Self {
        Self::default()
    }

    /// In-memory store and millisecond timing, for tests and local runs
    pub fn testing() -> Self {
        Self {
            timing: TimingConfig {
                wait_ms: 50,
                reveal_interval_ms: 5,
                cooldown_ms: 20,
                poll_ms: 5,
                retry_delay_ms: 5,
                max_backoff_ms: 40,
                reveal_retry_ms: 1,
                reveal_retry_attempts: 3,
                stall_multiplier: 5,
                settlement_attempts: 3,
                heartbeat_secs: 1,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> KenoResult<()> {
        let game = &self.game;
        if game.pool_size == 0 || game.draw_size == 0 || game.draw_size > game.pool_size {
            return Err(invalid(
                "game.draw_size",
                game.draw_size,
                "must be between 1 and pool_size",
            ));
        }
        if game.min_picks == 0 || game.min_picks > game.max_picks {
            return Err(invalid(
                "game.min_picks",
                game.min_picks,
                "must be between 1 and max_picks",
            ));
        }
        if game.max_picks > game.draw_size {
            return Err(invalid(
                "game.max_picks",
                game.max_picks,
                "cannot exceed draw_size",
            ));
        }
        if game.min_stake == 0 {
            return Err(invalid("game.min_stake", 0, "must be positive"));
        }
        if let Some(picks) = game
            .paytable
            .pick_counts()
            .find(|&p| p < game.min_picks || p > game.max_picks)
        {
            return Err(invalid(
                "game.paytable",
                picks,
                "row outside the allowed pick range",
            ));
        }
        if game.paytable.max_hits() > game.draw_size {
            return Err(invalid(
                "game.paytable",
                game.paytable.max_hits(),
                "more hits than numbers drawn",
            ));
        }

        let timing = &self.timing;
        for (field, value) in [
            ("timing.reveal_interval_ms", timing.reveal_interval_ms),
            ("timing.poll_ms", timing.poll_ms),
            ("timing.retry_delay_ms", timing.retry_delay_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, 0, "must be positive"));
            }
        }
        if timing.stall_multiplier < 2 {
            return Err(invalid(
                "timing.stall_multiplier",
                timing.stall_multiplier,
                "must be at least 2 reveal intervals",
            ));
        }
        if timing.settlement_attempts == 0 {
            return Err(invalid("timing.settlement_attempts", 0, "must be positive"));
        }

        let rtp = &self.rtp;
        if rtp.trials == 0 {
            return Err(invalid("rtp.trials", 0, "must be positive"));
        }
        if !(rtp.floor >= 0.0 && rtp.ceiling > 0.0 && rtp.floor <= rtp.ceiling) {
            return Err(ConfigurationError::ValidationFailed(format!(
                "rtp band [{}, {}] is not ordered",
                rtp.floor, rtp.ceiling
            ))
            .into());
        }

        if self.jackpot.contribution_bps > 10_000 {
            return Err(invalid(
                "jackpot.contribution_bps",
                self.jackpot.contribution_bps,
                "cannot exceed 10000",
            ));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "port cannot be zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::errors::KenoError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables, then validate
    pub fn load(&self) -> KenoResult<KenoConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => KenoConfig::production(),
        };

        Self::apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> KenoResult<KenoConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into()
        })
    }

    /// Apply `KENO_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(config: &mut KenoConfig, lookup: F) -> KenoResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KENO_API_HOST") {
            config.api.host = host;
        }
        if let Some(port) = lookup("KENO_API_PORT") {
            config.api.port = parse_env("KENO_API_PORT", port)?;
        }
        if let Some(dir) = lookup("KENO_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Some(secs) = lookup("KENO_WAIT_SECS") {
            let secs: u64 = parse_env("KENO_WAIT_SECS", secs)?;
            config.timing.wait_ms = secs.saturating_mul(1_000);
        }
        if let Some(ceiling) = lookup("KENO_RTP_CEILING") {
            config.rtp.ceiling = parse_env("KENO_RTP_CEILING", ceiling)?;
        }
        if let Some(level) = lookup("KENO_LOG_LEVEL") {
            config.monitoring.log_level = level;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> KenoResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "cannot be parsed".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = KenoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.game.pool_size, 80);
        assert_eq!(config.game.draw_size, 20);
        assert_eq!(config.timing.wait_ms, 90_000);
        assert_eq!(config.timing.stall_threshold_ms(), 17_500);
        assert!(KenoConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_rejects_draw_larger_than_pool() {
        let mut config = KenoConfig::default();
        config.game.draw_size = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unordered_band() {
        let mut config = KenoConfig::default();
        config.rtp.floor = 0.9;
        config.rtp.ceiling = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_paytable_outside_pick_range() {
        let mut config = KenoConfig::default();
        config.game.max_picks = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_override() {
        let toml = r#"
            [game]
            min_stake = 10

            [timing]
            wait_ms = 30000

            [rtp]
            strategy = "near_miss"
            scope = "global"
            floor = 0.70
            ceiling = 0.85
        "#;
        let config: KenoConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.game.min_stake, 10);
        assert_eq!(config.game.pool_size, 80);
        assert_eq!(config.timing.wait_ms, 30_000);
        assert_eq!(config.timing.cooldown_ms, 15_000);
        assert_eq!(config.rtp.strategy, DrawStrategy::NearMiss);
        assert_eq!(config.rtp.scope, RtpScope::Global);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_paytable() {
        let toml = r#"
            [game.paytable]
            "2" = { "1" = 1.0, "2" = 5.0 }
            "3" = { "2" = 2.0, "3" = 10.0 }
        "#;
        let config: KenoConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.game.paytable.payout(50, 2, 2), 250);
        assert_eq!(config.game.paytable.payout(100, 3, 3), 1000);
        assert_eq!(config.game.paytable.payout(100, 10, 10), 0);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KENO_API_PORT", "8088"),
            ("KENO_WAIT_SECS", "45"),
            ("KENO_RTP_CEILING", "0.8"),
        ]
        .into_iter()
        .collect();

        let mut config = KenoConfig::default();
        ConfigLoader::apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api.port, 8088);
        assert_eq!(config.timing.wait_ms, 45_000);
        assert!((config.rtp.ceiling - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = KenoConfig::default();
        let result = ConfigLoader::apply_env_overrides(&mut config, |k| {
            (k == "KENO_API_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }
}
