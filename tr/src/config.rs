//! TaskRelay configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{Catalog, TaskKindConfig, default_task_kinds};

/// Main TaskRelay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport settings
    pub server: ServerConfig,

    /// Rules of a session
    pub game: GameConfig,

    /// Task kinds and the control tokens that resolve them
    pub catalog: Vec<TaskKindConfig>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            game: GameConfig::default(),
            catalog: default_task_kinds(),
            log_level: None,
        }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.game.validate()?;
        Catalog::new(&self.catalog).context("Invalid task catalog")?;
        Ok(())
    }

    /// Build the read-only task catalog shared by every session
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::new(&self.catalog)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskrelay.yml
        let local_config = PathBuf::from(".taskrelay.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskrelay/taskrelay.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".taskrelay.yml")];
                paths.extend(user_config_path());
                paths
            }
        };

        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskrelay").join("taskrelay.yml"))
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub bind: String,

    /// Queue depth of each session's request channel
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// Queue depth of each connection's outbound channel
    #[serde(rename = "client-buffer")]
    pub client_buffer: usize,

    /// Longest accepted line from a client
    #[serde(rename = "max-line-bytes")]
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7420".to_string(),
            channel_buffer: 256,
            client_buffer: 256,
            max_line_bytes: 4096,
        }
    }
}

/// Rules of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Players required before the host may start
    #[serde(rename = "min-players")]
    pub min_players: usize,

    /// Room capacity
    #[serde(rename = "max-players")]
    pub max_players: usize,

    /// Rounds played before the session ends on its own
    #[serde(rename = "max-rounds")]
    pub max_rounds: u32,

    /// Round time limit in seconds
    #[serde(rename = "round-time-secs")]
    pub round_time_secs: u32,

    /// Completed tasks needed to clear round one
    #[serde(rename = "tasks-per-round")]
    pub tasks_per_round: u32,

    /// Extra tasks added to the quota for every round after the first
    #[serde(rename = "quota-growth-per-round")]
    pub quota_growth_per_round: u32,

    /// Health at session start
    #[serde(rename = "starting-health")]
    pub starting_health: u32,

    /// Health lost per failed task when the client does not name a penalty
    #[serde(rename = "failure-penalty")]
    pub failure_penalty: u32,

    /// Most control tokens one player may hold in a round
    #[serde(rename = "controls-per-player-cap")]
    pub controls_per_player_cap: usize,

    /// Pause between the end of one round and the start of the next
    #[serde(rename = "round-break-secs")]
    pub round_break_secs: u64,

    /// Push the next queued task to a player as soon as they resolve one
    #[serde(rename = "auto-refill")]
    pub auto_refill: bool,

    /// Fixed RNG seed for reproducible sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 6,
            max_rounds: 5,
            round_time_secs: 30,
            tasks_per_round: 15,
            quota_growth_per_round: 0,
            starting_health: 100,
            failure_penalty: 21,
            controls_per_player_cap: 4,
            round_break_secs: 0,
            auto_refill: true,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Check the rules are internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_players == 0 {
            return Err(eyre::eyre!("min-players must be at least 1"));
        }
        if self.min_players > self.max_players {
            return Err(eyre::eyre!(
                "min-players ({}) exceeds max-players ({})",
                self.min_players,
                self.max_players
            ));
        }
        if self.max_rounds == 0 {
            return Err(eyre::eyre!("max-rounds must be at least 1"));
        }
        if self.round_time_secs == 0 {
            return Err(eyre::eyre!("round-time-secs must be at least 1"));
        }
        if self.tasks_per_round == 0 {
            return Err(eyre::eyre!("tasks-per-round must be at least 1"));
        }
        Ok(())
    }

    /// Completed tasks required to clear the given round
    pub fn quota_for_round(&self, round: u32) -> u32 {
        self.tasks_per_round + round.saturating_sub(1) * self.quota_growth_per_round
    }

    /// Pause before the next round starts, if any
    pub fn round_break(&self) -> Option<Duration> {
        (self.round_break_secs > 0).then(|| Duration::from_secs(self.round_break_secs))
    }
}
