//! Application-level configuration loading, including the card decks per voting system.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::VotingSystem;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PLANNING_POKER_BACK_CONFIG_PATH";

const DEFAULT_REACTION_COOLDOWN_MS: u64 = 2_500;
const DEFAULT_PERSISTENCE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETENTION_WINDOW_SECS: u64 = 5 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// A single estimation card offered by a voting system deck.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Card {
    /// Label printed on the card (e.g. "5", "XL", "?").
    pub label: String,
    /// Numeric value used for averaging, when the card has one.
    #[serde(default)]
    pub value: Option<f64>,
    /// Optional icon shown instead of the label (e.g. a coffee cup).
    #[serde(default)]
    pub icon: Option<String>,
}

impl Card {
    fn new(label: &str, value: Option<f64>) -> Self {
        Self {
            label: label.to_owned(),
            value,
            icon: None,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    decks: IndexMap<VotingSystem, Vec<Card>>,
    reaction_cooldown: Duration,
    persistence_timeout: Duration,
    retention_window: Duration,
    sweep_interval: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        decks = app_config.decks.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Deck of cards offered for a given voting system.
    ///
    /// Falls back to the built-in deck when the configured file omits the system.
    pub fn deck(&self, system: VotingSystem) -> Vec<Card> {
        self.decks
            .get(&system)
            .cloned()
            .unwrap_or_else(|| default_deck(system))
    }

    /// Minimum delay enforced between two reactions from the same user.
    pub fn reaction_cooldown(&self) -> Duration {
        self.reaction_cooldown
    }

    /// Upper bound on a relay-side persistence call before it is abandoned.
    pub fn persistence_timeout(&self) -> Duration {
        self.persistence_timeout
    }

    /// Inactivity window after which a room becomes eligible for deletion.
    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }

    /// Interval between two retention sweep runs.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            decks: default_decks(),
            reaction_cooldown: Duration::from_millis(DEFAULT_REACTION_COOLDOWN_MS),
            persistence_timeout: Duration::from_millis(DEFAULT_PERSISTENCE_TIMEOUT_MS),
            retention_window: Duration::from_secs(DEFAULT_RETENTION_WINDOW_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    decks: IndexMap<VotingSystem, Vec<Card>>,
    #[serde(default)]
    reaction_cooldown_ms: Option<u64>,
    #[serde(default)]
    persistence_timeout_ms: Option<u64>,
    #[serde(default)]
    retention_window_secs: Option<u64>,
    #[serde(default)]
    sweep_interval_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let mut decks = default_decks();
        decks.extend(value.decks);
        Self {
            decks,
            reaction_cooldown: value
                .reaction_cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reaction_cooldown),
            persistence_timeout: value
                .persistence_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.persistence_timeout),
            retention_window: value
                .retention_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention_window),
            sweep_interval: value
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_decks() -> IndexMap<VotingSystem, Vec<Card>> {
    IndexMap::from([
        (VotingSystem::Fibonacci, default_deck(VotingSystem::Fibonacci)),
        (
            VotingSystem::ModifiedFibonacci,
            default_deck(VotingSystem::ModifiedFibonacci),
        ),
        (VotingSystem::Tshirt, default_deck(VotingSystem::Tshirt)),
        (VotingSystem::PowersOf2, default_deck(VotingSystem::PowersOf2)),
    ])
}

/// Built-in deck shipped with the binary for each voting system.
fn default_deck(system: VotingSystem) -> Vec<Card> {
    match system {
        VotingSystem::Fibonacci => vec![
            Card::new("0", Some(0.0)),
            Card::new("1", Some(1.0)),
            Card::new("2", Some(2.0)),
            Card::new("3", Some(3.0)),
            Card::new("5", Some(5.0)),
            Card::new("8", Some(8.0)),
            Card::new("13", Some(13.0)),
            Card::new("21", Some(21.0)),
            Card::new("34", Some(34.0)),
            Card::new("55", Some(55.0)),
            Card::new("89", Some(89.0)),
            Card::new("?", None),
            Card {
                label: "coffee".into(),
                value: None,
                icon: Some("coffee".into()),
            },
        ],
        VotingSystem::ModifiedFibonacci => vec![
            Card::new("0", Some(0.0)),
            Card::new("½", Some(0.5)),
            Card::new("1", Some(1.0)),
            Card::new("2", Some(2.0)),
            Card::new("3", Some(3.0)),
            Card::new("5", Some(5.0)),
            Card::new("8", Some(8.0)),
            Card::new("13", Some(13.0)),
            Card::new("20", Some(20.0)),
            Card::new("40", Some(40.0)),
            Card::new("100", Some(100.0)),
            Card::new("?", None),
        ],
        VotingSystem::Tshirt => vec![
            Card::new("XS", None),
            Card::new("S", None),
            Card::new("M", None),
            Card::new("L", None),
            Card::new("XL", None),
            Card::new("XXL", None),
            Card::new("?", None),
        ],
        VotingSystem::PowersOf2 => vec![
            Card::new("1", Some(1.0)),
            Card::new("2", Some(2.0)),
            Card::new("4", Some(4.0)),
            Card::new("8", Some(8.0)),
            Card::new("16", Some(16.0)),
            Card::new("32", Some(32.0)),
            Card::new("64", Some(64.0)),
            Card::new("?", None),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_voting_system_has_a_built_in_deck() {
        let config = AppConfig::default();
        for system in [
            VotingSystem::Fibonacci,
            VotingSystem::ModifiedFibonacci,
            VotingSystem::Tshirt,
            VotingSystem::PowersOf2,
        ] {
            assert!(!config.deck(system).is_empty());
        }
    }

    #[test]
    fn configured_deck_overrides_built_in_one() {
        let raw = RawConfig {
            decks: IndexMap::from([(
                VotingSystem::Tshirt,
                vec![Card::new("S", None), Card::new("L", None)],
            )]),
            reaction_cooldown_ms: Some(1_000),
            persistence_timeout_ms: None,
            retention_window_secs: None,
            sweep_interval_secs: None,
        };
        let config: AppConfig = raw.into();

        assert_eq!(config.deck(VotingSystem::Tshirt).len(), 2);
        assert_eq!(config.reaction_cooldown(), Duration::from_millis(1_000));
        // Untouched systems keep their defaults.
        assert_eq!(
            config.deck(VotingSystem::PowersOf2),
            default_deck(VotingSystem::PowersOf2)
        );
    }
}
