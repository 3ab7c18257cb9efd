//! Application configuration.
//!
//! Defaults are compiled in from `config.toml` at the crate root.  A user file
//! is layered on top, key by key within each section:
//!
//! | Source | Malformed file |
//! |---|---|
//! | `--config <path>` | error, startup aborts |
//! | `<config_dir>/leap_guitar/config.toml` | warning, defaults used |
//!
//! The engine sections (`timing`, `fretboard`, `strum`, `audio`, `strings`)
//! deserialize into [`EngineConfig`]; `[app]` holds MIDI and simulation
//! settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use string_engine::{EngineConfig, EngineError};

use crate::AppError;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

// ════════════════════════════════════════════════════════════════════════════
// AppSettings — the [app] section
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// GM program number (0–127).
    pub program:       u8,
    /// Channel of the first string; each further string takes the next one.
    pub channel:       u8,
    pub velocity:      u8,
    /// MIDI pitch of each string's open note, keyed by string name.
    pub open_pitch:    BTreeMap<String, u8>,
    /// Simulated players besides the local one.
    pub remote_users:  usize,
    pub headless_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            program:       25,
            channel:       0,
            velocity:      100,
            open_pitch:    BTreeMap::from([("E".to_string(), 40)]),
            remote_users:  2,
            headless_secs: 20,
        }
    }
}

#[derive(Deserialize, Default)]
struct AppSection {
    #[serde(default)]
    app: AppSettings,
}

// ════════════════════════════════════════════════════════════════════════════
// AppConfig
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub app:    AppSettings,
}

impl AppConfig {
    /// Load the embedded defaults, layered with `explicit` if given or with
    /// the per-user config file if one exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let user = match explicit {
            Some(path) => {
                info!(target: "config", "loading config {}", path.display());
                Some(read_table(path)?)
            }
            None => user_config_path()
                .filter(|p| p.exists())
                .and_then(|path| match read_table(&path) {
                    Ok(t) => {
                        info!(target: "config", "loading config {}", path.display());
                        Some(t)
                    }
                    Err(e) => {
                        warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e);
                        None
                    }
                }),
        };
        Self::layered(user)
    }

    /// Defaults overridden by the TOML document `overrides`.
    pub fn from_overrides(overrides: &str) -> Result<Self, AppError> {
        Self::layered(Some(toml::from_str(overrides)?))
    }

    fn layered(user: Option<toml::Table>) -> Result<Self, AppError> {
        let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        if let Some(user) = user {
            merge(&mut table, user);
        }

        let engine: EngineConfig = toml::Value::Table(table.clone()).try_into()?;
        let section: AppSection  = toml::Value::Table(table).try_into()?;
        engine.validate().map_err(EngineError::from)?;

        Ok(AppConfig { engine, app: section.app })
    }

    pub fn headless_duration(&self) -> Duration {
        Duration::from_secs(self.app.headless_secs)
    }

    /// Open pitch for `string`, if configured.
    pub fn open_pitch(&self, string: &str) -> Option<u8> {
        self.app.open_pitch.get(string).copied()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("leap_guitar").join("config.toml"))
}

fn read_table(path: &Path) -> Result<toml::Table, AppError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| AppError::Io { path: path.to_path_buf(), source })?;
    Ok(toml::from_str(&contents)?)
}

/// Overlay `user` onto `base`: sections merge key by key, everything else
/// (including the `strings` array) is replaced wholesale.
fn merge(base: &mut toml::Table, user: toml::Table) {
    for (key, value) in user {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(section)), toml::Value::Table(overrides)) => {
                for (k, v) in overrides {
                    section.insert(k, v);
                }
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use string_engine::{ConfigError, EdgeMemory, GatingPolicy};

    #[test]
    fn embedded_defaults_match_engine_defaults() {
        let cfg = AppConfig::from_overrides("").unwrap();
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.open_pitch("E"), Some(40));
        assert_eq!(cfg.open_pitch("D"), Some(50));
        assert_eq!(cfg.headless_duration(), Duration::from_secs(20));
    }

    #[test]
    fn override_keeps_sibling_keys() {
        let cfg = AppConfig::from_overrides("[fretboard]\ngating = \"touch\"\n").unwrap();
        assert_eq!(cfg.engine.fretboard.gating, GatingPolicy::Touch);
        assert_eq!(cfg.engine.fretboard.frets, 13);
        assert_eq!(cfg.engine.fretboard.spacing, 0.045);
    }

    #[test]
    fn strings_array_is_replaced() {
        let cfg = AppConfig::from_overrides(
            r#"
            [[strings]]
            name = "A"
            sound_offset = 2
            capture_x = { min = -0.3, max = -0.05 }
            capture_z = { min = 0.07, max = 0.12 }

            [[strings]]
            name = "D"
            sound_offset = 2
            capture_x = { min = -0.3, max = -0.05 }
            capture_z = { min = 0.13, max = 0.18 }
            "#,
        )
        .unwrap();
        let names: Vec<_> = cfg.engine.strings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["A", "D"]);
        assert_eq!(cfg.engine.strings[1].sound_offset, 2);
    }

    #[test]
    fn app_section_overrides() {
        let cfg = AppConfig::from_overrides(
            "[app]\nremote_users = 5\n[strum]\nedge_memory = \"gated\"\n",
        )
        .unwrap();
        assert_eq!(cfg.app.remote_users, 5);
        assert_eq!(cfg.app.program, 25);
        assert_eq!(cfg.engine.strum.edge_memory, EdgeMemory::Gated);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = AppConfig::from_overrides("[fretboard]\nfrets = 1\n").unwrap_err();
        assert!(matches!(
            err,
            AppError::Engine(EngineError::Config(ConfigError::InvalidFretCount(1)))
        ));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = AppConfig::from_overrides("[fretboard\nfrets = 3").unwrap_err();
        assert!(matches!(err, AppError::Toml(_)));
    }

    #[test]
    fn unknown_gating_is_an_error() {
        let err = AppConfig::from_overrides("[fretboard]\ngating = \"laser\"\n").unwrap_err();
        assert!(matches!(err, AppError::Toml(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/leap_guitar.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }
}
