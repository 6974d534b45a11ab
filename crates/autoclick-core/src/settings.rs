//! Persisted settings: the flat record the front-end reads and writes.
//!
//! Fields are kept as raw strings, exactly as the user typed them;
//! conversion to a [`ClickSession`] applies the lenient defaulting
//! rules so a stray empty field never blocks a start.

use crate::hotkey::DEFAULT_HOTKEY;
use crate::{
    ClickArity, ClickSession, IntervalFields, LocationPolicy, MouseButton, RepeatPolicy,
    DEFAULT_REPEAT_COUNT,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Flat key-value record of the session fields plus UI language and
/// the toggle hotkey. Missing fields fall back to defaults so partial
/// files from older versions still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    pub hours: String,
    pub mins: String,
    pub secs: String,
    pub millis: String,
    /// "Left" | "Right" | "Middle"
    pub button: String,
    /// "Single" | "Double"
    pub click_type: String,
    /// "Infinite" | "Count"
    pub repeat_mode: String,
    pub repeat_count: String,
    /// "Current" | "Picked"
    pub location_mode: String,
    pub x: String,
    pub y: String,
    pub language: String,
    pub hotkey: String,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            hours: "0".into(),
            mins: "0".into(),
            secs: "0".into(),
            millis: "100".into(),
            button: "Left".into(),
            click_type: "Single".into(),
            repeat_mode: "Infinite".into(),
            repeat_count: "100".into(),
            location_mode: "Current".into(),
            x: "0".into(),
            y: "0".into(),
            language: "en".into(),
            hotkey: DEFAULT_HOTKEY.into(),
        }
    }
}

impl SettingsRecord {
    /// Convert the raw record into a session, defaulting instead of
    /// failing on malformed input.
    pub fn to_session(&self) -> ClickSession {
        let interval_ms = IntervalFields::new(&self.hours, &self.mins, &self.secs, &self.millis)
            .total_ms();

        let button = match self.button.trim().to_ascii_lowercase().as_str() {
            "right" => MouseButton::Right,
            "middle" => MouseButton::Middle,
            "left" => MouseButton::Left,
            other => {
                if !other.is_empty() {
                    warn!(button = %self.button, "unknown mouse button, using Left");
                }
                MouseButton::Left
            }
        };

        let arity = if self.click_type.trim().eq_ignore_ascii_case("double") {
            ClickArity::Double
        } else {
            ClickArity::Single
        };

        let repeat = if self.repeat_mode.trim().eq_ignore_ascii_case("count") {
            let n = self.repeat_count.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(count = %self.repeat_count, "malformed repeat count, using default");
                DEFAULT_REPEAT_COUNT
            });
            RepeatPolicy::Count(n)
        } else {
            RepeatPolicy::Infinite
        };

        let location = match self.location_mode.trim().to_ascii_lowercase().as_str() {
            "picked" | "fixed" => {
                let parse_coord = |raw: &str| {
                    raw.trim().parse::<i32>().unwrap_or_else(|_| {
                        warn!(coord = %raw, "malformed coordinate, using 0");
                        0
                    })
                };
                LocationPolicy::Fixed {
                    x: parse_coord(&self.x),
                    y: parse_coord(&self.y),
                }
            }
            _ => LocationPolicy::CurrentCursor,
        };

        ClickSession::new(interval_ms, button, arity, repeat, location)
    }

    /// Write a session back into record form. Fields the session does
    /// not carry survive from `self`: language, hotkey, and the typed
    /// repeat count when the repeat mode is infinite.
    pub fn with_session(&self, session: &ClickSession) -> Self {
        let total = session.interval_ms;
        let hours = total / 3_600_000;
        let mins = total % 3_600_000 / 60_000;
        let secs = total % 60_000 / 1000;
        let millis = total % 1000;

        let (repeat_mode, repeat_count) = match session.repeat {
            RepeatPolicy::Infinite => ("Infinite".to_string(), self.repeat_count.clone()),
            RepeatPolicy::Count(n) => ("Count".to_string(), n.to_string()),
        };

        let (location_mode, x, y) = match session.location {
            LocationPolicy::CurrentCursor => ("Current".to_string(), "0".into(), "0".into()),
            LocationPolicy::Fixed { x, y } => ("Picked".to_string(), x.to_string(), y.to_string()),
        };

        Self {
            hours: hours.to_string(),
            mins: mins.to_string(),
            secs: secs.to_string(),
            millis: millis.to_string(),
            button: match session.button {
                MouseButton::Left => "Left".into(),
                MouseButton::Right => "Right".into(),
                MouseButton::Middle => "Middle".into(),
            },
            click_type: match session.arity {
                ClickArity::Single => "Single".into(),
                ClickArity::Double => "Double".into(),
            },
            repeat_mode,
            repeat_count,
            location_mode,
            x,
            y,
            language: self.language.clone(),
            hotkey: self.hotkey.clone(),
        }
    }
}

/// Path of the settings file under the per-user data directory.
pub fn settings_path() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("autoclick").join("settings.json")
}

/// Load the settings record from `path`.
pub fn load_settings_from(path: &Path) -> SettingsResult<SettingsRecord> {
    let json = fs::read_to_string(path)?;
    let record: SettingsRecord = serde_json::from_str(&json)?;
    debug!(?path, "loaded settings");
    Ok(record)
}

/// Save the settings record to `path`, creating parent directories.
pub fn save_settings_to(path: &Path, record: &SettingsRecord) -> SettingsResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)?;
    info!(?path, "saved settings");
    Ok(())
}

/// Load from the default location.
pub fn load_settings() -> SettingsResult<SettingsRecord> {
    load_settings_from(&settings_path())
}

/// Save to the default location.
pub fn save_settings(record: &SettingsRecord) -> SettingsResult<()> {
    save_settings_to(&settings_path(), record)
}
