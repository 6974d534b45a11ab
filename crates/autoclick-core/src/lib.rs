//! autoclick-core: click session model + scheduling engine.
//!
//! Design goal: keep this crate UI-agnostic and platform-agnostic.
//! Platform specific I/O (injection, global input hook) lives in
//! `autoclick-platform`.

mod hotkey;
mod picker;
mod scheduler;
mod settings;

pub use hotkey::{GlobalKeyEvent, HotkeyTrigger, KeyDirection, DEFAULT_HOTKEY};
pub use picker::{
    LocationPicker, PickerError, PickerEvent, PickerState, PointerPress, PressSource,
};
pub use scheduler::{
    ClickInjector, ClickScheduler, CursorProbe, InjectionError, SchedulerError, SchedulerEvent,
    SchedulerState,
};
pub use settings::{
    load_settings, load_settings_from, save_settings, save_settings_to, settings_path,
    SettingsError, SettingsRecord, SettingsResult,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Interval used when the raw time fields fail to parse.
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Repeat count used when the raw count field fails to parse.
pub const DEFAULT_REPEAT_COUNT: u32 = 100;

/// Immutable configuration snapshot for one run.
///
/// A session is cloned into the run loop on start; editing UI fields
/// while a run is active never mutates the in-flight run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickSession {
    /// Delay between consecutive logical clicks. Always >= 1.
    pub interval_ms: u64,
    pub button: MouseButton,
    pub arity: ClickArity,
    pub repeat: RepeatPolicy,
    pub location: LocationPolicy,
}

impl ClickSession {
    /// Build a session, clamping the interval to the >= 1 invariant.
    pub fn new(
        interval_ms: u64,
        button: MouseButton,
        arity: ClickArity,
        repeat: RepeatPolicy,
        location: LocationPolicy,
    ) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            button,
            arity,
            repeat: repeat.normalized(),
            location,
        }
    }
}

impl Default for ClickSession {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            button: MouseButton::Left,
            arity: ClickArity::Single,
            repeat: RepeatPolicy::Infinite,
            location: LocationPolicy::CurrentCursor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Single or double physical injection; either way one logical
/// repetition for repeat-count purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickArity {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatPolicy {
    /// Run until explicitly stopped.
    Infinite,
    /// Stop after n logical clicks. Invariant: n >= 1.
    Count(u32),
}

impl RepeatPolicy {
    /// Enforce the `Count(n >= 1)` invariant.
    pub fn normalized(self) -> Self {
        match self {
            RepeatPolicy::Count(0) => {
                warn!("repeat count 0 clamped to 1");
                RepeatPolicy::Count(1)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationPolicy {
    /// Re-sample the live pointer position before each click.
    CurrentCursor,
    /// Click the same screen coordinate every tick.
    Fixed { x: i32, y: i32 },
}

/// Raw hours/mins/secs/millis text fields as the user typed them.
///
/// Parsing is lenient: any non-numeric field collapses the whole
/// interval to [`DEFAULT_INTERVAL_MS`]; a parsed total below 1 ms
/// clamps to 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalFields {
    pub hours: String,
    pub mins: String,
    pub secs: String,
    pub millis: String,
}

impl IntervalFields {
    pub fn new(hours: &str, mins: &str, secs: &str, millis: &str) -> Self {
        Self {
            hours: hours.to_string(),
            mins: mins.to_string(),
            secs: secs.to_string(),
            millis: millis.to_string(),
        }
    }

    /// Total interval in milliseconds with the lenient defaulting rules.
    pub fn total_ms(&self) -> u64 {
        let parse = |s: &str| s.trim().parse::<i64>();
        match (
            parse(&self.hours),
            parse(&self.mins),
            parse(&self.secs),
            parse(&self.millis),
        ) {
            (Ok(h), Ok(m), Ok(s), Ok(ms)) => {
                // Absurdly large fields saturate rather than overflow.
                let total = h
                    .saturating_mul(3_600_000)
                    .saturating_add(m.saturating_mul(60_000))
                    .saturating_add(s.saturating_mul(1000))
                    .saturating_add(ms);
                total.max(1) as u64
            }
            _ => {
                warn!(
                    hours = %self.hours, mins = %self.mins,
                    secs = %self.secs, millis = %self.millis,
                    "malformed interval fields, using default"
                );
                DEFAULT_INTERVAL_MS
            }
        }
    }
}
