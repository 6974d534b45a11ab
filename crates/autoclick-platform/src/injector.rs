//! Input injection implementations.

use crate::{PlatformError, PlatformResult};
use autoclick_core::{
    ClickArity, ClickInjector, CursorProbe, InjectionError, MouseButton,
};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Gap between the two physical clicks of a double click.
const DOUBLE_CLICK_GAP_MS: u64 = 30;

/// Minimal no-op injector for early development / testing. Reports a
/// fixed cursor position.
pub struct NoopInjector;

impl ClickInjector for NoopInjector {
    fn inject(
        &self,
        x: i32,
        y: i32,
        button: MouseButton,
        arity: ClickArity,
    ) -> Result<(), InjectionError> {
        debug!(x, y, ?button, ?arity, "NoopInjector: would inject click");
        Ok(())
    }
}

impl CursorProbe for NoopInjector {
    fn cursor_position(&self) -> Result<(i32, i32), InjectionError> {
        Ok((0, 0))
    }
}

/// Real input injector using the `enigo` crate.
pub struct EnigoInjector {
    enigo: Mutex<Enigo>,
}

impl EnigoInjector {
    pub fn new() -> PlatformResult<Self> {
        let settings = Settings::default();
        let enigo = Enigo::new(&settings)
            .map_err(|e| PlatformError::InjectionFailed(format!("failed to create Enigo: {e}")))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn click_once(enigo: &mut Enigo, btn: Button) -> Result<(), InjectionError> {
        enigo
            .button(btn, Direction::Click)
            .map_err(|e| InjectionError(e.to_string()))
    }
}

impl ClickInjector for EnigoInjector {
    fn inject(
        &self,
        x: i32,
        y: i32,
        button: MouseButton,
        arity: ClickArity,
    ) -> Result<(), InjectionError> {
        let mut enigo = self.enigo.lock().unwrap();

        debug!(x, y, ?button, ?arity, "injecting click");
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| InjectionError(e.to_string()))?;

        let btn = button_to_enigo(button);
        Self::click_once(&mut enigo, btn)?;
        if arity == ClickArity::Double {
            thread::sleep(Duration::from_millis(DOUBLE_CLICK_GAP_MS));
            Self::click_once(&mut enigo, btn)?;
        }
        Ok(())
    }
}

impl CursorProbe for EnigoInjector {
    fn cursor_position(&self) -> Result<(i32, i32), InjectionError> {
        let enigo = self.enigo.lock().unwrap();
        enigo
            .location()
            .map_err(|e| InjectionError(e.to_string()))
    }
}

fn button_to_enigo(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}
