//! Process-global input hook.
//!
//! One `rdev::listen` thread serves every consumer: the hotkey
//! trigger subscribes to key edges, the location picker subscribes to
//! pointer presses. rdev observes events without consuming them, so
//! the rest of the system still sees the user's clicks.
//!
//! rdev's listener blocks forever and cannot be torn down, so the
//! hook is a process singleton; consumers end their interest by
//! dropping their subscription receiver.

use autoclick_core::{GlobalKeyEvent, KeyDirection, MouseButton, PointerPress, PressSource};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use tracing::{error, info};

static GLOBAL_HOOK: OnceLock<Arc<InputHook>> = OnceLock::new();

/// Get the process-wide input hook, starting its listener thread on
/// first use.
pub fn global_input_hook() -> Arc<InputHook> {
    GLOBAL_HOOK
        .get_or_init(|| {
            let hook = Arc::new(InputHook::new());
            let listener = hook.clone();
            thread::spawn(move || listener.listen_loop());
            hook
        })
        .clone()
}

/// Fan-out hub for raw global input events.
pub struct InputHook {
    press_subs: Mutex<Vec<Sender<PointerPress>>>,
    key_subs: Mutex<Vec<Sender<GlobalKeyEvent>>>,
}

impl InputHook {
    /// Create a hub with no listener attached. Used directly by tests;
    /// production code goes through [`global_input_hook`].
    pub fn new() -> Self {
        Self {
            press_subs: Mutex::new(Vec::new()),
            key_subs: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to OS-global key edges (for the hotkey trigger).
    pub fn key_events(&self) -> Receiver<GlobalKeyEvent> {
        let (tx, rx) = bounded(256);
        self.key_subs.lock().unwrap().push(tx);
        rx
    }

    fn listen_loop(self: Arc<Self>) {
        info!("input hook thread started (rdev)");

        // rdev button presses carry no coordinates; backfill from the
        // last observed mouse move.
        let mut last_pos = (0i32, 0i32);
        let callback = move |event: rdev::Event| {
            self.handle_event(&event.event_type, &mut last_pos);
        };

        if let Err(err) = rdev::listen(callback) {
            error!(?err, "input hook error");
        }

        info!("input hook thread exiting");
    }

    fn handle_event(&self, event: &rdev::EventType, last_pos: &mut (i32, i32)) {
        match event {
            rdev::EventType::MouseMove { x, y } => {
                *last_pos = (*x as i32, *y as i32);
            }
            rdev::EventType::ButtonPress(button) => {
                if let Some(button) = convert_button(*button) {
                    fan_out(
                        &self.press_subs,
                        PointerPress {
                            x: last_pos.0,
                            y: last_pos.1,
                            button,
                        },
                    );
                }
            }
            rdev::EventType::KeyPress(key) => {
                fan_out(
                    &self.key_subs,
                    GlobalKeyEvent {
                        key: key_name(*key),
                        direction: KeyDirection::Down,
                    },
                );
            }
            rdev::EventType::KeyRelease(key) => {
                fan_out(
                    &self.key_subs,
                    GlobalKeyEvent {
                        key: key_name(*key),
                        direction: KeyDirection::Up,
                    },
                );
            }
            _ => {}
        }
    }
}

impl Default for InputHook {
    fn default() -> Self {
        Self::new()
    }
}

impl PressSource for InputHook {
    fn subscribe(&self) -> Receiver<PointerPress> {
        let (tx, rx) = bounded(64);
        self.press_subs.lock().unwrap().push(tx);
        rx
    }
}

/// Deliver to every live subscriber, dropping the ones that hung up.
/// A full subscriber loses the event rather than blocking the hook.
fn fan_out<T: Clone>(subs: &Mutex<Vec<Sender<T>>>, value: T) {
    let mut subs = subs.lock().unwrap();
    subs.retain(|tx| !matches!(tx.try_send(value.clone()), Err(TrySendError::Disconnected(_))));
}

fn convert_button(button: rdev::Button) -> Option<MouseButton> {
    match button {
        rdev::Button::Left => Some(MouseButton::Left),
        rdev::Button::Right => Some(MouseButton::Right),
        rdev::Button::Middle => Some(MouseButton::Middle),
        rdev::Button::Unknown(_) => None,
    }
}

/// Stable name for a key, matching what the hotkey trigger compares
/// against (e.g. "F6").
fn key_name(key: rdev::Key) -> String {
    use rdev::Key;
    match key {
        Key::F1 => "F1".into(),
        Key::F2 => "F2".into(),
        Key::F3 => "F3".into(),
        Key::F4 => "F4".into(),
        Key::F5 => "F5".into(),
        Key::F6 => "F6".into(),
        Key::F7 => "F7".into(),
        Key::F8 => "F8".into(),
        Key::F9 => "F9".into(),
        Key::F10 => "F10".into(),
        Key::F11 => "F11".into(),
        Key::F12 => "F12".into(),
        Key::Escape => "Escape".into(),
        Key::Space => "Space".into(),
        Key::Tab => "Tab".into(),
        Key::Return => "Return".into(),
        Key::Backspace => "Backspace".into(),
        Key::Delete => "Delete".into(),
        Key::Home => "Home".into(),
        Key::End => "End".into(),
        Key::PageUp => "PageUp".into(),
        Key::PageDown => "PageDown".into(),
        Key::UpArrow => "Up".into(),
        Key::DownArrow => "Down".into(),
        Key::LeftArrow => "Left".into(),
        Key::RightArrow => "Right".into(),
        Key::Pause => "Pause".into(),
        Key::Insert => "Insert".into(),
        // The hotkey path only needs a stable, comparable name; the
        // Debug form is exactly that for everything else.
        other => format!("{:?}", other),
    }
}
