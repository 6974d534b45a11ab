//! Global hotkey trigger: flips the scheduler on each press-edge.

use crate::ClickScheduler;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Key that toggles the scheduler unless the user rebinds it.
pub const DEFAULT_HOTKEY: &str = "F6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// A raw OS-global key edge, delivered by the platform hook.
#[derive(Debug, Clone)]
pub struct GlobalKeyEvent {
    /// Stable key name, e.g. "F6" or "a".
    pub key: String,
    pub direction: KeyDirection,
}

/// Listens for one toggle key on its own worker and calls
/// [`ClickScheduler::toggle`] on each press-edge. A held key that
/// auto-repeats `Down` edges fires only once until released.
pub struct HotkeyTrigger {
    stopped: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HotkeyTrigger {
    /// Spawn the listen worker. Does not block the caller.
    pub fn spawn(
        hotkey: impl Into<String>,
        events: Receiver<GlobalKeyEvent>,
        scheduler: Arc<ClickScheduler>,
    ) -> Self {
        let hotkey = hotkey.into();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_flag = stopped.clone();

        let worker = thread::spawn(move || {
            info!(%hotkey, "hotkey listener started");
            let mut held = false;
            loop {
                if stopped_flag.load(Ordering::SeqCst) {
                    break;
                }
                match events.recv_timeout(Duration::from_millis(50)) {
                    Ok(event) => {
                        if !event.key.eq_ignore_ascii_case(&hotkey) {
                            continue;
                        }
                        match event.direction {
                            KeyDirection::Down => {
                                if !held {
                                    held = true;
                                    debug!(%hotkey, "hotkey pressed, toggling");
                                    scheduler.toggle();
                                }
                            }
                            KeyDirection::Up => held = false,
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("key event source disconnected");
                        break;
                    }
                }
            }
            info!("hotkey listener exiting");
        });

        Self {
            stopped,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stop the listener. Idempotent: stopping an already-stopped
    /// listener is a no-op.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for HotkeyTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}
