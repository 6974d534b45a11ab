//! One-shot location picker: captures the next global pointer press.

use crate::MouseButton;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A raw OS-global pointer press, observed (never consumed) by the
/// picker.
#[derive(Debug, Clone, Copy)]
pub struct PointerPress {
    pub x: i32,
    pub y: i32,
    pub button: MouseButton,
}

/// Source of raw global pointer presses. The platform hook implements
/// this; tests use a channel-backed fake.
pub trait PressSource: Send + Sync {
    /// Open a fresh subscription to press events.
    fn subscribe(&self) -> Receiver<PointerPress>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState {
    Idle,
    Armed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PickerError {
    #[error("picker is already armed")]
    AlreadyArmed,
}

/// Events delivered back to the caller asynchronously.
#[derive(Debug, Clone, Copy)]
pub enum PickerEvent {
    /// The armed pick captured a coordinate and returned to idle.
    PickCompleted { x: i32, y: i32 },
}

/// `Idle -> Armed -> Idle` state machine. Each arm is a single-shot
/// subscription: the listener self-terminates after the first press.
pub struct LocationPicker {
    source: Arc<dyn PressSource>,
    armed: Arc<AtomicBool>,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    event_tx: Sender<PickerEvent>,
    event_rx: Receiver<PickerEvent>,
}

impl LocationPicker {
    pub fn new(source: Arc<dyn PressSource>) -> Self {
        let (event_tx, event_rx) = bounded(16);
        Self {
            source,
            armed: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
            worker: Mutex::new(None),
            event_tx,
            event_rx,
        }
    }

    pub fn state(&self) -> PickerState {
        if self.armed.load(Ordering::SeqCst) {
            PickerState::Armed
        } else {
            PickerState::Idle
        }
    }

    /// Begin listening for the next press anywhere on screen.
    pub fn arm(&self) -> Result<(), PickerError> {
        if self.armed.swap(true, Ordering::SeqCst) {
            return Err(PickerError::AlreadyArmed);
        }

        // Reap the worker left behind by a completed pick.
        if let Some(old) = self.worker.lock().unwrap().take() {
            let _ = old.join();
        }

        let cancel = Arc::new(AtomicBool::new(false));
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        let presses = self.source.subscribe();
        let armed = self.armed.clone();
        let event_tx = self.event_tx.clone();

        let worker = thread::spawn(move || {
            info!("location pick armed");
            loop {
                if cancel.load(Ordering::SeqCst) {
                    debug!("location pick disarmed before capture");
                    break;
                }
                match presses.recv_timeout(Duration::from_millis(50)) {
                    Ok(press) => {
                        info!(press.x, press.y, "location pick captured");
                        armed.store(false, Ordering::SeqCst);
                        if let Err(e) = event_tx.try_send(PickerEvent::PickCompleted {
                            x: press.x,
                            y: press.y,
                        }) {
                            warn!("failed to deliver pick result: {}", e);
                        }
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        warn!("press source disconnected while armed");
                        armed.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            // Dropping `presses` ends the one-shot subscription.
        });

        *self.worker.lock().unwrap() = Some(worker);
        Ok(())
    }

    /// Cancel an armed pick. Idempotent; used at process shutdown.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.store(true, Ordering::SeqCst);
        }
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }

    /// Try to receive a completed pick (non-blocking).
    pub fn try_recv(&self) -> Option<PickerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drain all pending picker events.
    pub fn drain(&self) -> Vec<PickerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for LocationPicker {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    /// Fans a single channel out to every subscriber; good enough for
    /// one armed pick at a time.
    struct FakePresses {
        tx: Sender<PointerPress>,
        rx: Receiver<PointerPress>,
    }

    impl FakePresses {
        fn new() -> Arc<Self> {
            let (tx, rx) = unbounded();
            Arc::new(Self { tx, rx })
        }

        fn press(&self, x: i32, y: i32) {
            let _ = self.tx.send(PointerPress {
                x,
                y,
                button: MouseButton::Left,
            });
        }
    }

    impl PressSource for FakePresses {
        fn subscribe(&self) -> Receiver<PointerPress> {
            self.rx.clone()
        }
    }

    fn wait_until(deadline_ms: u64, mut pred: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        pred()
    }

    #[test]
    fn arm_captures_exactly_one_press() {
        let source = FakePresses::new();
        let picker = LocationPicker::new(source.clone());

        picker.arm().unwrap();
        assert_eq!(picker.state(), PickerState::Armed);

        source.press(10, 20);
        assert!(wait_until(1000, || picker.state() == PickerState::Idle));

        let events = picker.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            PickerEvent::PickCompleted { x: 10, y: 20 }
        ));

        // A press after capture is not delivered: the subscription
        // ended with the first event.
        source.press(30, 40);
        thread::sleep(Duration::from_millis(100));
        assert!(picker.drain().is_empty());
    }

    #[test]
    fn arm_while_armed_fails() {
        let source = FakePresses::new();
        let picker = LocationPicker::new(source);

        picker.arm().unwrap();
        assert_eq!(picker.arm(), Err(PickerError::AlreadyArmed));
        picker.disarm();
    }

    #[test]
    fn rearm_requires_new_arm_call() {
        let source = FakePresses::new();
        let picker = LocationPicker::new(source.clone());

        picker.arm().unwrap();
        source.press(1, 2);
        assert!(wait_until(1000, || picker.state() == PickerState::Idle));
        picker.drain();

        picker.arm().unwrap();
        source.press(3, 4);
        assert!(wait_until(1000, || picker.state() == PickerState::Idle));

        let events = picker.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PickerEvent::PickCompleted { x: 3, y: 4 }));
    }

    #[test]
    fn disarm_is_idempotent_and_captures_nothing() {
        let source = FakePresses::new();
        let picker = LocationPicker::new(source.clone());

        picker.arm().unwrap();
        picker.disarm();
        picker.disarm();
        assert_eq!(picker.state(), PickerState::Idle);

        source.press(9, 9);
        thread::sleep(Duration::from_millis(100));
        assert!(picker.drain().is_empty());
    }
}
