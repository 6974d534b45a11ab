//! Click scheduler: run/stop state machine + timed execution loop.

use crate::{ClickArity, ClickSession, LocationPolicy, MouseButton, RepeatPolicy};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum single sleep before the cancel flag is re-checked.
const SLEEP_CHUNK_MS: u64 = 50;

/// Transient injection failure. The run loop treats it as a skipped
/// tick and continues.
#[derive(Debug, Error)]
#[error("injection failed: {0}")]
pub struct InjectionError(pub String);

/// State-machine violations surfaced to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("scheduler is not running")]
    NotRunning,
}

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Events emitted by the run loop, polled by the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    /// State changed.
    StateChanged {
        old: SchedulerState,
        new: SchedulerState,
    },
    /// One logical click was injected.
    ClickEmitted { emitted: u64 },
    /// A tick was skipped because injection (or cursor sampling) failed.
    InjectionFailed { message: String },
    /// A counted run reached its count and stopped on its own.
    Completed { total: u64 },
}

/// Capability that performs the physical click at the OS level.
///
/// A `Double` arity performs two physical clicks with an
/// injector-defined intra-click gap; the scheduler counts it as one
/// logical repetition.
pub trait ClickInjector: Send + Sync {
    fn inject(
        &self,
        x: i32,
        y: i32,
        button: MouseButton,
        arity: ClickArity,
    ) -> Result<(), InjectionError>;
}

/// Capability that reports the live pointer position.
pub trait CursorProbe: Send + Sync {
    fn cursor_position(&self) -> Result<(i32, i32), InjectionError>;
}

/// One active run: its cancel flag and worker thread.
struct RunHandle {
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Owns the only mutable scheduler state in the process. All other
/// components observe it through this API.
pub struct ClickScheduler {
    injector: Arc<dyn ClickInjector>,
    cursor: Arc<dyn CursorProbe>,
    running: Arc<AtomicBool>,
    run: Mutex<Option<RunHandle>>,
    last_session: Mutex<Option<ClickSession>>,
    event_tx: Sender<SchedulerEvent>,
    event_rx: Receiver<SchedulerEvent>,
}

impl ClickScheduler {
    pub fn new(injector: Arc<dyn ClickInjector>, cursor: Arc<dyn CursorProbe>) -> Self {
        let (event_tx, event_rx) = bounded(256);
        Self {
            injector,
            cursor,
            running: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
            last_session: Mutex::new(None),
            event_tx,
            event_rx,
        }
    }

    /// Record a session for the hotkey path without starting it.
    pub fn configure(&self, session: ClickSession) {
        *self.last_session.lock().unwrap() = Some(session);
    }

    /// Spawn the run loop for `session`. Non-blocking.
    pub fn start(&self, session: ClickSession) -> Result<(), SchedulerError> {
        let mut run = self.run.lock().unwrap();
        if self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        // Reap the worker a naturally completed run left behind.
        if let Some(old) = run.take() {
            let _ = old.worker.join();
        }

        *self.last_session.lock().unwrap() = Some(session.clone());

        let cancel = Arc::new(AtomicBool::new(false));
        self.running.store(true, Ordering::SeqCst);
        self.emit(SchedulerEvent::StateChanged {
            old: SchedulerState::Stopped,
            new: SchedulerState::Running,
        });

        let ctx = RunContext {
            session,
            cancel: cancel.clone(),
            running: self.running.clone(),
            injector: self.injector.clone(),
            cursor: self.cursor.clone(),
            event_tx: self.event_tx.clone(),
        };
        let worker = thread::spawn(move || ctx.run_loop());

        *run = Some(RunHandle { cancel, worker });
        Ok(())
    }

    /// Signal cancellation to the active loop and wait for it to
    /// observe the flag (bounded by one sleep chunk). Safe to call
    /// from any thread, including the hotkey worker.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        let handle = {
            let mut run = self.run.lock().unwrap();
            // The swap decides who reports the transition when a stop
            // races natural completion: only the side that observed
            // `true` emits.
            if !self.running.swap(false, Ordering::SeqCst) {
                return Err(SchedulerError::NotRunning);
            }
            run.take()
        };

        if let Some(handle) = handle {
            handle.cancel.store(true, Ordering::SeqCst);
            let _ = handle.worker.join();
        }

        self.emit(SchedulerEvent::StateChanged {
            old: SchedulerState::Running,
            new: SchedulerState::Stopped,
        });
        info!("scheduler stopped");
        Ok(())
    }

    /// Best-effort flip: stop if running, else start with the most
    /// recently configured session. Inner errors are swallowed.
    pub fn toggle(&self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                debug!(error = %e, "toggle stop raced with completion");
            }
        } else {
            let session = self.last_session.lock().unwrap().clone();
            match session {
                Some(session) => {
                    if let Err(e) = self.start(session) {
                        debug!(error = %e, "toggle start raced with another start");
                    }
                }
                None => warn!("no session configured, toggle ignored"),
            }
        }
    }

    /// Non-blocking snapshot of the run state.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Option<SchedulerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop if running. Idempotent, for process shutdown.
    pub fn shutdown(&self) {
        let _ = self.stop();
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("failed to emit scheduler event: {}", e);
        }
    }
}

impl Drop for ClickScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything the run loop needs, cloned out of the scheduler so the
/// worker never touches the `run` mutex.
struct RunContext {
    session: ClickSession,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    injector: Arc<dyn ClickInjector>,
    cursor: Arc<dyn CursorProbe>,
    event_tx: Sender<SchedulerEvent>,
}

impl RunContext {
    fn run_loop(self) {
        info!(
            interval_ms = self.session.interval_ms,
            repeat = ?self.session.repeat,
            "click worker started"
        );

        let mut emitted: u64 = 0;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }

            // Fixed targets click the stored coordinate; follow-cursor
            // re-samples the live pointer before every click.
            let target = match self.session.location {
                LocationPolicy::Fixed { x, y } => Ok((x, y)),
                LocationPolicy::CurrentCursor => self.cursor.cursor_position(),
            };

            let result = target.and_then(|(x, y)| {
                self.injector
                    .inject(x, y, self.session.button, self.session.arity)
                    .map(|()| (x, y))
            });

            match result {
                Ok((x, y)) => {
                    emitted += 1;
                    debug!(x, y, emitted, "click injected");
                    self.emit(SchedulerEvent::ClickEmitted { emitted });
                }
                Err(e) => {
                    // Transient (e.g. target window lost focus): skip
                    // the tick and keep going.
                    warn!(error = %e, "injection failed, tick skipped");
                    self.emit(SchedulerEvent::InjectionFailed {
                        message: e.to_string(),
                    });
                }
            }

            if let RepeatPolicy::Count(n) = self.session.repeat {
                if emitted >= u64::from(n) {
                    if !self.cancel.load(Ordering::SeqCst)
                        && self.running.swap(false, Ordering::SeqCst)
                    {
                        self.emit(SchedulerEvent::StateChanged {
                            old: SchedulerState::Running,
                            new: SchedulerState::Stopped,
                        });
                        self.emit(SchedulerEvent::Completed { total: emitted });
                        info!(total = emitted, "counted run completed");
                    }
                    return;
                }
            }

            if sleep_cancellable(self.session.interval_ms, &self.cancel) {
                break;
            }
        }

        debug!("click worker exiting on cancel");
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("failed to emit scheduler event: {}", e);
        }
    }
}

/// Sleep `total_ms` in chunks, checking the cancel flag between
/// chunks. Returns true if cancellation was observed.
fn sleep_cancellable(total_ms: u64, cancel: &AtomicBool) -> bool {
    let mut waited = 0u64;
    while waited < total_ms {
        if cancel.load(Ordering::SeqCst) {
            return true;
        }
        let chunk = (total_ms - waited).min(SLEEP_CHUNK_MS);
        thread::sleep(Duration::from_millis(chunk));
        waited += chunk;
    }
    cancel.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Records every injection; can be scripted to fail the first n.
    struct RecordingInjector {
        clicks: Mutex<Vec<(i32, i32, MouseButton, ClickArity)>>,
        fail_first: Mutex<u32>,
        attempts: Mutex<u32>,
    }

    impl RecordingInjector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                clicks: Mutex::new(Vec::new()),
                fail_first: Mutex::new(0),
                attempts: Mutex::new(0),
            })
        }

        fn failing_first(n: u32) -> Arc<Self> {
            let injector = Self::new();
            *injector.fail_first.lock().unwrap() = n;
            injector
        }

        fn clicks(&self) -> Vec<(i32, i32, MouseButton, ClickArity)> {
            self.clicks.lock().unwrap().clone()
        }

        fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }
    }

    impl ClickInjector for RecordingInjector {
        fn inject(
            &self,
            x: i32,
            y: i32,
            button: MouseButton,
            arity: ClickArity,
        ) -> Result<(), InjectionError> {
            *self.attempts.lock().unwrap() += 1;
            let mut fail = self.fail_first.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(InjectionError("scripted failure".into()));
            }
            self.clicks.lock().unwrap().push((x, y, button, arity));
            Ok(())
        }
    }

    /// Hands out positions from a script, repeating the last one.
    struct ScriptedProbe {
        positions: Mutex<Vec<(i32, i32)>>,
    }

    impl ScriptedProbe {
        fn new(positions: Vec<(i32, i32)>) -> Arc<Self> {
            Arc::new(Self {
                positions: Mutex::new(positions),
            })
        }
    }

    impl CursorProbe for ScriptedProbe {
        fn cursor_position(&self) -> Result<(i32, i32), InjectionError> {
            let mut positions = self.positions.lock().unwrap();
            if positions.len() > 1 {
                Ok(positions.remove(0))
            } else {
                positions
                    .first()
                    .copied()
                    .ok_or_else(|| InjectionError("no position scripted".into()))
            }
        }
    }

    fn fixed_probe() -> Arc<ScriptedProbe> {
        ScriptedProbe::new(vec![(0, 0)])
    }

    fn session(interval_ms: u64, repeat: RepeatPolicy, location: LocationPolicy) -> ClickSession {
        ClickSession::new(
            interval_ms,
            MouseButton::Left,
            ClickArity::Single,
            repeat,
            location,
        )
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
    fn counted_run_injects_exactly_n_and_auto_stops() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector.clone(), fixed_probe());

        scheduler
            .start(session(
                10,
                RepeatPolicy::Count(3),
                LocationPolicy::Fixed { x: 100, y: 200 },
            ))
            .unwrap();

        assert!(wait_until(2000, || !scheduler.is_running()));
        // Give a stale worker no chance to sneak in extra clicks.
        thread::sleep(Duration::from_millis(50));

        let clicks = injector.clicks();
        assert_eq!(clicks.len(), 3);
        for (x, y, button, arity) in clicks {
            assert_eq!((x, y), (100, 200));
            assert_eq!(button, MouseButton::Left);
            assert_eq!(arity, ClickArity::Single);
        }

        let events = scheduler.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::Completed { total: 3 })));
    }

    #[test]
    fn start_while_running_is_already_running() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());

        let s = session(
            50,
            RepeatPolicy::Infinite,
            LocationPolicy::Fixed { x: 1, y: 1 },
        );
        scheduler.start(s.clone()).unwrap();
        assert_eq!(scheduler.start(s), Err(SchedulerError::AlreadyRunning));
        scheduler.stop().unwrap();
    }

    #[test]
    fn stop_while_stopped_is_not_running() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());
        assert_eq!(scheduler.stop(), Err(SchedulerError::NotRunning));
    }

    #[test]
    fn stop_halts_injection_promptly() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector.clone(), fixed_probe());

        scheduler
            .start(session(
                30,
                RepeatPolicy::Infinite,
                LocationPolicy::Fixed { x: 5, y: 5 },
            ))
            .unwrap();
        scheduler.stop().unwrap();
        assert!(!scheduler.is_running());

        // stop() joins the worker, so the count is final now.
        let after_stop = injector.clicks().len();
        assert!(after_stop <= 1, "injected {after_stop} clicks after stop");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(injector.clicks().len(), after_stop);
    }

    #[test]
    fn toggle_twice_returns_to_original_state() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());

        scheduler.configure(session(
            20,
            RepeatPolicy::Infinite,
            LocationPolicy::Fixed { x: 0, y: 0 },
        ));
        assert!(!scheduler.is_running());

        scheduler.toggle();
        assert!(scheduler.is_running());
        scheduler.toggle();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn toggle_without_session_is_ignored() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());
        scheduler.toggle();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn current_cursor_follows_moving_pointer() {
        let injector = RecordingInjector::new();
        let probe = ScriptedProbe::new(vec![(1, 1), (2, 2), (3, 3)]);
        let scheduler = ClickScheduler::new(injector.clone(), probe);

        scheduler
            .start(session(
                10,
                RepeatPolicy::Count(3),
                LocationPolicy::CurrentCursor,
            ))
            .unwrap();
        assert!(wait_until(2000, || !scheduler.is_running()));

        let coords: Vec<(i32, i32)> = injector
            .clicks()
            .iter()
            .map(|(x, y, _, _)| (*x, *y))
            .collect();
        assert_eq!(coords, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn injection_failure_skips_tick_and_continues() {
        let injector = RecordingInjector::failing_first(1);
        let scheduler = ClickScheduler::new(injector.clone(), fixed_probe());

        scheduler
            .start(session(
                10,
                RepeatPolicy::Count(2),
                LocationPolicy::Fixed { x: 7, y: 8 },
            ))
            .unwrap();
        assert!(wait_until(2000, || !scheduler.is_running()));

        // First attempt failed, two successes still reached the count.
        assert_eq!(injector.clicks().len(), 2);
        assert_eq!(injector.attempts(), 3);

        let events = scheduler.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::InjectionFailed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::Completed { total: 2 })));
    }

    #[test]
    fn restart_after_completion() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector.clone(), fixed_probe());

        let s = session(
            5,
            RepeatPolicy::Count(1),
            LocationPolicy::Fixed { x: 0, y: 0 },
        );
        scheduler.start(s.clone()).unwrap();
        assert!(wait_until(2000, || !scheduler.is_running()));

        scheduler.start(s).unwrap();
        assert!(wait_until(2000, || !scheduler.is_running()));
        assert_eq!(injector.clicks().len(), 2);
    }

    #[test]
    fn stop_racing_completion_reports_one_transition() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());

        let is_stop_transition = |e: &SchedulerEvent| {
            matches!(
                e,
                SchedulerEvent::StateChanged {
                    old: SchedulerState::Running,
                    new: SchedulerState::Stopped,
                }
            )
        };

        // A Count(1) run finishes almost immediately, so the explicit
        // stop lands anywhere around the completion path.
        for _ in 0..20 {
            scheduler
                .start(session(
                    1,
                    RepeatPolicy::Count(1),
                    LocationPolicy::Fixed { x: 0, y: 0 },
                ))
                .unwrap();
            let _ = scheduler.stop();

            let mut events = Vec::new();
            assert!(wait_until(1000, || {
                events.extend(scheduler.drain());
                events.iter().any(is_stop_transition)
            }));
            // Leave room for a duplicate to show up before counting.
            thread::sleep(Duration::from_millis(10));
            events.extend(scheduler.drain());

            assert_eq!(events.iter().filter(|e| is_stop_transition(e)).count(), 1);
        }
    }

    #[test]
    fn shutdown_is_idempotent() {
        let injector = RecordingInjector::new();
        let scheduler = ClickScheduler::new(injector, fixed_probe());

        scheduler
            .start(session(
                20,
                RepeatPolicy::Infinite,
                LocationPolicy::Fixed { x: 0, y: 0 },
            ))
            .unwrap();
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
    }
}
