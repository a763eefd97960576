//! Dragtap Engine
//!
//! The engine crate coordinates double-tap dragging:
//! - classifies each intercepted event's origin (trackpad vs. external mouse)
//! - runs the gesture state machine over the event stream
//! - drives the double-tap and lift-detection timers
//! - injects synthetic press/release events through the relay
//!
//! This crate is macOS-only by design. It exposes a minimal, documented API:
//! - [`Engine`]: the primary type you construct and drive
//! - [`Settings`]: the shared handle the external settings surface mutates
//! - [`Machine`] and friends: the pure transition core, usable on its own
//!
//! Event deliveries and timer firings serialize on one mutex around the
//! machine, locked only for the duration of a transition; the tap callback
//! and the timer tasks are the only callers. Synthetic posts happen after
//! the lock is released and before the disposition is returned, so ordering
//! relative to the next real event is preserved.
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use mac_pointer::{DeviceQuery, Disposition, EventHandler, PointerEvent, PointerTap, SystemDeviceQuery};
use parking_lot::Mutex;
use relaypointer::RelayPointer;
use tracing::{debug, info, trace};

mod classify;
mod error;
mod machine;
mod settings;
mod ticker;

pub use classify::{DeviceClass, DeviceClassifier};
pub use error::{Error, Result};
pub use machine::{
    Command, GestureState, MAX_TAP_DISTANCE, MOVE_START_THRESHOLD, Machine, Reaction,
};
pub use settings::{
    DeviceFilter, LIFT_RANGE, Settings, SettingsSnapshot, StopMode, WINDOW_RANGE,
};
pub use ticker::Ticker;

/// Timer id for the one-shot double-tap expiry.
const DOUBLE_TAP_TIMER: &str = "double_tap";
/// Timer id for the periodic lift-detection poll.
const LIFT_TIMER: &str = "lift";

/// Engine coordinates classification, gesture state, timers and synthesis.
///
/// Construct via [`Engine::new`] from within a Tokio runtime, then
/// [`Engine::start`] to install the event tap. The tap feeds every event
/// through [`Engine::process_event`]; timers re-enter through the same shared
/// state.
#[derive(Clone)]
pub struct Engine {
    /// Shared settings handle; mutable by the external settings surface.
    settings: Arc<Settings>,
    /// The gesture state machine; the sole piece of mutable gesture state.
    machine: Arc<Mutex<Machine>>,
    /// Synthetic event injection.
    relay: RelayPointer,
    /// Per-event origin classification.
    classifier: DeviceClassifier,
    /// Double-tap and lift timers.
    ticker: Ticker,
    /// Lifecycle flag backing start/stop idempotence.
    running: Arc<AtomicBool>,
    /// Live tap handle while running.
    tap: Arc<Mutex<Option<PointerTap>>>,
}

/// Adapter installing the engine as the tap's per-event handler.
struct EngineHandler {
    /// The engine driven by this tap.
    engine: Engine,
}

impl EventHandler for EngineHandler {
    fn handle(&self, event: PointerEvent) -> Disposition {
        self.engine.process_event(&event)
    }
}

impl Engine {
    /// Create an engine wired to the live system: CoreGraphics injection and
    /// IOKit device queries.
    ///
    /// Must be called from within a Tokio runtime; the timers run on it.
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self::with_parts(initial, RelayPointer::new(), Arc::new(SystemDeviceQuery))
    }

    /// Wire an engine from explicit parts (tests and tools).
    pub fn with_parts(
        initial: SettingsSnapshot,
        relay: RelayPointer,
        query: Arc<dyn DeviceQuery>,
    ) -> Self {
        Self {
            settings: Arc::new(Settings::new(initial)),
            machine: Arc::new(Mutex::new(Machine::new())),
            relay,
            classifier: DeviceClassifier::new(query),
            ticker: Ticker::new(),
            running: Arc::new(AtomicBool::new(false)),
            tap: Arc::new(Mutex::new(None)),
        }
    }

    /// The shared settings handle, for the external settings surface.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    /// True while the event tap is installed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Name of the current gesture state, for diagnostics.
    pub fn gesture_phase(&self) -> &'static str {
        match self.machine.lock().state() {
            GestureState::Idle => "idle",
            GestureState::AwaitingSecondTap { .. } => "awaiting_second_tap",
            GestureState::Dragging { .. } => "dragging",
        }
    }

    /// Install the event tap and begin processing.
    ///
    /// Idempotent: a no-op returning `Ok` when already running. Fails with a
    /// permission error when Input Monitoring is not granted; the caller
    /// should re-invoke after the permission has been granted externally.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("engine_already_running");
            return Ok(());
        }
        let handler = Arc::new(EngineHandler {
            engine: self.clone(),
        });
        match PointerTap::start(handler) {
            Ok(tap) => {
                *self.tap.lock() = Some(tap);
                info!("engine_started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Tear down the tap, cancel both timers, and force-release any active
    /// drag so the OS is never left with a stuck button.
    ///
    /// Idempotent; always leaves the machine `Idle`.
    pub fn stop(&self) {
        let tap = self.tap.lock().take();
        if let Some(mut tap) = tap {
            tap.stop();
        }
        let commands = self.machine.lock().reset();
        self.apply(&commands);
        self.ticker.clear_sync();
        if self.running.swap(false, Ordering::SeqCst) {
            info!("engine_stopped");
        }
    }

    /// Feed one intercepted event through the classifier and the state
    /// machine, returning what the tap should do with it.
    ///
    /// This is the closure boundary installed into the Tap Source; it must
    /// return before the OS delivers the next queued event, so everything in
    /// here is non-blocking apart from the brief machine lock.
    pub fn process_event(&self, event: &PointerEvent) -> Disposition {
        let cfg = self.settings.snapshot();
        let class = self.classifier.classify(event, cfg.device_filter);
        let reaction = self.machine.lock().on_event(event, class, &cfg);
        trace!(
            kind = ?event.kind,
            class = ?class,
            disposition = ?reaction.disposition,
            phase = self.gesture_phase(),
            "event_processed"
        );
        self.apply(&reaction.commands);
        reaction.disposition
    }

    /// Carry out the side effects a transition asked for, in order.
    fn apply(&self, commands: &[Command]) {
        for command in commands {
            match *command {
                Command::ArmDoubleTap { window } => {
                    let this = self.clone();
                    self.ticker
                        .once(DOUBLE_TAP_TIMER, Duration::from_secs_f64(window), move || {
                            this.on_double_tap_expiry();
                        });
                }
                Command::CancelDoubleTap => self.ticker.stop(DOUBLE_TAP_TIMER),
                Command::ArmLift { delay } => {
                    let this = self.clone();
                    self.ticker
                        .every(LIFT_TIMER, Duration::from_secs_f64(delay), move || {
                            this.on_lift_tick(delay);
                        });
                }
                Command::CancelLift => self.ticker.stop(LIFT_TIMER),
                Command::PostPress(loc) => self.relay.press(loc),
                Command::PostRelease(loc) => self.relay.release(loc),
            }
        }
    }

    /// Double-tap window ran out with no confirmation.
    fn on_double_tap_expiry(&self) {
        trace!("double_tap_window_expired");
        self.machine.lock().on_double_tap_expiry();
    }

    /// Lift poll: release the drag once movement has been quiet for the
    /// armed delay.
    fn on_lift_tick(&self, delay: f64) {
        let commands = self
            .machine
            .lock()
            .on_lift_tick(mac_pointer::monotonic_now(), delay);
        if !commands.is_empty() {
            debug!("lift_detected_releasing_drag");
        }
        self.apply(&commands);
    }
}

#[cfg(test)]
mod tests {
    use mac_pointer::{Point, PointerKind, SourceTag, Subtype};
    use relaypointer::RecordingPoster;

    use super::*;

    /// Device query reporting no external mouse.
    struct NoMouse;

    impl DeviceQuery for NoMouse {
        fn external_pointer_present(&self) -> bool {
            false
        }
    }

    fn ev(kind: PointerKind, ts: f64, x: f64, y: f64) -> PointerEvent {
        PointerEvent {
            kind,
            loc: Point::new(x, y),
            ts,
            tag: SourceTag::Real,
            subtype: Subtype::Touch,
        }
    }

    fn test_engine(poster: &Arc<RecordingPoster>, lift_delay: f64) -> Engine {
        Engine::with_parts(
            SettingsSnapshot {
                lift_delay,
                ..Default::default()
            },
            RelayPointer::with_poster(poster.clone()),
            Arc::new(NoMouse),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_tap_drags_then_lift_releases() {
        let poster = Arc::new(RecordingPoster::default());
        let engine = test_engine(&poster, 0.05);

        let t0 = mac_pointer::monotonic_now();
        let d = engine.process_event(&ev(PointerKind::Release, t0, 10.0, 10.0));
        assert_eq!(d, Disposition::PassThrough);
        assert_eq!(engine.gesture_phase(), "awaiting_second_tap");

        let d = engine.process_event(&ev(PointerKind::Press, t0 + 0.01, 12.0, 10.0));
        assert_eq!(d, Disposition::Suppress);
        assert_eq!(engine.gesture_phase(), "dragging");
        assert_eq!(poster.presses(), 1);
        assert_eq!(poster.releases(), 0);

        // No movement: the lift poll releases the drag on its own.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(poster.releases(), 1);
        assert_eq!(poster.presses(), 1);
        assert_eq!(engine.gesture_phase(), "idle");

        // And only once.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(poster.releases(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expiry_timer_returns_machine_to_idle() {
        let poster = Arc::new(RecordingPoster::default());
        let engine = test_engine(&poster, 0.5);
        engine.settings().set_double_tap_window(0.1);

        let t0 = mac_pointer::monotonic_now();
        let _ = engine.process_event(&ev(PointerKind::Release, t0, 10.0, 10.0));
        assert_eq!(engine.gesture_phase(), "awaiting_second_tap");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.gesture_phase(), "idle");
        assert_eq!(poster.presses(), 0);
        assert_eq!(poster.releases(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_releases_active_drag_and_is_idempotent() {
        let poster = Arc::new(RecordingPoster::default());
        let engine = test_engine(&poster, 2.0);

        let t0 = mac_pointer::monotonic_now();
        let _ = engine.process_event(&ev(PointerKind::Release, t0, 10.0, 10.0));
        let _ = engine.process_event(&ev(PointerKind::Press, t0 + 0.01, 12.0, 10.0));
        assert_eq!(engine.gesture_phase(), "dragging");

        engine.stop();
        assert_eq!(engine.gesture_phase(), "idle");
        assert_eq!(poster.releases(), 1);

        // Second stop: no second release, still idle.
        engine.stop();
        assert_eq!(engine.gesture_phase(), "idle");
        assert_eq!(poster.releases(), 1);
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn external_pointer_events_pass_untouched() {
        let poster = Arc::new(RecordingPoster::default());
        let engine = Engine::with_parts(
            SettingsSnapshot::default(),
            RelayPointer::with_poster(poster.clone()),
            Arc::new(ExternalMouse),
        );

        let t0 = mac_pointer::monotonic_now();
        // Ambiguous subtype + attached mouse: never starts a gesture.
        let plain = PointerEvent {
            subtype: Subtype::Default,
            ..ev(PointerKind::Release, t0, 10.0, 10.0)
        };
        assert_eq!(engine.process_event(&plain), Disposition::PassThrough);
        assert_eq!(engine.gesture_phase(), "idle");
        assert_eq!(poster.presses(), 0);
    }

    /// Device query reporting an attached external mouse.
    struct ExternalMouse;

    impl DeviceQuery for ExternalMouse {
        fn external_pointer_present(&self) -> bool {
            true
        }
    }
}
