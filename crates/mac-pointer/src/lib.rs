//! macOS pointer-event interception for dragtap.
//!
//! This crate owns the OS-facing half of event handling: it installs a
//! CoreGraphics event tap over the left-button pointer events, converts each
//! `CGEvent` into a plain [`PointerEvent`], and forwards it through an
//! installed [`EventHandler`]. The handler's [`Disposition`] decides whether
//! the original event is delivered, swallowed, or replaced with a synthetic
//! one. The tap itself knows nothing about gestures; all decision logic lives
//! behind the handler boundary.
//!
//! It also answers the live "is an external mouse attached?" question via the
//! IOKit registry ([`DeviceQuery`]), which the classifier re-asks per event.
#![warn(unsafe_op_in_unsafe_fn)]

use std::{
    sync::{Arc, OnceLock},
    thread,
    time::Instant,
};

use tracing::debug;

mod device;
mod error;
mod sys;

pub use device::{DeviceQuery, SystemDeviceQuery};
pub use error::{Error, Result};

/// A location in global display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal coordinate, points.
    pub x: f64,
    /// Vertical coordinate, points.
    pub y: f64,
}

impl Point {
    /// Construct a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn dist(self, other: Self) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// The kind of pointer transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// Button (or tap-to-click surrogate) went down.
    Press,
    /// Button went up.
    Release,
    /// Motion with no button held.
    Move,
    /// Motion with the button held.
    Drag,
}

/// Whether an event originated from real hardware input or from this
/// process's own injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// Delivered by the OS on behalf of a physical device.
    Real,
    /// Posted by this process (recognized by tag or source PID).
    Synthetic,
}

/// Event-subtype marker carried in the mouse-event subtype field.
///
/// Touch and tablet subtypes are definite "not a plain mouse" markers;
/// `Default` is ambiguous and needs a live device query to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    /// Plain mouse event with no extra provenance.
    Default,
    /// Tablet pointer data attached.
    TabletPoint,
    /// Tablet proximity data attached.
    TabletProximity,
    /// Generated by a touch surface (trackpad tap-to-click).
    Touch,
}

/// One intercepted pointer event, stripped down to what the gesture engine
/// needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// What happened.
    pub kind: PointerKind,
    /// Where it happened, global display coordinates.
    pub loc: Point,
    /// Monotonic timestamp in seconds; see [`monotonic_now`].
    pub ts: f64,
    /// Real hardware input or our own injection.
    pub tag: SourceTag,
    /// Subtype marker used by device classification.
    pub subtype: Subtype,
}

/// What the tap should do with the event just delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Deliver the original event unchanged.
    PassThrough,
    /// Swallow the event; nothing reaches the foreground app.
    Suppress,
    /// Deliver a synthetic replacement instead of the original.
    Replace(PointerEvent),
}

/// Per-event handler installed into the tap.
///
/// Called on the tap thread for every intercepted event; the returned
/// disposition must be produced synchronously, before the OS delivers the
/// next queued event, so implementations must not block.
pub trait EventHandler: Send + Sync {
    /// Decide what happens to `event`.
    fn handle(&self, event: PointerEvent) -> Disposition;
}

/// Process-wide monotonic clock epoch.
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed on the process-wide monotonic clock.
///
/// All [`PointerEvent::ts`] values and timer comparisons use this source, so
/// elapsed-time arithmetic is immune to wall-clock adjustments.
pub fn monotonic_now() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Handle to a running pointer tap.
///
/// The tap runs a CFRunLoop on its own thread; dropping the handle (or
/// calling [`PointerTap::stop`]) stops the loop and joins the thread.
pub struct PointerTap {
    ctrl: Arc<sys::SysControl>,
    join: Option<thread::JoinHandle<Result<()>>>,
}

impl PointerTap {
    /// Install the event tap and start processing.
    ///
    /// Blocks until the tap thread reports that the tap is live, so a
    /// returned `Ok` means events are flowing. Fails with
    /// [`Error::PermissionDenied`] when Input Monitoring is not granted and
    /// [`Error::EventTapStart`] when the OS refuses the tap for other
    /// reasons.
    pub fn start(handler: Arc<dyn EventHandler>) -> Result<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let ctrl = Arc::new(sys::SysControl::new());
        let ctrl_thread = ctrl.clone();
        let join = thread::Builder::new()
            .name("pointer-tap".into())
            .spawn(move || sys::run_event_loop(handler, ready_tx, ctrl_thread))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                ctrl,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(Error::EventTapStart)
            }
        }
    }

    /// Stop the run loop and join the tap thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.ctrl.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
            debug!("pointer_tap_stopped");
        }
    }
}

impl Drop for PointerTap {
    fn drop(&mut self) {
        self.stop();
    }
}
