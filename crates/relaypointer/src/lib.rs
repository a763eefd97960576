//! Posts synthetic pointer press/release events into the macOS event stream.
//!
//! A `RelayPointer` posts LeftMouseDown/LeftMouseUp events at a given global
//! location. Every injected event carries the process tag so the tap layer
//! recognizes its own output and the gesture engine's re-entry guard can wave
//! it through instead of treating it as a fresh tap.
//!
//! Posting is optimistic: a failed injection is logged and swallowed, never
//! returned to the caller. The gesture engine has already transitioned by the
//! time the post happens, and retrying would desynchronize it from real
//! input.
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]
use std::sync::Arc;

use core_graphics::{
    event as cge,
    event_source::{CGEventSource, CGEventSourceStateID},
    geometry::CGPoint,
};
use mac_pointer::Point;
use tracing::{info, trace, warn};

mod error;

pub use error::{Error, Result};

/// Posts one synthetic event; the seam between the relay and CoreGraphics.
pub trait Poster: Send + Sync {
    /// Post a left-button press at `loc`.
    fn post_press(&self, loc: Point) -> Result<()>;
    /// Post a left-button release at `loc`.
    fn post_release(&self, loc: Point) -> Result<()>;
}

/// Poster backed by CoreGraphics event injection.
struct MacPoster;

impl MacPoster {
    /// Build a tagged left-button event of the given type at `loc`.
    fn build_event(&self, etype: cge::CGEventType, loc: Point) -> Result<cge::CGEvent> {
        // Create event source inline - it's lightweight
        let source = match CGEventSource::new(CGEventSourceStateID::HIDSystemState) {
            Ok(s) => s,
            Err(_) => {
                if !permissions::accessibility_ok() {
                    warn!("accessibility_permission_missing_for_event_source");
                    return Err(Error::PermissionDenied("Accessibility"));
                }
                return Err(Error::EventSource);
            }
        };
        let e = match cge::CGEvent::new_mouse_event(
            source,
            etype,
            CGPoint::new(loc.x, loc.y),
            cge::CGMouseButton::Left,
        ) {
            Ok(e) => e,
            Err(_) => {
                if !permissions::accessibility_ok() {
                    warn!("accessibility_permission_missing_for_event_create");
                    return Err(Error::PermissionDenied("Accessibility"));
                }
                return Err(Error::EventCreate);
            }
        };
        // Tag all injected events so the tap can recognize its own output.
        e.set_integer_value_field(cge::EventField::EVENT_SOURCE_USER_DATA, eventtag::DRAG_TAG);
        Ok(e)
    }
}

impl Poster for MacPoster {
    fn post_press(&self, loc: Point) -> Result<()> {
        trace!(x = loc.x, y = loc.y, "post_press");
        let e = self.build_event(cge::CGEventType::LeftMouseDown, loc)?;
        e.post(cge::CGEventTapLocation::HID);
        info!(x = loc.x, y = loc.y, "relayed_press");
        Ok(())
    }

    fn post_release(&self, loc: Point) -> Result<()> {
        trace!(x = loc.x, y = loc.y, "post_release");
        let e = self.build_event(cge::CGEventType::LeftMouseUp, loc)?;
        e.post(cge::CGEventTapLocation::HID);
        info!(x = loc.x, y = loc.y, "relayed_release");
        Ok(())
    }
}

/// Stateless relayer that injects synthetic press/release events at the HID
/// tap location, tagged as this process's own output.
#[derive(Clone)]
pub struct RelayPointer {
    poster: Arc<dyn Poster>,
}

impl Default for RelayPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayPointer {
    /// Create a relayer backed by CoreGraphics injection.
    pub fn new() -> Self {
        Self {
            poster: Arc::new(MacPoster),
        }
    }

    /// Create a relayer with an explicit poster (tests and tools).
    #[cfg(any(test, feature = "test-utils"))]
    pub fn with_poster(poster: Arc<dyn Poster>) -> Self {
        Self { poster }
    }

    /// Inject a press at `loc`. Failures are logged, never propagated.
    pub fn press(&self, loc: Point) {
        if let Err(e) = self.poster.post_press(loc) {
            warn!(error = %e, "synthetic_press_failed");
        }
    }

    /// Inject a release at `loc`. Failures are logged, never propagated.
    pub fn release(&self, loc: Point) {
        if let Err(e) = self.poster.post_release(loc) {
            warn!(error = %e, "synthetic_release_failed");
        }
    }
}

/// Poster that records every post; lets tests assert on the synthetic event
/// stream without touching the OS.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct RecordingPoster {
    /// Recorded posts in order: `(is_press, location)`.
    log: parking_lot::Mutex<Vec<(bool, Point)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingPoster {
    /// Number of presses recorded so far.
    pub fn presses(&self) -> usize {
        self.log.lock().iter().filter(|(down, _)| *down).count()
    }

    /// Number of releases recorded so far.
    pub fn releases(&self) -> usize {
        self.log.lock().iter().filter(|(down, _)| !*down).count()
    }

    /// Full post log in order.
    pub fn log(&self) -> Vec<(bool, Point)> {
        self.log.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Poster for RecordingPoster {
    fn post_press(&self, loc: Point) -> Result<()> {
        self.log.lock().push((true, loc));
        Ok(())
    }

    fn post_release(&self, loc: Point) -> Result<()> {
        self.log.lock().push((false, loc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FailingPoster {
        attempts: AtomicUsize,
    }

    impl Poster for FailingPoster {
        fn post_press(&self, _loc: Point) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::EventCreate)
        }
        fn post_release(&self, _loc: Point) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::EventSource)
        }
    }

    #[test]
    fn press_then_release_is_recorded_in_order() {
        let poster = Arc::new(RecordingPoster::default());
        let relay = RelayPointer::with_poster(poster.clone());
        relay.press(Point::new(10.0, 20.0));
        relay.release(Point::new(11.0, 21.0));
        assert_eq!(poster.presses(), 1);
        assert_eq!(poster.releases(), 1);
        let log = poster.log();
        assert!(log[0].0);
        assert!(!log[1].0);
        assert_eq!(log[1].1, Point::new(11.0, 21.0));
    }

    #[test]
    fn post_failures_are_swallowed() {
        let poster = Arc::new(FailingPoster {
            attempts: AtomicUsize::new(0),
        });
        let relay = RelayPointer::with_poster(poster.clone());
        // Neither call panics or returns an error; both attempts happen.
        relay.press(Point::new(0.0, 0.0));
        relay.release(Point::new(0.0, 0.0));
        assert_eq!(poster.attempts.load(Ordering::SeqCst), 2);
    }
}
