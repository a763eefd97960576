//! macOS event tap (CoreGraphics) integration for pointer interception.
//!
//! Why we use `core-graphics` for event taps:
//! - Some wrappers expose a Rust callback like `FnMut(..) -> Option<CGEvent>`,
//!   where returning `None` is meant to “swallow” the event. If the wrapper maps
//!   `None` to the original `CGEventRef` (instead of a NULL), the OS still delivers
//!   the click. CoreGraphics only suppresses delivery if the tap returns NULL.
//! - The `core-graphics` crate’s `CGEventTap` uses a `CallbackResult` where `Drop`
//!   maps to a NULL `CGEventRef` at the C boundary, matching CoreGraphics’ contract,
//!   and `Replace` hands a different event back to the OS — which is how a raw
//!   move becomes a synthetic drag without a second round-trip.

use std::{
    ffi::c_void,
    process,
    sync::{
        Arc,
        atomic::{AtomicPtr, Ordering},
    },
};

use core_foundation::{
    base::TCFType,
    mach_port::CFMachPortRef,
    runloop::{CFRunLoop, kCFRunLoopCommonModes},
};
use core_graphics::{
    event::{self as cge, CallbackResult},
    event_source::{CGEventSource, CGEventSourceStateID},
    geometry::CGPoint,
};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{Disposition, EventHandler, Point, PointerEvent, PointerKind, SourceTag, Subtype};

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

// Minimal subset of CGEventField constants used by this module.
const FIELD_MOUSE_EVENT_SUBTYPE: u32 = 7;
const FIELD_EVENT_SOURCE_UNIX_PROCESS_ID: u32 = 41;
const FIELD_EVENT_SOURCE_USER_DATA: u32 = 42;

// NSEventSubtype values surfaced through the mouse-event subtype field.
const SUBTYPE_TABLET_POINT: i64 = 1;
const SUBTYPE_TABLET_PROXIMITY: i64 = 2;
const SUBTYPE_TOUCH: i64 = 3;

// Shared control handle to stop the run loop from other threads.
pub(crate) struct SysControl {
    rl: Mutex<Option<CFRunLoop>>,
}

impl SysControl {
    pub(crate) fn new() -> Self {
        Self {
            rl: Mutex::new(None),
        }
    }

    pub(crate) fn set_rl(&self, rl: CFRunLoop) {
        let mut g = self.rl.lock();
        *g = Some(rl);
    }

    pub(crate) fn stop(&self) {
        let mut g = self.rl.lock();
        if let Some(rl) = g.take() {
            rl.stop();
        }
    }
}

/// Map a tap event type onto the pointer-event model. Non-pointer events
/// (and right/other-button traffic) are outside our interest set.
fn pointer_kind(etype: cge::CGEventType) -> Option<PointerKind> {
    match etype {
        cge::CGEventType::LeftMouseDown => Some(PointerKind::Press),
        cge::CGEventType::LeftMouseUp => Some(PointerKind::Release),
        cge::CGEventType::MouseMoved => Some(PointerKind::Move),
        cge::CGEventType::LeftMouseDragged => Some(PointerKind::Drag),
        _ => None,
    }
}

/// Decode the raw subtype field into the classification marker.
fn subtype_marker(raw: i64) -> Subtype {
    match raw {
        SUBTYPE_TABLET_POINT => Subtype::TabletPoint,
        SUBTYPE_TABLET_PROXIMITY => Subtype::TabletProximity,
        SUBTYPE_TOUCH => Subtype::Touch,
        _ => Subtype::Default,
    }
}

/// Events we posted carry our user-data tag; events from any process with our
/// PID are ours as well (the tag survives most but not all repost paths).
fn source_tag(user_tag: i64, src_pid: u32, self_pid: u32) -> SourceTag {
    if user_tag == eventtag::DRAG_TAG || src_pid == self_pid {
        SourceTag::Synthetic
    } else {
        SourceTag::Real
    }
}

/// Build the synthetic left-drag event used for `Disposition::Replace`.
fn drag_event(loc: Point) -> Option<cge::CGEvent> {
    let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).ok()?;
    let e = cge::CGEvent::new_mouse_event(
        source,
        cge::CGEventType::LeftMouseDragged,
        CGPoint::new(loc.x, loc.y),
        cge::CGMouseButton::Left,
    )
    .ok()?;
    e.set_integer_value_field(FIELD_EVENT_SOURCE_USER_DATA, eventtag::DRAG_TAG);
    Some(e)
}

pub(crate) fn run_event_loop(
    handler: Arc<dyn EventHandler>,
    ready: Sender<crate::Result<()>>,
    ctrl: Arc<SysControl>,
) -> crate::Result<()> {
    // Preflight Input Monitoring permission.
    if !permissions::input_monitoring_ok() {
        warn!("input_monitoring_permission_missing");
        let _ = ready.send(Err(crate::Error::PermissionDenied("Input Monitoring")));
        return Err(crate::Error::PermissionDenied("Input Monitoring"));
    }

    // Capture for re-enabling the tap from inside the closure.
    let tap_port_ptr: Arc<AtomicPtr<c_void>> = Arc::new(AtomicPtr::new(std::ptr::null_mut()));

    debug!("creating_event_tap");
    let tap_port_ptr_cb = tap_port_ptr.clone();
    let self_pid = process::id();
    let tap = match cge::CGEventTap::new(
        cge::CGEventTapLocation::HID,
        cge::CGEventTapPlacement::HeadInsertEventTap,
        cge::CGEventTapOptions::Default,
        vec![
            cge::CGEventType::LeftMouseDown,
            cge::CGEventType::LeftMouseUp,
            cge::CGEventType::MouseMoved,
            cge::CGEventType::LeftMouseDragged,
        ],
        move |_proxy, etype, event| {
            match etype {
                cge::CGEventType::TapDisabledByTimeout
                | cge::CGEventType::TapDisabledByUserInput => {
                    // The OS suspends taps it considers slow; recover
                    // transparently rather than surfacing an error.
                    let p = tap_port_ptr_cb.load(Ordering::SeqCst) as CFMachPortRef;
                    if !p.is_null() {
                        warn!("tap_disabled_by_os_reenabling");
                        unsafe { CGEventTapEnable(p, true) };
                    }
                    return CallbackResult::Keep;
                }
                _ => {}
            }

            let Some(kind) = pointer_kind(etype) else {
                return CallbackResult::Keep;
            };

            let src_pid = event.get_integer_value_field(FIELD_EVENT_SOURCE_UNIX_PROCESS_ID) as u32;
            let user_tag = event.get_integer_value_field(FIELD_EVENT_SOURCE_USER_DATA);
            let loc = event.location();
            let ev = PointerEvent {
                kind,
                loc: Point::new(loc.x, loc.y),
                ts: crate::monotonic_now(),
                tag: source_tag(user_tag, src_pid, self_pid),
                subtype: subtype_marker(
                    event.get_integer_value_field(FIELD_MOUSE_EVENT_SUBTYPE),
                ),
            };

            trace!(
                kind = ?ev.kind,
                x = ev.loc.x,
                y = ev.loc.y,
                tag = ?ev.tag,
                subtype = ?ev.subtype,
                src_pid,
                "tap_event"
            );

            match handler.handle(ev) {
                Disposition::PassThrough => CallbackResult::Keep,
                Disposition::Suppress => {
                    trace!("suppressing_event");
                    CallbackResult::Drop
                }
                Disposition::Replace(out) => match drag_event(out.loc) {
                    Some(replacement) => CallbackResult::Replace(replacement),
                    None => {
                        // Synthesis refused; the handler has already
                        // transitioned, so swallow the original rather than
                        // leaking a raw move into an active drag.
                        warn!("replacement_event_create_failed");
                        CallbackResult::Drop
                    }
                },
            }
        },
    ) {
        Ok(t) => t,
        Err(_) => {
            warn!("event_tap_create_failed");
            let _ = ready.send(Err(crate::Error::EventTapStart));
            return Err(crate::Error::EventTapStart);
        }
    };

    // Share the CFMachPort for re-enabling inside the callback.
    tap_port_ptr.store(
        tap.mach_port().as_concrete_TypeRef() as *mut c_void,
        Ordering::SeqCst,
    );

    // Create a runloop source and start the tap on this thread's runloop.
    let source = match tap.mach_port().create_runloop_source(0) {
        Ok(s) => s,
        Err(_) => {
            warn!("run_loop_source_create_failed");
            let _ = ready.send(Err(crate::Error::EventTapStart));
            return Err(crate::Error::EventTapStart);
        }
    };

    let rl = CFRunLoop::get_current();
    ctrl.set_rl(rl.clone());
    let mode = unsafe { kCFRunLoopCommonModes };
    rl.add_source(&source, mode);

    // Enable the tap and run the loop.
    tap.enable();

    let _ = ready.send(Ok(()));
    debug!("event_tap_started_run_loop");

    CFRunLoop::run_current();

    debug!("event_tap_exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_kind_covers_left_button_traffic() {
        assert_eq!(
            pointer_kind(cge::CGEventType::LeftMouseDown),
            Some(PointerKind::Press)
        );
        assert_eq!(
            pointer_kind(cge::CGEventType::LeftMouseUp),
            Some(PointerKind::Release)
        );
        assert_eq!(
            pointer_kind(cge::CGEventType::MouseMoved),
            Some(PointerKind::Move)
        );
        assert_eq!(
            pointer_kind(cge::CGEventType::LeftMouseDragged),
            Some(PointerKind::Drag)
        );
        assert_eq!(pointer_kind(cge::CGEventType::RightMouseDown), None);
        assert_eq!(pointer_kind(cge::CGEventType::ScrollWheel), None);
    }

    #[test]
    fn subtype_marker_decodes_known_values() {
        assert_eq!(subtype_marker(SUBTYPE_TOUCH), Subtype::Touch);
        assert_eq!(subtype_marker(SUBTYPE_TABLET_POINT), Subtype::TabletPoint);
        assert_eq!(
            subtype_marker(SUBTYPE_TABLET_PROXIMITY),
            Subtype::TabletProximity
        );
        assert_eq!(subtype_marker(0), Subtype::Default);
        assert_eq!(subtype_marker(99), Subtype::Default);
    }

    #[test]
    fn source_tag_recognizes_own_output() {
        assert_eq!(
            source_tag(eventtag::DRAG_TAG, 999, 1234),
            SourceTag::Synthetic
        );
        assert_eq!(source_tag(0, 1234, 1234), SourceTag::Synthetic);
        assert_eq!(source_tag(0, 999, 1234), SourceTag::Real);
    }
}
