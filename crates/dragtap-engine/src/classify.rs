//! Event-origin classification: trackpad vs. external pointing device.

use std::sync::Arc;

use mac_pointer::{DeviceQuery, PointerEvent, Subtype};
use tracing::trace;

use crate::settings::DeviceFilter;

/// Classification outcome for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Trackpad-like origin; eligible to start gestures.
    Trackpad,
    /// External pointing device; never starts a gesture.
    ExternalPointer,
}

/// Classifies each event's origin.
///
/// Touch and tablet subtypes are definite trackpad markers. Ambiguous
/// subtypes fall back to a live attached-device query, re-evaluated per event
/// so attach/detach is observed immediately; nothing is cached across calls.
/// The bias is conservative: with an external mouse present, an ambiguous
/// event is treated as mouse input and the feature stays inactive.
#[derive(Clone)]
pub struct DeviceClassifier {
    query: Arc<dyn DeviceQuery>,
}

impl DeviceClassifier {
    /// Build a classifier over the given attached-device query.
    pub fn new(query: Arc<dyn DeviceQuery>) -> Self {
        Self { query }
    }

    /// Classify one event under the given filter mode.
    pub fn classify(&self, event: &PointerEvent, filter: DeviceFilter) -> DeviceClass {
        if filter == DeviceFilter::Any {
            return DeviceClass::Trackpad;
        }
        match event.subtype {
            Subtype::Touch | Subtype::TabletPoint | Subtype::TabletProximity => {
                DeviceClass::Trackpad
            }
            Subtype::Default => {
                if self.query.external_pointer_present() {
                    trace!("ambiguous_subtype_with_external_pointer");
                    DeviceClass::ExternalPointer
                } else {
                    DeviceClass::Trackpad
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mac_pointer::{Point, PointerKind, SourceTag};

    use super::*;

    /// Query with a fixed answer.
    struct Fixed(bool);

    impl DeviceQuery for Fixed {
        fn external_pointer_present(&self) -> bool {
            self.0
        }
    }

    fn event(subtype: Subtype) -> PointerEvent {
        PointerEvent {
            kind: PointerKind::Press,
            loc: Point::new(0.0, 0.0),
            ts: 0.0,
            tag: SourceTag::Real,
            subtype,
        }
    }

    #[test]
    fn any_filter_short_circuits() {
        let c = DeviceClassifier::new(Arc::new(Fixed(true)));
        assert_eq!(
            c.classify(&event(Subtype::Default), DeviceFilter::Any),
            DeviceClass::Trackpad
        );
    }

    #[test]
    fn touch_and_tablet_subtypes_are_definite() {
        let c = DeviceClassifier::new(Arc::new(Fixed(true)));
        for subtype in [Subtype::Touch, Subtype::TabletPoint, Subtype::TabletProximity] {
            assert_eq!(
                c.classify(&event(subtype), DeviceFilter::TrackpadOnly),
                DeviceClass::Trackpad
            );
        }
    }

    #[test]
    fn ambiguous_subtype_defers_to_device_query() {
        let with_mouse = DeviceClassifier::new(Arc::new(Fixed(true)));
        assert_eq!(
            with_mouse.classify(&event(Subtype::Default), DeviceFilter::TrackpadOnly),
            DeviceClass::ExternalPointer
        );
        let without = DeviceClassifier::new(Arc::new(Fixed(false)));
        assert_eq!(
            without.classify(&event(Subtype::Default), DeviceFilter::TrackpadOnly),
            DeviceClass::Trackpad
        );
    }
}
