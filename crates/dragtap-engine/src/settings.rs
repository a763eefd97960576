//! Tunable runtime settings, readable lock-free from the event path.
//!
//! The external settings surface may mutate any field at any time. Each field
//! is an independent atomic: a read sees a coherent value for that field, and
//! no transaction spans more than one field. The event path takes a
//! [`SettingsSnapshot`] per decision point.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Inclusive bounds for the double-tap confirmation window, seconds.
pub const WINDOW_RANGE: (f64, f64) = (0.1, 1.0);
/// Inclusive bounds for the finger-lift release delay, seconds.
pub const LIFT_RANGE: (f64, f64) = (0.05, 2.0);

/// Default double-tap window, seconds.
const DEFAULT_WINDOW: f64 = 0.3;
/// Default lift delay, seconds.
const DEFAULT_LIFT: f64 = 0.25;

/// How an active drag is ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// A further tap while dragging drops immediately.
    TapAgain,
    /// The drag drops after the finger has been lifted for the configured
    /// delay.
    DelayOnLift,
}

/// Which devices may start a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFilter {
    /// Treat every pointer event as eligible.
    Any,
    /// Only trackpad-originated events start gestures; external mice pass
    /// through untouched.
    TrackpadOnly,
}

/// One coherent read of every field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Master switch; when off, everything passes through untouched.
    pub enabled: bool,
    /// Seconds allowed between the first tap's lift and its confirmation.
    pub double_tap_window: f64,
    /// Seconds without movement after which an active drag is released.
    pub lift_delay: f64,
    /// How an active drag is ended.
    pub stop_mode: StopMode,
    /// Which devices may start a gesture.
    pub device_filter: DeviceFilter,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            enabled: true,
            double_tap_window: DEFAULT_WINDOW,
            lift_delay: DEFAULT_LIFT,
            stop_mode: StopMode::DelayOnLift,
            device_filter: DeviceFilter::TrackpadOnly,
        }
    }
}

/// Shared settings handle.
///
/// Setters clamp durations to their valid range; readers never block.
#[derive(Debug)]
pub struct Settings {
    /// Master switch.
    enabled: AtomicBool,
    /// Double-tap window, f64 bits.
    window_bits: AtomicU64,
    /// Lift delay, f64 bits.
    lift_bits: AtomicU64,
    /// [`StopMode`] discriminant.
    stop_mode: AtomicU8,
    /// [`DeviceFilter`] discriminant.
    device_filter: AtomicU8,
}

/// Discriminant for [`StopMode::TapAgain`].
const STOP_TAP_AGAIN: u8 = 0;
/// Discriminant for [`StopMode::DelayOnLift`].
const STOP_DELAY_ON_LIFT: u8 = 1;
/// Discriminant for [`DeviceFilter::Any`].
const FILTER_ANY: u8 = 0;
/// Discriminant for [`DeviceFilter::TrackpadOnly`].
const FILTER_TRACKPAD_ONLY: u8 = 1;

fn stop_mode_to_u8(mode: StopMode) -> u8 {
    match mode {
        StopMode::TapAgain => STOP_TAP_AGAIN,
        StopMode::DelayOnLift => STOP_DELAY_ON_LIFT,
    }
}

fn stop_mode_from_u8(raw: u8) -> StopMode {
    if raw == STOP_TAP_AGAIN {
        StopMode::TapAgain
    } else {
        StopMode::DelayOnLift
    }
}

fn filter_to_u8(filter: DeviceFilter) -> u8 {
    match filter {
        DeviceFilter::Any => FILTER_ANY,
        DeviceFilter::TrackpadOnly => FILTER_TRACKPAD_ONLY,
    }
}

fn filter_from_u8(raw: u8) -> DeviceFilter {
    if raw == FILTER_ANY {
        DeviceFilter::Any
    } else {
        DeviceFilter::TrackpadOnly
    }
}

impl Settings {
    /// Create a handle seeded from `initial`, with durations clamped.
    pub fn new(initial: SettingsSnapshot) -> Self {
        let s = Self {
            enabled: AtomicBool::new(initial.enabled),
            window_bits: AtomicU64::new(0),
            lift_bits: AtomicU64::new(0),
            stop_mode: AtomicU8::new(stop_mode_to_u8(initial.stop_mode)),
            device_filter: AtomicU8::new(filter_to_u8(initial.device_filter)),
        };
        s.set_double_tap_window(initial.double_tap_window);
        s.set_lift_delay(initial.lift_delay);
        s
    }

    /// Read every field once.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            enabled: self.enabled(),
            double_tap_window: self.double_tap_window(),
            lift_delay: self.lift_delay(),
            stop_mode: self.stop_mode(),
            device_filter: self.device_filter(),
        }
    }

    /// Master switch state.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the master switch.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }

    /// Current double-tap window, seconds.
    pub fn double_tap_window(&self) -> f64 {
        f64::from_bits(self.window_bits.load(Ordering::SeqCst))
    }

    /// Set the double-tap window, clamped to [`WINDOW_RANGE`].
    pub fn set_double_tap_window(&self, secs: f64) {
        let v = secs.clamp(WINDOW_RANGE.0, WINDOW_RANGE.1);
        self.window_bits.store(v.to_bits(), Ordering::SeqCst);
    }

    /// Current lift delay, seconds.
    pub fn lift_delay(&self) -> f64 {
        f64::from_bits(self.lift_bits.load(Ordering::SeqCst))
    }

    /// Set the lift delay, clamped to [`LIFT_RANGE`].
    pub fn set_lift_delay(&self, secs: f64) {
        let v = secs.clamp(LIFT_RANGE.0, LIFT_RANGE.1);
        self.lift_bits.store(v.to_bits(), Ordering::SeqCst);
    }

    /// Current stop mode.
    pub fn stop_mode(&self) -> StopMode {
        stop_mode_from_u8(self.stop_mode.load(Ordering::SeqCst))
    }

    /// Set the stop mode.
    pub fn set_stop_mode(&self, mode: StopMode) {
        self.stop_mode.store(stop_mode_to_u8(mode), Ordering::SeqCst);
    }

    /// Current device filter.
    pub fn device_filter(&self) -> DeviceFilter {
        filter_from_u8(self.device_filter.load(Ordering::SeqCst))
    }

    /// Set the device filter.
    pub fn set_device_filter(&self, filter: DeviceFilter) {
        self.device_filter
            .store(filter_to_u8(filter), Ordering::SeqCst);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(SettingsSnapshot::default())
    }
}
