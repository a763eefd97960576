//! Gesture state machine for double-tap dragging.
//!
//! The machine is pure: it consumes pointer events (already classified by
//! origin) and timer firings, mutates only its own state, and describes every
//! side effect as a [`Command`] for the engine to interpret. That keeps the
//! whole transition table testable with literal timestamps, no clocks or OS
//! plumbing involved.

use mac_pointer::{Disposition, Point, PointerEvent, PointerKind, SourceTag};

use crate::{
    classify::DeviceClass,
    settings::{SettingsSnapshot, StopMode},
};

/// Inclusive distance bound for a second tap to count as "same spot".
pub const MAX_TAP_DISTANCE: f64 = 50.0;
/// Movement beyond this distance while awaiting confirmation starts a drag.
pub const MOVE_START_THRESHOLD: f64 = 5.0;

/// Current interaction state. Exactly one variant is active at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    /// No in-progress gesture.
    Idle,
    /// One completed tap observed; waiting for confirmation within the
    /// configured window.
    AwaitingSecondTap {
        /// When the first tap's lift was seen.
        first_tap_at: f64,
        /// Where the first tap's lift was seen.
        first_tap_loc: Point,
    },
    /// An active synthetic drag.
    Dragging {
        /// Timestamp of the last qualifying movement; consulted by lift
        /// detection.
        last_move_at: f64,
        /// Location of the last qualifying movement.
        last_loc: Point,
        /// Where the drag began.
        drag_start: Point,
    },
}

/// A side effect requested by a transition, interpreted by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Arm (or replace) the one-shot double-tap expiry timer.
    ArmDoubleTap {
        /// Window length, seconds, read from config at arm time.
        window: f64,
    },
    /// Cancel the double-tap timer.
    CancelDoubleTap,
    /// Arm (or replace) the periodic lift-detection timer.
    ArmLift {
        /// Poll period, seconds, read from config at arm time.
        delay: f64,
    },
    /// Cancel the lift timer.
    CancelLift,
    /// Inject a synthetic press at the given location.
    PostPress(Point),
    /// Inject a synthetic release at the given location.
    PostRelease(Point),
}

/// Outcome of feeding one event to the machine: what the tap should do with
/// the event, plus the side effects to carry out before the next event.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    /// What the tap does with the original event.
    pub disposition: Disposition,
    /// Side effects, executed in order.
    pub commands: Vec<Command>,
}

impl Reaction {
    /// Pass the event through with no side effects.
    fn pass() -> Self {
        Self {
            disposition: Disposition::PassThrough,
            commands: Vec::new(),
        }
    }

    fn new(disposition: Disposition, commands: Vec<Command>) -> Self {
        Self {
            disposition,
            commands,
        }
    }
}

/// The gesture state machine. One instance lives for the process lifetime of
/// the engine; only the transition functions below ever mutate it.
#[derive(Debug)]
pub struct Machine {
    /// Active state.
    state: GestureState,
    /// One-shot guard: the next synthetic press is our own injection.
    ignore_next_press: bool,
    /// One-shot guard: the next synthetic release is our own injection.
    ignore_next_release: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// A fresh machine in `Idle`.
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
            ignore_next_press: false,
            ignore_next_release: false,
        }
    }

    /// The active state.
    pub fn state(&self) -> GestureState {
        self.state
    }

    /// True when anything (state or a pending injection guard) is live.
    fn engaged(&self) -> bool {
        self.state != GestureState::Idle || self.ignore_next_press || self.ignore_next_release
    }

    /// Feed one classified event through the transition table.
    pub fn on_event(
        &mut self,
        ev: &PointerEvent,
        class: DeviceClass,
        cfg: &SettingsSnapshot,
    ) -> Reaction {
        if !cfg.enabled {
            // Externally disabled: tear down any live gesture, then stay out
            // of the way entirely.
            if self.engaged() {
                return Reaction::new(Disposition::PassThrough, self.reset());
            }
            return Reaction::pass();
        }

        if ev.tag == SourceTag::Synthetic {
            return self.on_synthetic(ev);
        }

        if class == DeviceClass::ExternalPointer
            && !matches!(self.state, GestureState::Dragging { .. })
        {
            return Reaction::pass();
        }

        match self.state {
            GestureState::Idle => self.on_idle(ev, cfg),
            GestureState::AwaitingSecondTap {
                first_tap_at,
                first_tap_loc,
            } => self.on_awaiting(ev, cfg, first_tap_at, first_tap_loc),
            GestureState::Dragging { drag_start, .. } => self.on_dragging(ev, cfg, drag_start),
        }
    }

    /// Our own injected events come back through the tap. Consume the
    /// matching one-shot guard; on a mismatch, fail open by clearing the
    /// guards and letting the event continue untouched.
    fn on_synthetic(&mut self, ev: &PointerEvent) -> Reaction {
        match ev.kind {
            PointerKind::Press if self.ignore_next_press => {
                self.ignore_next_press = false;
                return Reaction::pass();
            }
            PointerKind::Release if self.ignore_next_release => {
                self.ignore_next_release = false;
                return Reaction::pass();
            }
            _ => {}
        }
        if self.ignore_next_press || self.ignore_next_release {
            self.ignore_next_press = false;
            self.ignore_next_release = false;
        }
        Reaction::pass()
    }

    /// Transitions out of `Idle`.
    fn on_idle(&mut self, ev: &PointerEvent, cfg: &SettingsSnapshot) -> Reaction {
        match ev.kind {
            PointerKind::Release => {
                // A lift completes a tap; open the confirmation window.
                self.state = GestureState::AwaitingSecondTap {
                    first_tap_at: ev.ts,
                    first_tap_loc: ev.loc,
                };
                Reaction::new(
                    Disposition::PassThrough,
                    vec![Command::ArmDoubleTap {
                        window: cfg.double_tap_window,
                    }],
                )
            }
            _ => Reaction::pass(),
        }
    }

    /// Transitions out of `AwaitingSecondTap`.
    fn on_awaiting(
        &mut self,
        ev: &PointerEvent,
        cfg: &SettingsSnapshot,
        first_tap_at: f64,
        first_tap_loc: Point,
    ) -> Reaction {
        let in_window = ev.ts - first_tap_at <= cfg.double_tap_window;
        match ev.kind {
            PointerKind::Press => {
                if in_window && ev.loc.dist(first_tap_loc) <= MAX_TAP_DISTANCE {
                    // Second tap confirms: swallow the real press and stand
                    // up a synthetic drag in its place.
                    self.state = GestureState::Dragging {
                        last_move_at: ev.ts,
                        last_loc: ev.loc,
                        drag_start: ev.loc,
                    };
                    self.ignore_next_press = true;
                    Reaction::new(
                        Disposition::Suppress,
                        vec![
                            Command::CancelDoubleTap,
                            Command::PostPress(ev.loc),
                            Command::ArmLift {
                                delay: cfg.lift_delay,
                            },
                        ],
                    )
                } else {
                    // Too late or too far: this is an ordinary click.
                    self.state = GestureState::Idle;
                    Reaction::new(Disposition::PassThrough, vec![Command::CancelDoubleTap])
                }
            }
            PointerKind::Move => {
                if in_window && ev.loc.dist(first_tap_loc) > MOVE_START_THRESHOLD {
                    // Tap-then-slide: start dragging from the first tap's
                    // location and convert this move into a drag.
                    self.state = GestureState::Dragging {
                        last_move_at: ev.ts,
                        last_loc: ev.loc,
                        drag_start: first_tap_loc,
                    };
                    self.ignore_next_press = true;
                    Reaction::new(
                        Disposition::Replace(synthetic_drag(ev)),
                        vec![
                            Command::CancelDoubleTap,
                            Command::PostPress(ev.loc),
                            Command::ArmLift {
                                delay: cfg.lift_delay,
                            },
                        ],
                    )
                } else {
                    Reaction::pass()
                }
            }
            _ => Reaction::pass(),
        }
    }

    /// Transitions out of `Dragging`.
    fn on_dragging(&mut self, ev: &PointerEvent, cfg: &SettingsSnapshot, drag_start: Point) -> Reaction {
        match ev.kind {
            PointerKind::Move => {
                self.state = GestureState::Dragging {
                    last_move_at: ev.ts,
                    last_loc: ev.loc,
                    drag_start,
                };
                Reaction::new(Disposition::Replace(synthetic_drag(ev)), Vec::new())
            }
            PointerKind::Drag => {
                self.state = GestureState::Dragging {
                    last_move_at: ev.ts,
                    last_loc: ev.loc,
                    drag_start,
                };
                Reaction::pass()
            }
            PointerKind::Press => match cfg.stop_mode {
                StopMode::TapAgain => {
                    // Tap while dragging drops immediately.
                    self.state = GestureState::Idle;
                    self.ignore_next_release = true;
                    Reaction::new(
                        Disposition::Suppress,
                        vec![Command::PostRelease(ev.loc), Command::CancelLift],
                    )
                }
                StopMode::DelayOnLift => Reaction::pass(),
            },
            PointerKind::Release => {
                // The drag's release is issued only by this system; a real
                // lift mid-drag is swallowed so the OS button state stays
                // consistent with the synthetic press.
                Reaction::new(Disposition::Suppress, Vec::new())
            }
        }
    }

    /// Double-tap expiry fired. Stale firings (state moved on) are no-ops.
    pub fn on_double_tap_expiry(&mut self) {
        if let GestureState::AwaitingSecondTap { .. } = self.state {
            self.state = GestureState::Idle;
        }
    }

    /// Lift-detection poll fired. `lift_delay` is the value the timer was
    /// armed with, so a concurrent config change never alters an in-flight
    /// wait. Stale firings are no-ops.
    pub fn on_lift_tick(&mut self, now: f64, lift_delay: f64) -> Vec<Command> {
        if let GestureState::Dragging {
            last_move_at,
            last_loc,
            ..
        } = self.state
        {
            if now - last_move_at >= lift_delay {
                self.state = GestureState::Idle;
                self.ignore_next_release = true;
                return vec![Command::PostRelease(last_loc), Command::CancelLift];
            }
        }
        Vec::new()
    }

    /// Cancel all timers and force-release any active drag. Used on stop and
    /// on the external-disable path; always leaves `Idle`.
    pub fn reset(&mut self) -> Vec<Command> {
        let mut commands = vec![Command::CancelDoubleTap, Command::CancelLift];
        self.ignore_next_press = false;
        self.ignore_next_release = false;
        if let GestureState::Dragging { last_loc, .. } = self.state {
            self.ignore_next_release = true;
            commands.push(Command::PostRelease(last_loc));
        }
        self.state = GestureState::Idle;
        commands
    }

    /// Injection-guard state, for tests.
    #[cfg(test)]
    fn guards(&self) -> (bool, bool) {
        (self.ignore_next_press, self.ignore_next_release)
    }
}

/// The replacement event standing in for a raw move during a drag.
fn synthetic_drag(ev: &PointerEvent) -> PointerEvent {
    PointerEvent {
        kind: PointerKind::Drag,
        loc: ev.loc,
        ts: ev.ts,
        tag: SourceTag::Synthetic,
        subtype: ev.subtype,
    }
}

#[cfg(test)]
mod tests {
    use mac_pointer::Subtype;

    use super::*;
    use crate::settings::DeviceFilter;

    fn cfg() -> SettingsSnapshot {
        SettingsSnapshot {
            enabled: true,
            double_tap_window: 0.5,
            lift_delay: 0.15,
            stop_mode: StopMode::DelayOnLift,
            device_filter: DeviceFilter::TrackpadOnly,
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

    fn synth(kind: PointerKind, ts: f64) -> PointerEvent {
        PointerEvent {
            tag: SourceTag::Synthetic,
            ..ev(kind, ts, 0.0, 0.0)
        }
    }

    fn presses(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, Command::PostPress(_)))
            .count()
    }

    fn releases(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, Command::PostRelease(_)))
            .count()
    }

    /// Drive a machine into `Dragging` via a double tap ending at `ts`.
    fn dragging_machine(ts: f64) -> Machine {
        let mut m = Machine::new();
        let r = m.on_event(
            &ev(PointerKind::Release, ts - 0.1, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        let r = m.on_event(
            &ev(PointerKind::Press, ts, 12.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::Suppress);
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
        m
    }

    #[test]
    fn idle_press_passes_through() {
        let mut m = Machine::new();
        let r = m.on_event(
            &ev(PointerKind::Press, 0.0, 5.0, 5.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert!(r.commands.is_empty());
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn release_opens_window_with_config_value() {
        let mut m = Machine::new();
        let mut config = cfg();
        config.double_tap_window = 0.42;
        let r = m.on_event(
            &ev(PointerKind::Release, 1.0, 5.0, 5.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(r.commands, vec![Command::ArmDoubleTap { window: 0.42 }]);
        assert!(matches!(m.state(), GestureState::AwaitingSecondTap { .. }));
    }

    #[test]
    fn double_tap_within_window_starts_drag() {
        // Release at t=0,(10,10); press at t=0.3,(15,12); window 0.5.
        let mut m = Machine::new();
        let r = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        let r = m.on_event(
            &ev(PointerKind::Press, 0.3, 15.0, 12.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::Suppress);
        assert_eq!(presses(&r.commands), 1);
        assert!(r.commands.contains(&Command::CancelDoubleTap));
        assert!(r.commands.contains(&Command::ArmLift { delay: 0.15 }));
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
        assert_eq!(m.guards(), (true, false));
    }

    #[test]
    fn late_second_tap_stays_an_ordinary_click() {
        // Release at t=0; press at t=0.6; window 0.5.
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        let r = m.on_event(
            &ev(PointerKind::Press, 0.6, 15.0, 12.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(presses(&r.commands), 0);
        assert_eq!(r.commands, vec![Command::CancelDoubleTap]);
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn distant_second_tap_stays_an_ordinary_click() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        // 51 units away: outside the inclusive 50-unit bound.
        let r = m.on_event(
            &ev(PointerKind::Press, 0.2, 61.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn tap_distance_bound_is_inclusive() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        // Exactly 50 units away still confirms.
        let r = m.on_event(
            &ev(PointerKind::Press, 0.2, 60.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::Suppress);
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn window_bound_is_inclusive() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        let r = m.on_event(
            &ev(PointerKind::Press, 0.5, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::Suppress);
    }

    #[test]
    fn slide_after_tap_starts_drag_from_first_location() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        let r = m.on_event(
            &ev(PointerKind::Move, 0.2, 20.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        match &r.disposition {
            Disposition::Replace(out) => {
                assert_eq!(out.kind, PointerKind::Drag);
                assert_eq!(out.tag, SourceTag::Synthetic);
                assert_eq!(out.loc, Point::new(20.0, 10.0));
            }
            other => panic!("expected Replace, got {other:?}"),
        }
        assert_eq!(presses(&r.commands), 1);
        match m.state() {
            GestureState::Dragging { drag_start, .. } => {
                assert_eq!(drag_start, Point::new(10.0, 10.0));
            }
            other => panic!("expected Dragging, got {other:?}"),
        }
    }

    #[test]
    fn jitter_below_threshold_keeps_waiting() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        // 5 units is inside the inclusive "not yet a drag" bound.
        let r = m.on_event(
            &ev(PointerKind::Move, 0.2, 15.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert!(r.commands.is_empty());
        assert!(matches!(m.state(), GestureState::AwaitingSecondTap { .. }));
    }

    #[test]
    fn expiry_returns_to_idle_without_synthesis() {
        let mut m = Machine::new();
        let _ = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        m.on_double_tap_expiry();
        assert_eq!(m.state(), GestureState::Idle);
        // A late second release is just another tap completion.
        let r = m.on_event(
            &ev(PointerKind::Release, 0.6, 15.0, 12.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(presses(&r.commands) + releases(&r.commands), 0);
        m.on_double_tap_expiry();
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn stale_expiry_is_a_noop_while_dragging() {
        let mut m = dragging_machine(1.0);
        m.on_double_tap_expiry();
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn moves_while_dragging_become_synthetic_drags() {
        let mut m = dragging_machine(1.0);
        let r = m.on_event(
            &ev(PointerKind::Move, 1.1, 30.0, 40.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        match &r.disposition {
            Disposition::Replace(out) => {
                assert_eq!(out.kind, PointerKind::Drag);
                assert_eq!(out.loc, Point::new(30.0, 40.0));
            }
            other => panic!("expected Replace, got {other:?}"),
        }
        match m.state() {
            GestureState::Dragging {
                last_move_at,
                last_loc,
                ..
            } => {
                assert_eq!(last_move_at, 1.1);
                assert_eq!(last_loc, Point::new(30.0, 40.0));
            }
            other => panic!("expected Dragging, got {other:?}"),
        }
    }

    #[test]
    fn native_drags_pass_through_and_update_movement() {
        let mut m = dragging_machine(1.0);
        let r = m.on_event(
            &ev(PointerKind::Drag, 1.2, 33.0, 44.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        match m.state() {
            GestureState::Dragging { last_move_at, .. } => assert_eq!(last_move_at, 1.2),
            other => panic!("expected Dragging, got {other:?}"),
        }
    }

    #[test]
    fn real_release_mid_drag_is_swallowed() {
        let mut m = dragging_machine(1.0);
        let r = m.on_event(
            &ev(PointerKind::Release, 1.1, 12.0, 10.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::Suppress);
        assert!(r.commands.is_empty());
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn lift_poll_releases_once_after_quiet_period() {
        // Drag established at t=1.0, moves at 1.1 and 1.2, lift delay 0.15.
        let mut m = dragging_machine(1.0);
        let _ = m.on_event(
            &ev(PointerKind::Move, 1.1, 20.0, 20.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        let _ = m.on_event(
            &ev(PointerKind::Move, 1.2, 21.0, 21.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        // Quiet for only 0.1s: nothing fires.
        assert!(m.on_lift_tick(1.3, 0.15).is_empty());
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
        // At 1.35 the quiet period reaches the delay: exactly one release,
        // at the last movement location.
        let commands = m.on_lift_tick(1.35, 0.15);
        assert_eq!(releases(&commands), 1);
        assert!(commands.contains(&Command::PostRelease(Point::new(21.0, 21.0))));
        assert!(commands.contains(&Command::CancelLift));
        assert_eq!(m.state(), GestureState::Idle);
        // Further ticks are no-ops: no second spurious release.
        assert!(m.on_lift_tick(1.5, 0.15).is_empty());
        assert!(m.on_lift_tick(10.0, 0.15).is_empty());
    }

    #[test]
    fn steady_movement_never_releases() {
        let mut m = dragging_machine(0.0);
        let mut ts = 0.0;
        for _ in 0..20 {
            ts += 0.1;
            let _ = m.on_event(
                &ev(PointerKind::Move, ts, ts * 10.0, 0.0),
                DeviceClass::Trackpad,
                &cfg(),
            );
            // Poll just after each move; quiet time is always < 0.15.
            assert!(m.on_lift_tick(ts + 0.05, 0.15).is_empty());
        }
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn tap_again_mode_drops_on_press() {
        let mut m = dragging_machine(1.0);
        let mut config = cfg();
        config.stop_mode = StopMode::TapAgain;
        let r = m.on_event(
            &ev(PointerKind::Press, 1.4, 50.0, 60.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert_eq!(r.disposition, Disposition::Suppress);
        assert!(r.commands.contains(&Command::PostRelease(Point::new(50.0, 60.0))));
        assert!(r.commands.contains(&Command::CancelLift));
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn delay_on_lift_mode_ignores_press() {
        let mut m = dragging_machine(1.0);
        let r = m.on_event(
            &ev(PointerKind::Press, 1.4, 50.0, 60.0),
            DeviceClass::Trackpad,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert!(r.commands.is_empty());
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn external_pointer_never_starts_a_gesture() {
        let mut m = Machine::new();
        let r = m.on_event(
            &ev(PointerKind::Release, 0.0, 10.0, 10.0),
            DeviceClass::ExternalPointer,
            &cfg(),
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert!(r.commands.is_empty());
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn external_pointer_events_still_feed_an_active_drag() {
        let mut m = dragging_machine(1.0);
        let r = m.on_event(
            &ev(PointerKind::Move, 1.1, 30.0, 30.0),
            DeviceClass::ExternalPointer,
            &cfg(),
        );
        assert!(matches!(r.disposition, Disposition::Replace(_)));
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn disable_mid_drag_releases_and_resets() {
        let mut m = dragging_machine(1.0);
        let mut config = cfg();
        config.enabled = false;
        let r = m.on_event(
            &ev(PointerKind::Move, 1.1, 30.0, 30.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(releases(&r.commands), 1);
        assert!(r.commands.contains(&Command::CancelDoubleTap));
        assert!(r.commands.contains(&Command::CancelLift));
        assert_eq!(m.state(), GestureState::Idle);
        // Once idle and disabled, events flow through with no side effects.
        let r = m.on_event(
            &ev(PointerKind::Release, 1.2, 30.0, 30.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert_eq!(r.disposition, Disposition::PassThrough);
        // The pending release guard was re-armed by the teardown; everything
        // else is quiet.
        assert!(r.commands.is_empty() || releases(&r.commands) == 0);
    }

    #[test]
    fn synthetic_press_guard_is_consumed_once() {
        let mut m = dragging_machine(1.0);
        assert_eq!(m.guards(), (true, false));
        // Our injected press comes back through the tap.
        let r = m.on_event(&synth(PointerKind::Press, 1.01), DeviceClass::Trackpad, &cfg());
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(m.guards(), (false, false));
        assert!(matches!(m.state(), GestureState::Dragging { .. }));
    }

    #[test]
    fn mismatched_synthetic_event_fails_open() {
        let mut m = dragging_machine(1.0);
        assert_eq!(m.guards(), (true, false));
        // A synthetic release arrives while we expected a press: the guards
        // clear and the event continues on rather than being dropped.
        let r = m.on_event(&synth(PointerKind::Release, 1.01), DeviceClass::Trackpad, &cfg());
        assert_eq!(r.disposition, Disposition::PassThrough);
        assert_eq!(m.guards(), (false, false));
    }

    #[test]
    fn reset_releases_active_drag_and_is_idempotent() {
        let mut m = dragging_machine(1.0);
        let commands = m.reset();
        assert_eq!(releases(&commands), 1);
        assert!(commands.contains(&Command::CancelDoubleTap));
        assert!(commands.contains(&Command::CancelLift));
        assert_eq!(m.state(), GestureState::Idle);
        // Second reset: timers canceled again, but no second release.
        let commands = m.reset();
        assert_eq!(releases(&commands), 0);
        assert_eq!(m.state(), GestureState::Idle);
    }

    #[test]
    fn timer_commands_track_config_at_arm_time() {
        let mut m = Machine::new();
        let mut config = cfg();
        config.double_tap_window = 0.2;
        config.lift_delay = 1.5;
        let r = m.on_event(
            &ev(PointerKind::Release, 0.0, 0.0, 0.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert_eq!(r.commands, vec![Command::ArmDoubleTap { window: 0.2 }]);
        let r = m.on_event(
            &ev(PointerKind::Press, 0.1, 0.0, 0.0),
            DeviceClass::Trackpad,
            &config,
        );
        assert!(r.commands.contains(&Command::ArmLift { delay: 1.5 }));
    }
}
