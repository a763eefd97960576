//! Shared event tagging helpers used across crates.
//!
//! We tag injected pointer events with a process-unique marker value in the
//! `EventSourceUserData` field so our tap can ignore them.

/// 'dtap' in ASCII bytes: 0x64 0x74 0x61 0x70 -> 1685348720
pub const DRAG_TAG: i64 = 1_685_348_720;
