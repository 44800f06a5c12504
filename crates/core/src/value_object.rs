//! Value objects: compared by value, never by identity.

/// Marker for immutable values such as meter readings, billing periods and
/// charge components.
///
/// Two meter readings with the same previous/current/rate are the same reading;
/// to change one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
