//! # Events
//!
//! The event entity and the glob patterns used to route it.

pub mod event;
pub mod pattern;

pub use event::{Event, Payload};
pub use pattern::{GlobPattern, MatchMode};
