//! # Registry Infrastructure
//!
//! Subscriber-side registration: the handler capability and the pattern
//! registry the worker pool resolves handlers through.
//!
//! ```text
//! Registry Infrastructure
//! ├── EventHandler       (handle(event) -> Result, registered explicitly)
//! └── PatternRegistry    (glob pattern -> ordered handlers, type allow-list)
//! ```

pub mod handler;
pub mod pattern_registry;

pub use handler::{
    handler_fn, same_handler, EventHandler, FnHandler, HandlerError, HandlerRef, HandlerResult,
};
pub use pattern_registry::PatternRegistry;
