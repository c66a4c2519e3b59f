//! # Pattern Registry
//!
//! Thread-safe map from subscription pattern to an ordered list of handlers.
//!
//! ## Overview
//!
//! The worker pool resolves the handlers for each popped event through this
//! registry. Patterns use [`MatchMode::Strict`] semantics: `user.*` matches
//! `user.created` but not `user.created.v2`.
//!
//! - Patterns keep the order in which they were first registered, and each
//!   pattern keeps its handlers in registration order
//! - Lookup concatenates the handler lists of every matching pattern, so its
//!   cost is linear in the number of distinct patterns
//! - Compiled patterns are cached per registry instance and dropped together
//!   with their pattern
//! - One mutex serializes all mutation and lookup; handlers are cloned out and
//!   invoked after the lock is released
//!
//! ## Usage
//!
//! ```rust
//! use relay_core::events::Event;
//! use relay_core::registry::{handler_fn, PatternRegistry};
//!
//! let registry = PatternRegistry::new();
//! registry.register("user.*", handler_fn("welcome", |_| async { Ok(()) }));
//!
//! let event = Event::new("user.created", serde_json::json!({"id": "1"}));
//! assert_eq!(registry.get_handlers(&event).len(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::events::{Event, GlobPattern, MatchMode};
use crate::registry::handler::{same_handler, HandlerRef};

#[derive(Default)]
struct RegistryState {
    /// Subscription entries in first-registration order
    entries: Vec<(String, Vec<HandlerRef>)>,
    /// Compiled form of each registered pattern
    compiled: HashMap<String, GlobPattern>,
    /// Optional allow-list of known event names
    known_types: HashSet<String>,
}

impl RegistryState {
    fn compiled(&mut self, pattern: &str) -> &GlobPattern {
        self.compiled
            .entry(pattern.to_string())
            .or_insert_with(|| GlobPattern::new(pattern, MatchMode::Strict))
    }
}

/// Registry of handlers keyed by glob pattern
#[derive(Default)]
pub struct PatternRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PatternRegistry")
            .field("patterns", &state.entries.len())
            .field("known_types", &state.known_types.len())
            .finish()
    }
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `pattern`, creating the entry if new
    pub fn register(&self, pattern: &str, handler: HandlerRef) {
        let mut state = self.state.lock();
        state.compiled(pattern);

        match state.entries.iter().position(|(p, _)| p == pattern) {
            Some(index) => state.entries[index].1.push(handler.clone()),
            None => state
                .entries
                .push((pattern.to_string(), vec![handler.clone()])),
        }

        info!(
            pattern = %pattern,
            handler = %handler.name(),
            "Registered event handler"
        );
    }

    /// Remove one handler from `pattern`, or every handler when `handler` is
    /// `None`. Returns the number of handlers removed.
    pub fn unregister(&self, pattern: &str, handler: Option<&HandlerRef>) -> usize {
        let mut state = self.state.lock();

        let Some(index) = state.entries.iter().position(|(p, _)| p == pattern) else {
            debug!(pattern = %pattern, "Unregister for unknown pattern ignored");
            return 0;
        };

        let removed = match handler {
            Some(target) => {
                let handlers = &mut state.entries[index].1;
                match handlers.iter().position(|h| same_handler(h, target)) {
                    Some(pos) => {
                        handlers.remove(pos);
                        1
                    }
                    None => 0,
                }
            }
            None => state.entries[index].1.len(),
        };

        if handler.is_none() || state.entries[index].1.is_empty() {
            state.entries.remove(index);
            state.compiled.remove(pattern);
        }

        info!(pattern = %pattern, removed = removed, "Unregistered event handlers");
        removed
    }

    /// Handlers of every pattern matching the event's name, concatenated in
    /// pattern-registration order
    pub fn get_handlers(&self, event: &Event) -> Vec<HandlerRef> {
        self.handlers_for(event.name())
    }

    /// Same as [`PatternRegistry::get_handlers`], keyed by name
    pub fn handlers_for(&self, name: &str) -> Vec<HandlerRef> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let mut matched = Vec::new();
        for (pattern, handlers) in &state.entries {
            let compiled = state
                .compiled
                .entry(pattern.clone())
                .or_insert_with(|| GlobPattern::new(pattern, MatchMode::Strict));
            if compiled.matches(name) {
                matched.extend(handlers.iter().cloned());
            }
        }
        matched
    }

    /// Add an event name to the allow-list
    pub fn register_type(&self, name: &str) {
        self.state.lock().known_types.insert(name.to_string());
    }

    /// Whether an event name is on the allow-list
    pub fn is_valid_type(&self, name: &str) -> bool {
        self.state.lock().known_types.contains(name)
    }

    /// Registered patterns in registration order
    pub fn patterns(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Total number of registered handlers across all patterns
    pub fn handler_count(&self) -> usize {
        self.state.lock().entries.iter().map(|(_, h)| h.len()).sum()
    }

    /// Drop every compiled pattern; they are rebuilt on next lookup
    pub fn clear_cache(&self) {
        self.state.lock().compiled.clear();
    }

    pub(crate) fn cached_patterns(&self) -> usize {
        self.state.lock().compiled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::handler::handler_fn;
    use serde_json::json;

    fn noop(name: &str) -> HandlerRef {
        handler_fn(name.to_string(), |_| async { Ok(()) })
    }

    fn names(handlers: &[HandlerRef]) -> Vec<String> {
        handlers.iter().map(|h| h.name().to_string()).collect()
    }

    #[test]
    fn test_wildcard_registration() {
        let registry = PatternRegistry::new();
        let handler = noop("h");
        registry.register("user.*", handler.clone());

        let matched = registry.get_handlers(&Event::new("user.created", json!({})));
        assert_eq!(matched.len(), 1);
        assert!(same_handler(&matched[0], &handler));

        assert!(registry
            .get_handlers(&Event::new("order.created", json!({})))
            .is_empty());
    }

    #[test]
    fn test_concatenation_in_pattern_order() {
        let registry = PatternRegistry::new();
        registry.register("user.created", noop("exact"));
        registry.register("*.created", noop("any-created"));
        registry.register("user.*", noop("any-user"));
        registry.register("user.created", noop("exact-2"));

        let matched = registry.handlers_for("user.created");
        assert_eq!(
            names(&matched),
            vec!["exact", "exact-2", "any-created", "any-user"]
        );
        assert_eq!(names(&registry.handlers_for("order.created")), vec!["any-created"]);
    }

    #[test]
    fn test_unregister_single_handler() {
        let registry = PatternRegistry::new();
        let first = noop("first");
        let second = noop("second");
        registry.register("user.*", first.clone());
        registry.register("user.*", second.clone());

        assert_eq!(registry.unregister("user.*", Some(&first)), 1);
        assert_eq!(names(&registry.handlers_for("user.x")), vec!["second"]);

        // unknown handler is a no-op
        assert_eq!(registry.unregister("user.*", Some(&first)), 0);

        assert_eq!(registry.unregister("user.*", Some(&second)), 1);
        assert!(registry.patterns().is_empty());
        assert_eq!(registry.cached_patterns(), 0);
    }

    #[test]
    fn test_unregister_all_handlers() {
        let registry = PatternRegistry::new();
        registry.register("order.*", noop("a"));
        registry.register("order.*", noop("b"));
        registry.register("user.*", noop("c"));

        assert_eq!(registry.unregister("order.*", None), 2);
        assert_eq!(registry.patterns(), vec!["user.*".to_string()]);
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.unregister("missing.*", None), 0);
    }

    #[test]
    fn test_type_allow_list_is_independent() {
        let registry = PatternRegistry::new();
        registry.register_type("user.created");

        assert!(registry.is_valid_type("user.created"));
        assert!(!registry.is_valid_type("user.deleted"));
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn test_cache_is_per_instance_and_clearable() {
        let a = PatternRegistry::new();
        let b = PatternRegistry::new();
        a.register("user.*", noop("h"));

        assert_eq!(a.cached_patterns(), 1);
        assert_eq!(b.cached_patterns(), 0);

        a.clear_cache();
        assert_eq!(a.cached_patterns(), 0);
        assert_eq!(a.handlers_for("user.created").len(), 1);
        assert_eq!(a.cached_patterns(), 1);
    }
}
