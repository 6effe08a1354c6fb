//! Named publish/subscribe for pipeline lifecycle events.
//!
//! Handlers are registered under a handler name so they can be replaced or
//! removed later; within one event, names are unique. Firing invokes
//! handlers in registration order and never halts on a handler failure —
//! the error is logged and iteration continues.

use std::collections::HashMap;
use std::fmt::{self, Display};

use tracing::warn;

/// A boxed error that is sendable and syncable.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The result a hook handler returns.
pub type HandlerResult = Result<(), BoxError>;

type HandlerFn = Box<dyn Fn(Option<&str>) -> HandlerResult + Send + Sync>;

//================================================================================================
// Types
//================================================================================================

/// Lifecycle events fired by the resolver and loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Fired before any dependency edge is built.
    PreResolve,
    /// Fired after the load order is written.
    PostResolve,
    /// Fired before a clone task is submitted for a package.
    PreInstall,
    /// Fired after a package's clone completed successfully.
    PostInstall,
    /// Fired before a package's configuration is applied.
    PreLoad,
    /// Fired after a package is marked loaded.
    PostLoad,
    /// Fired once the whole pipeline has drained.
    Ready,
    /// Fired when a package is disabled at runtime.
    PackageDisabled,
}

struct Handler {
    name: String,
    f: HandlerFn,
}

/// The hook bus: a map from event to its ordered handler list.
#[derive(Default)]
pub struct Hooks {
    handlers: HashMap<Event, Vec<Handler>>,
}

//================================================================================================
// Impls
//================================================================================================

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::PreResolve => "pre-resolve",
            Event::PostResolve => "post-resolve",
            Event::PreInstall => "pre-install",
            Event::PostInstall => "post-install",
            Event::PreLoad => "pre-load",
            Event::PostLoad => "post-load",
            Event::Ready => "ready",
            Event::PackageDisabled => "package-disabled",
        };
        f.write_str(s)
    }
}

impl Hooks {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under `name` for `event`.
    ///
    /// Registering a name that already exists for the event replaces the
    /// handler in place, keeping its position in the firing order.
    pub fn on<F>(&mut self, event: Event, name: impl Into<String>, f: F)
    where
        F: Fn(Option<&str>) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let handlers = self.handlers.entry(event).or_default();
        let f = Box::new(f);
        match handlers.iter_mut().find(|h| h.name == name) {
            Some(existing) => existing.f = f,
            None => handlers.push(Handler { name, f }),
        }
    }

    /// Removes the handler registered under `name` for `event`.
    ///
    /// Returns true when a handler was removed.
    pub fn off(&mut self, event: Event, name: &str) -> bool {
        match self.handlers.get_mut(&event) {
            Some(handlers) => {
                let before = handlers.len();
                handlers.retain(|h| h.name != name);
                handlers.len() != before
            }
            None => false,
        }
    }

    /// Invokes every handler for `event` in registration order.
    ///
    /// `package` carries the subject package name for per-package events.
    /// Handler failures are logged and do not stop iteration.
    pub fn fire(&self, event: Event, package: Option<&str>) {
        let Some(handlers) = self.handlers.get(&event) else {
            return;
        };
        for handler in handlers {
            if let Err(e) = (handler.f)(package) {
                warn!(hook = %event, handler = %handler.name, error = %e, "hook handler failed");
            }
        }
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn count(&self, event: Event) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn handlers_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            hooks.on(Event::Ready, tag, move |_| {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }
        hooks.fire(Event::Ready, None);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn registration_deduplicates_by_name() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            hooks.on(Event::PreLoad, "same", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(hooks.count(Event::PreLoad), 1);
        hooks.fire(Event::PreLoad, Some("pkg"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_failing_handler_does_not_halt_iteration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        hooks.on(Event::PostLoad, "boom", |_| Err("nope".into()));
        {
            let calls = Arc::clone(&calls);
            hooks.on(Event::PostLoad, "after", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        hooks.fire(Event::PostLoad, Some("pkg"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_a_named_handler() {
        let mut hooks = Hooks::new();
        hooks.on(Event::Ready, "gone", |_| Ok(()));
        assert!(hooks.off(Event::Ready, "gone"));
        assert!(!hooks.off(Event::Ready, "gone"));
        assert_eq!(hooks.count(Event::Ready), 0);
    }
}
