//! Reactive Scope
//!
//! Signals and computations live until they are disposed. A scope collects
//! every primitive created while it is active and disposes them together,
//! in reverse creation order, so a component or task can tear down its whole
//! reactive subgraph in one call.
//!
//! Scopes nest: a scope created while another is active is owned by it and
//! disposed with it, unless it was created with [`ReactiveScope::detached`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Something that can be explicitly torn down.
pub trait Dispose {
    /// Dispose the node. Calling this more than once has no further effect.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<Rc<ScopeInner>>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    name: Option<String>,
    owned: RefCell<Vec<Box<dyn Dispose>>>,
    disposed: Cell<bool>,
}

/// Hand `node` to the active scope, if there is one.
///
/// A node created while a disposed scope is active is disposed at once.
pub(crate) fn adopt(node: Box<dyn Dispose>) {
    let active = ACTIVE_SCOPES.with(|scopes| scopes.borrow().last().cloned());
    let Some(scope) = active else {
        return;
    };
    if scope.disposed.get() {
        node.dispose();
    } else {
        scope.owned.borrow_mut().push(node);
    }
}

/// Owner of the signals and computations created inside [`run`](Self::run).
#[derive(Clone)]
pub struct ReactiveScope {
    inner: Rc<ScopeInner>,
}

impl ReactiveScope {
    /// Create a scope owned by the currently active scope, if any.
    pub fn new() -> Self {
        let scope = Self::detached();
        adopt(Box::new(scope.clone()));
        scope
    }

    /// Create a scope that no other scope owns.
    pub fn detached() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                name: None,
                owned: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Create a named scope owned by the currently active scope, if any.
    pub fn named(name: impl Into<String>) -> Self {
        let scope = Self {
            inner: Rc::new(ScopeInner {
                name: Some(name.into()),
                owned: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        };
        adopt(Box::new(scope.clone()));
        scope
    }

    /// Run `f` with this scope active.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        struct ActiveGuard;

        impl Drop for ActiveGuard {
            fn drop(&mut self) {
                ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().pop());
            }
        }

        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(Rc::clone(&self.inner)));
        let _guard = ActiveGuard;
        f()
    }

    /// Dispose everything this scope owns, newest first.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let owned = std::mem::take(&mut *self.inner.owned.borrow_mut());
        tracing::trace!(
            target: "zenith_reactive",
            scope = self.inner.name.as_deref().unwrap_or(""),
            nodes = owned.len(),
            "disposing scope"
        );
        for node in owned.into_iter().rev() {
            node.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Number of nodes (including child scopes) currently owned.
    pub fn len(&self) -> usize {
        self.inner.owned.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReactiveScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for ReactiveScope {
    fn dispose(&self) {
        ReactiveScope::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        ReactiveScope::is_disposed(self)
    }
}

impl fmt::Debug for ReactiveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveScope")
            .field("name", &self.inner.name)
            .field("owned", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ComputedSignal, Effect, Signal};

    #[test]
    fn scope_disposes_what_it_created() {
        let scope = ReactiveScope::detached();
        let (signal, doubled, effect) = scope.run(|| {
            let signal = Signal::new(1);
            let doubled = ComputedSignal::new({
                let signal = signal.clone();
                move || signal.get() * 2
            });
            let effect = Effect::new({
                let doubled = doubled.clone();
                move || {
                    let _ = doubled.read();
                }
            });
            (signal, doubled, effect)
        });
        assert_eq!(scope.len(), 3);

        scope.dispose();
        assert!(signal.is_disposed());
        assert!(doubled.is_disposed());
        assert!(effect.is_disposed());
        assert!(scope.is_empty());
    }

    #[test]
    fn nodes_outside_run_are_not_owned() {
        let scope = ReactiveScope::detached();
        let outside = Signal::new(0);
        scope.dispose();
        assert!(!outside.is_disposed());
    }

    #[test]
    fn child_scope_disposed_with_parent() {
        let parent = ReactiveScope::named("parent");
        let (child, signal) = parent.run(|| {
            let child = ReactiveScope::named("child");
            let signal = child.run(|| Signal::new("x"));
            (child, signal)
        });

        parent.dispose();
        assert!(child.is_disposed());
        assert!(signal.is_disposed());
    }

    #[test]
    fn detached_scope_survives_parent() {
        let parent = ReactiveScope::detached();
        let detached = parent.run(ReactiveScope::detached);

        parent.dispose();
        assert!(!detached.is_disposed());
    }

    #[test]
    fn creating_inside_disposed_scope_disposes_immediately() {
        let scope = ReactiveScope::detached();
        scope.dispose();
        let signal = scope.run(|| Signal::new(1));
        assert!(signal.is_disposed());
    }
}
