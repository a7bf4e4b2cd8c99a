#![forbid(unsafe_code)]

//! Ordered listener lists and their de-registration handles.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order.
//! 2. No registry borrow is held while a listener runs, so listeners may
//!    subscribe, unsubscribe, or trigger nested dispatch.
//! 3. A listener removed during a dispatch still receives that dispatch's
//!    event (the list is snapshotted); it is gone before the next one.
//! 4. Dropping a [`Subscription`] releases it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// De-registration handle returned by every `subscribe`/`on_value_change`.
///
/// Dropping the handle unsubscribes. Call [`detach`](Self::detach) to keep
/// the listener registered for as long as its source lives.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a release action. Adapter implementations use this to hand back
    /// their own unsubscribe logic.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(self) {}

    /// Give up the handle without unsubscribing.
    pub fn detach(mut self) {
        self.release = None;
    }

    /// Whether dropping this handle would release anything.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

type Callback<E> = Rc<dyn Fn(&E)>;

struct Registry<E> {
    next_id: u64,
    slots: Vec<(u64, Callback<E>)>,
}

/// Shared, ordered list of callbacks for events of type `E`.
pub(crate) struct Listeners<E> {
    inner: Rc<RefCell<Registry<E>>>,
}

impl<E: 'static> Listeners<E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }

    pub(crate) fn add(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        let id = {
            let mut registry = self.inner.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.slots.push((id, Rc::new(callback)));
            id
        };
        let weak: Weak<RefCell<Registry<E>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().slots.retain(|(slot, _)| *slot != id);
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Invoke every listener with `event`; returns how many ran.
    pub(crate) fn emit(&self, event: &E) -> usize {
        let callbacks: Vec<Callback<E>> = self
            .inner
            .borrow()
            .slots
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks how deeply change dispatches are nested on this thread.
///
/// Exceeding `max_depth` is logged once per crossing; propagation itself is
/// never interrupted.
pub(crate) struct DispatchGuard {
    depth: usize,
}

impl DispatchGuard {
    pub(crate) fn enter(max_depth: usize) -> Self {
        let depth = DISPATCH_DEPTH.with(|cell| {
            let depth = cell.get() + 1;
            cell.set(depth);
            depth
        });
        if depth == max_depth.saturating_add(1) {
            tracing::warn!(
                depth,
                max_depth,
                "change dispatch nesting exceeds threshold; check for fields updating each other"
            );
        }
        Self { depth }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|cell| cell.set(cell.get().saturating_sub(1)));
    }
}
