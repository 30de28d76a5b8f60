//! Single-threaded signals shared between the query engine and its views.
//!
//! - `TransactionSignal`: fired by the engine at each transaction commit.
//! - `Deferred`: a one-shot completion, resolved at most once.
//! - `QueryComplete`: either already complete or waiting on a `Deferred`.
//!
//! Callbacks always run after the signal's internal borrow is released, so a
//! callback may register or remove listeners on the same signal.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

/// Identifier of a registered commit listener.
pub type ListenerId = u64;

struct SignalInner {
    listeners: Vec<(ListenerId, Rc<dyn Fn()>)>,
    next_id: ListenerId,
}

/// Commit boundary notifier owned by the query engine.
#[derive(Clone)]
pub struct TransactionSignal {
    inner: Rc<RefCell<SignalInner>>,
}

impl Default for TransactionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSignal {
    /// Creates a signal with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalInner {
                listeners: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Registers a callback run on every commit.
    pub fn on_commit<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(callback)));
        id
    }

    /// Removes a commit callback.
    ///
    /// Returns true if the listener was found and removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() < before
    }

    /// Signals a transaction commit to every listener, in registration order.
    pub fn commit(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Returns the number of registered listeners.
    #[inline]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

#[derive(Default)]
struct DeferredInner {
    resolved: bool,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// One-shot completion handle.
#[derive(Clone, Default)]
pub struct Deferred {
    inner: Rc<RefCell<DeferredInner>>,
}

impl Deferred {
    /// Creates an unresolved deferred.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `resolve` has been called.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().resolved
    }

    /// Resolves the deferred and runs every pending callback.
    ///
    /// Resolving twice is a no-op.
    pub fn resolve(&self) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.resolved {
                return;
            }
            inner.resolved = true;
            core::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Runs `callback` on resolution, or immediately if already resolved.
    pub fn then<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        if self.is_resolved() {
            callback();
        } else {
            self.inner.borrow_mut().callbacks.push(Box::new(callback));
        }
    }
}

/// Completion state of a query when it is materialized.
#[derive(Clone)]
pub enum QueryComplete {
    /// The result is already complete.
    Ready,
    /// The result completes when the deferred resolves.
    Pending(Deferred),
}

impl QueryComplete {
    /// Returns true if the query is complete right now.
    pub fn is_complete(&self) -> bool {
        match self {
            QueryComplete::Ready => true,
            QueryComplete::Pending(deferred) => deferred.is_resolved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_signal_commit() {
        let signal = TransactionSignal::new();
        let count = Rc::new(RefCell::new(0));
        let c1 = count.clone();
        let c2 = count.clone();

        signal.on_commit(move || *c1.borrow_mut() += 1);
        let id = signal.on_commit(move || *c2.borrow_mut() += 10);
        assert_eq!(signal.listener_count(), 2);

        signal.commit();
        assert_eq!(*count.borrow(), 11);

        assert!(signal.remove(id));
        assert!(!signal.remove(id));
        signal.commit();
        assert_eq!(*count.borrow(), 12);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let signal = TransactionSignal::new();
        let id_cell = Rc::new(RefCell::new(0));
        let sig = signal.clone();
        let id_ref = id_cell.clone();
        let id = signal.on_commit(move || {
            sig.remove(*id_ref.borrow());
        });
        *id_cell.borrow_mut() = id;

        signal.commit();
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn test_deferred_resolves_once() {
        let deferred = Deferred::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        deferred.then(move || *c.borrow_mut() += 1);

        assert!(!deferred.is_resolved());
        deferred.resolve();
        deferred.resolve();
        assert!(deferred.is_resolved());
        assert_eq!(*count.borrow(), 1);

        // late registration runs immediately
        let c = count.clone();
        deferred.then(move || *c.borrow_mut() += 1);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_query_complete() {
        assert!(QueryComplete::Ready.is_complete());
        let deferred = Deferred::new();
        let pending = QueryComplete::Pending(deferred.clone());
        assert!(!pending.is_complete());
        deferred.resolve();
        assert!(pending.is_complete());
    }
}
