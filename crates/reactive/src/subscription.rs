//! Subscription management for query handles.
//!
//! This module provides subscription IDs and a manager for tracking the
//! observers of one query handle.

use crate::result::QueryResult;
use alloc::rc::Rc;
use alloc::vec::Vec;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for result notifications.
pub type ResultCallback = Rc<dyn Fn(&QueryResult)>;

/// Manages the observers of a query handle.
pub struct SubscriptionManager {
    /// Active subscriptions, in subscription order
    subscriptions: Vec<(SubscriptionId, ResultCallback)>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Creates a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    /// Subscribes to results with the given callback.
    ///
    /// Returns the subscription ID that can be used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&QueryResult) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.push((id, Rc::new(callback)));
        id
    }

    /// Unsubscribes by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(sid, _)| *sid != id);
        self.subscriptions.len() != before
    }

    /// Returns the callbacks of every subscription, oldest first.
    ///
    /// Dispatching from this copy lets a callback subscribe or unsubscribe
    /// while results are being delivered.
    pub fn callbacks(&self) -> Vec<ResultCallback> {
        self.subscriptions.iter().map(|(_, cb)| cb.clone()).collect()
    }

    /// Returns the number of active subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if there are no subscriptions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use syncview_core::{Format, ResultType};

    fn result() -> QueryResult {
        QueryResult::empty(&Format::plural())
    }

    #[test]
    fn test_subscription_manager_subscribe() {
        let mut manager = SubscriptionManager::new();

        let id1 = manager.subscribe(|_| {});
        let id2 = manager.subscribe(|_| {});

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_subscription_manager_unsubscribe() {
        let mut manager = SubscriptionManager::new();

        let id = manager.subscribe(|_| {});
        assert_eq!(manager.len(), 1);

        assert!(manager.unsubscribe(id));
        assert!(manager.is_empty());

        assert!(!manager.unsubscribe(id)); // Already removed
    }

    #[test]
    fn test_subscription_manager_callbacks() {
        let mut manager = SubscriptionManager::new();

        let count = Rc::new(RefCell::new(0));
        let count1 = count.clone();
        let count2 = count.clone();

        manager.subscribe(move |_| {
            *count1.borrow_mut() += 1;
        });
        manager.subscribe(move |r| {
            assert_eq!(r.result_type(), ResultType::Unknown);
            *count2.borrow_mut() += 1;
        });

        for callback in manager.callbacks() {
            callback(&result());
        }
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_callbacks_in_subscription_order() {
        let mut manager = SubscriptionManager::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for n in 0..8 {
            let order = order.clone();
            manager.subscribe(move |_| order.borrow_mut().push(n));
        }
        manager.unsubscribe(3);

        for callback in manager.callbacks() {
            callback(&result());
        }
        assert_eq!(*order.borrow(), alloc::vec![0, 1, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_callbacks_outlive_unsubscribe() {
        let manager = Rc::new(RefCell::new(SubscriptionManager::new()));
        let count = Rc::new(RefCell::new(0));

        let m = manager.clone();
        let c = count.clone();
        let id = Rc::new(RefCell::new(0));
        let own_id = id.clone();
        *id.borrow_mut() = manager.borrow_mut().subscribe(move |_| {
            *c.borrow_mut() += 1;
            m.borrow_mut().unsubscribe(*own_id.borrow());
        });

        let callbacks = manager.borrow().callbacks();
        for callback in callbacks {
            callback(&result());
        }
        assert_eq!(*count.borrow(), 1);
        assert!(manager.borrow().is_empty());
    }
}
