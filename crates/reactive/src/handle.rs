//! Observable handle over one query.
//!
//! A `QueryHandle` does work only while observed. The first observer
//! materializes the query into a `View` and listens to its commits; dropping
//! the last observer destroys the view and releases the upstream
//! subscription. Every committed update is copied into an owned
//! `QueryResult` before observers see it.

use crate::result::QueryResult;
use crate::subscription::{SubscriptionId, SubscriptionManager};
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use core::fmt;
use syncview_core::{Format, ListenerId, Result};
use syncview_incremental::{Query, View, ViewOptions};
use tracing::debug;

/// Called after a handle materializes its view. An error aborts the
/// observation and destroys the new view.
pub(crate) type MaterializedHook = Rc<dyn Fn(&QueryHandle) -> Result<()>>;
/// Called after a handle tears its view down.
pub(crate) type DematerializedHook = Rc<dyn Fn(&QueryHandle)>;

struct HandleState {
    query: Rc<dyn Query>,
    format: Format,
    options: ViewOptions,
    current: QueryResult,
    view: Option<(View, ListenerId)>,
    subscribers: SubscriptionManager,
    on_materialized: MaterializedHook,
    on_dematerialized: DematerializedHook,
}

/// Shared, lazily materialized handle to a query's result.
///
/// Clones refer to the same handle.
#[derive(Clone)]
pub struct QueryHandle {
    inner: Rc<RefCell<HandleState>>,
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("QueryHandle")
            .field("query", &state.query.hash())
            .field("observers", &state.subscribers.len())
            .field("materialized", &state.view.is_some())
            .finish()
    }
}

impl QueryHandle {
    /// Creates a handle that is not tracked by any store.
    pub fn new(query: Rc<dyn Query>, options: ViewOptions) -> Self {
        Self::with_hooks(query, options, Rc::new(|_: &QueryHandle| Ok(())), Rc::new(|_: &QueryHandle| {}))
    }

    pub(crate) fn with_hooks(
        query: Rc<dyn Query>,
        options: ViewOptions,
        on_materialized: MaterializedHook,
        on_dematerialized: DematerializedHook,
    ) -> Self {
        let format = query.format();
        Self {
            inner: Rc::new(RefCell::new(HandleState {
                current: QueryResult::empty(&format),
                query,
                format,
                options,
                view: None,
                subscribers: SubscriptionManager::new(),
                on_materialized,
                on_dematerialized,
            })),
        }
    }

    /// Returns the latest committed result.
    ///
    /// Before the first observation this is the empty result for the
    /// query's format with unknown completeness.
    pub fn current(&self) -> QueryResult {
        self.inner.borrow().current.clone()
    }

    /// Returns the hash of the underlying query.
    pub fn query_hash(&self) -> String {
        self.inner.borrow().query.hash()
    }

    /// Returns the result format.
    pub fn format(&self) -> Format {
        self.inner.borrow().format.clone()
    }

    /// Returns true while a view is materialized.
    pub fn is_materialized(&self) -> bool {
        self.inner.borrow().view.is_some()
    }

    /// Returns the number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Returns true if both values refer to the same handle.
    pub fn ptr_eq(&self, other: &QueryHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Starts observing the result.
    ///
    /// The first observer materializes the query; `current()` holds the
    /// initial result as soon as this returns. `callback` runs on each later
    /// commit. Dropping the returned guard stops the observation.
    pub fn observe<F>(&self, callback: F) -> Result<Observer>
    where
        F: Fn(&QueryResult) + 'static,
    {
        if !self.is_materialized() {
            self.materialize()?;
        }
        let id = self.inner.borrow_mut().subscribers.subscribe(callback);
        Ok(Observer {
            handle: self.clone(),
            id: Some(id),
        })
    }

    fn materialize(&self) -> Result<()> {
        let (query, format, options, on_materialized) = {
            let state = self.inner.borrow();
            (
                state.query.clone(),
                state.format.clone(),
                state.options,
                state.on_materialized.clone(),
            )
        };

        let view = View::new(query.materialize(), format, options);
        if let Err(err) = on_materialized(self) {
            view.destroy();
            return Err(err);
        }

        let weak = Rc::downgrade(&self.inner);
        let listener = view.add_listener(move |entry, result_type| {
            if let Some(inner) = weak.upgrade() {
                publish(&inner, QueryResult::new(entry.root().clone(), result_type));
            }
        });
        self.inner.borrow_mut().view = Some((view, listener));
        debug!(query = %query.hash(), "query handle materialized");
        Ok(())
    }

    fn unobserve(&self, id: SubscriptionId) {
        let teardown = {
            let mut state = self.inner.borrow_mut();
            state.subscribers.unsubscribe(id);
            if state.subscribers.is_empty() {
                state.view.take().map(|view| (view, state.on_dematerialized.clone()))
            } else {
                None
            }
        };

        if let Some(((view, listener), on_dematerialized)) = teardown {
            view.remove_listener(listener);
            view.destroy();
            debug!(query = %self.query_hash(), "query handle dematerialized");
            on_dematerialized(self);
        }
    }
}

fn publish(inner: &Rc<RefCell<HandleState>>, result: QueryResult) {
    let callbacks = {
        let mut state = inner.borrow_mut();
        state.current = result.clone();
        state.subscribers.callbacks()
    };
    for callback in callbacks {
        callback(&result);
    }
}

/// Guard for one observation of a `QueryHandle`.
///
/// Dropping the guard, or calling `unobserve`, ends the observation.
pub struct Observer {
    handle: QueryHandle,
    id: Option<SubscriptionId>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .finish()
    }
}

impl Observer {
    /// Returns the observed handle.
    pub fn handle(&self) -> &QueryHandle {
        &self.handle
    }

    /// Ends the observation.
    pub fn unobserve(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(id) = self.id.take() {
            self.handle.unobserve(id);
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use syncview_core::schema::{Order, SourceSchema};
    use syncview_core::{Deferred, ResultType, Row};
    use syncview_incremental::{MemoryQuery, MemorySource};

    fn source() -> MemorySource {
        let schema = SourceSchema::builder("messages")
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .order_by("createdAt", Order::Asc)
            .build()
            .unwrap();
        MemorySource::new(schema)
    }

    fn message(id: i64) -> Row {
        Row::new().with("id", id).with("createdAt", id)
    }

    fn ids(result: &QueryResult) -> Vec<i64> {
        result.data.rows().filter_map(|r| r.get("id")?.as_i64()).collect()
    }

    #[test]
    fn test_lazy_until_observed() {
        let messages = source();
        messages.add(message(1));
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let handle = QueryHandle::new(Rc::new(query.clone()), ViewOptions::default());

        assert_eq!(query.materialize_count(), 0);
        assert!(ids(&handle.current()).is_empty());
        assert_eq!(handle.current().result_type(), ResultType::Unknown);

        let _observer = handle.observe(|_| {}).unwrap();
        assert_eq!(query.materialize_count(), 1);
        assert_eq!(ids(&handle.current()), alloc::vec![1]);
        assert_eq!(handle.current().result_type(), ResultType::Complete);
    }

    #[test]
    fn test_observers_notified_at_commit() {
        let messages = source();
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let handle = QueryHandle::new(Rc::new(query), ViewOptions::default());

        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let _observer = handle.observe(move |_| c.set(c.get() + 1)).unwrap();

        messages.add(message(1));
        messages.add(message(2));
        assert_eq!(calls.get(), 0);
        messages.commit();
        assert_eq!(calls.get(), 1);
        assert_eq!(ids(&handle.current()), alloc::vec![1, 2]);
    }

    #[test]
    fn test_results_are_owned_copies() {
        let messages = source();
        messages.add(message(1));
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let handle = QueryHandle::new(Rc::new(query), ViewOptions::default());
        let _observer = handle.observe(|_| {}).unwrap();

        let before = handle.current();
        messages.add(message(2));
        messages.commit();
        assert_eq!(ids(&before), alloc::vec![1]);
        assert_eq!(ids(&handle.current()), alloc::vec![1, 2]);
    }

    #[test]
    fn test_last_observer_tears_down() {
        let messages = source();
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let torn_down = Rc::new(Cell::new(0));
        let t = torn_down.clone();
        let handle = QueryHandle::with_hooks(
            Rc::new(query.clone()),
            ViewOptions::default(),
            Rc::new(|_: &QueryHandle| Ok(())),
            Rc::new(move |_: &QueryHandle| t.set(t.get() + 1)),
        );

        let first = handle.observe(|_| {}).unwrap();
        let second = handle.observe(|_| {}).unwrap();
        assert_eq!(handle.observer_count(), 2);
        assert_eq!(query.materialize_count(), 1);
        assert_eq!(messages.connection_count(), 1);

        drop(first);
        assert!(handle.is_materialized());
        second.unobserve();
        assert!(!handle.is_materialized());
        assert_eq!(torn_down.get(), 1);
        assert_eq!(messages.connection_count(), 0);
        assert_eq!(messages.commits().listener_count(), 0);

        // Observing again is a cold start
        let _third = handle.observe(|_| {}).unwrap();
        assert_eq!(query.materialize_count(), 2);
    }

    #[test]
    fn test_failed_registration_destroys_view() {
        let messages = source();
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let handle = QueryHandle::with_hooks(
            Rc::new(query),
            ViewOptions::default(),
            Rc::new(|_: &QueryHandle| Err(syncview_core::Error::view_already_exists("messages@anon"))),
            Rc::new(|_: &QueryHandle| {}),
        );

        let err = handle.observe(|_| {}).unwrap_err();
        assert!(matches!(err, syncview_core::Error::ViewAlreadyExists { .. }));
        assert!(!handle.is_materialized());
        assert_eq!(handle.observer_count(), 0);
        assert_eq!(messages.connection_count(), 0);
    }

    #[test]
    fn test_observer_debug() {
        let messages = source();
        let handle = QueryHandle::new(
            Rc::new(MemoryQuery::new("messages", &messages, Format::plural())),
            ViewOptions::default(),
        );
        let observer = handle.observe(|_| {}).unwrap();
        let printed = alloc::format!("{:?}", observer);
        assert!(printed.starts_with("Observer"));
        assert!(printed.contains("\"messages\""));
    }

    #[test]
    fn test_completion_reaches_observers() {
        let messages = source();
        messages.add(message(1));
        let deferred = Deferred::new();
        let query = MemoryQuery::new("messages", &messages, Format::plural()).with_completion(deferred.clone());
        let handle = QueryHandle::new(Rc::new(query), ViewOptions::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _observer = handle.observe(move |r| s.borrow_mut().push(r.result_type())).unwrap();
        assert_eq!(handle.current().result_type(), ResultType::Unknown);

        deferred.resolve();
        assert_eq!(*seen.borrow(), alloc::vec![ResultType::Complete]);
        assert_eq!(ids(&handle.current()), alloc::vec![1]);
    }

    #[test]
    fn test_observer_may_drop_itself_during_notification() {
        let messages = source();
        let query = MemoryQuery::new("messages", &messages, Format::plural());
        let handle = QueryHandle::new(Rc::new(query), ViewOptions::default());

        let slot: Rc<RefCell<Option<Observer>>> = Rc::new(RefCell::new(None));
        let s = slot.clone();
        let observer = handle
            .observe(move |_| {
                s.borrow_mut().take();
            })
            .unwrap();
        *slot.borrow_mut() = Some(observer);

        messages.add(message(1));
        messages.commit();
        assert!(slot.borrow().is_none());
        assert!(!handle.is_materialized());
        assert_eq!(messages.connection_count(), 0);
    }
}
