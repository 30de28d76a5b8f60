//! Deduplicating cache of query handles.
//!
//! `ViewStore` maps a `Fingerprint` (query hash plus subscriber identity) to
//! the one `QueryHandle` serving it, so every call site asking for the same
//! query on behalf of the same subscriber shares a single materialized view.
//! A handle leaves the store when its last observer detaches; the next
//! request for that fingerprint creates a fresh handle.

use crate::config::StoreConfig;
use crate::handle::QueryHandle;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use core::cell::RefCell;
use core::fmt;
use hashbrown::HashMap;
use syncview_core::{Error, Result};
use syncview_incremental::Query;
use tracing::debug;

/// Identity of a cached view: the query's content hash and the subscriber it
/// is materialized for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    query_hash: String,
    subscriber: String,
}

impl Fingerprint {
    /// Creates a fingerprint.
    pub fn new(query_hash: impl Into<String>, subscriber: impl Into<String>) -> Self {
        Self {
            query_hash: query_hash.into(),
            subscriber: subscriber.into(),
        }
    }

    /// Returns the query hash.
    #[inline]
    pub fn query_hash(&self) -> &str {
        &self.query_hash
    }

    /// Returns the subscriber identity.
    #[inline]
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.query_hash, self.subscriber)
    }
}

struct StoreState {
    views: HashMap<Fingerprint, QueryHandle>,
    config: StoreConfig,
}

impl StoreState {
    /// Records `handle` as the live view for `fingerprint`.
    fn register(&mut self, fingerprint: &Fingerprint, handle: &QueryHandle) -> Result<()> {
        if let Some(existing) = self.views.get(fingerprint) {
            if !existing.ptr_eq(handle) {
                return Err(Error::view_already_exists(fingerprint.to_string()));
            }
            return Ok(());
        }
        debug!(fingerprint = %fingerprint, "view registered");
        self.views.insert(fingerprint.clone(), handle.clone());
        Ok(())
    }

    fn unregister(&mut self, fingerprint: &Fingerprint, handle: &QueryHandle) {
        if self.views.get(fingerprint).is_some_and(|existing| existing.ptr_eq(handle)) {
            self.views.remove(fingerprint);
            debug!(fingerprint = %fingerprint, "view removed");
        }
    }
}

/// Cache of live query handles keyed by fingerprint.
///
/// Clones refer to the same store.
#[derive(Clone)]
pub struct ViewStore {
    inner: Rc<RefCell<StoreState>>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreState {
                views: HashMap::new(),
                config,
            })),
        }
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> StoreConfig {
        self.inner.borrow().config.clone()
    }

    /// Computes the fingerprint of `query` for `subscriber_id`, substituting
    /// the anonymous identity when there is none.
    pub fn fingerprint(&self, subscriber_id: Option<&str>, query: &dyn Query) -> Fingerprint {
        let state = self.inner.borrow();
        let subscriber = subscriber_id.unwrap_or(&state.config.anonymous_id);
        Fingerprint::new(query.hash(), subscriber)
    }

    /// Returns the handle serving `query` for `subscriber_id`.
    ///
    /// A disabled request gets a fresh handle the store never tracks.
    /// Otherwise the cached handle for the fingerprint is returned, or a new
    /// one is created and cached.
    pub fn get_or_create(&self, subscriber_id: Option<&str>, query: Rc<dyn Query>, enabled: bool) -> QueryHandle {
        let options = self.inner.borrow().config.view_options;
        if !enabled {
            return QueryHandle::new(query, options);
        }

        let fingerprint = self.fingerprint(subscriber_id, query.as_ref());
        if let Some(existing) = self.inner.borrow().views.get(&fingerprint) {
            return existing.clone();
        }

        let handle = self.create(fingerprint.clone(), query);
        debug!(fingerprint = %fingerprint, "view created");
        self.inner.borrow_mut().views.insert(fingerprint, handle.clone());
        handle
    }

    fn create(&self, fingerprint: Fingerprint, query: Rc<dyn Query>) -> QueryHandle {
        let options = self.inner.borrow().config.view_options;
        let on_materialized = {
            let store: Weak<RefCell<StoreState>> = Rc::downgrade(&self.inner);
            let fingerprint = fingerprint.clone();
            Rc::new(move |handle: &QueryHandle| match store.upgrade() {
                Some(store) => store.borrow_mut().register(&fingerprint, handle),
                None => Ok(()),
            })
        };
        let on_dematerialized = {
            let store: Weak<RefCell<StoreState>> = Rc::downgrade(&self.inner);
            Rc::new(move |handle: &QueryHandle| {
                if let Some(store) = store.upgrade() {
                    store.borrow_mut().unregister(&fingerprint, handle);
                }
            })
        };
        QueryHandle::with_hooks(query, options, on_materialized, on_dematerialized)
    }

    /// Returns true if a handle is cached under `fingerprint`.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.borrow().views.contains_key(fingerprint)
    }

    /// Returns the number of cached handles.
    pub fn len(&self) -> usize {
        self.inner.borrow().views.len()
    }

    /// Returns true if no handle is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().views.is_empty()
    }
}
