//! Syncview Reactive - Shared, observable query results.
//!
//! This crate sits between UI code and `syncview-incremental` views. It
//! exposes each query as an observable handle that materializes a view only
//! while observed, and caches handles so duplicate requests share one view.
//!
//! # Core Concepts
//!
//! - `QueryHandle`: lazily materialized handle exposing `current()` and
//!   `observe()`
//! - `Observer`: guard that ends an observation when dropped
//! - `QueryResult`: an owned copy of a committed result with its completeness
//! - `ViewStore`: the deduplicating cache keyed by `Fingerprint`
//! - `Session` / `use_query`: subscriber identity and the UI entry point
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use syncview_core::schema::SourceSchema;
//! use syncview_core::{Format, Row};
//! use syncview_incremental::{MemoryQuery, MemorySource};
//! use syncview_reactive::{use_query, Session, ViewStore};
//!
//! let schema = SourceSchema::builder("chats").unwrap()
//!     .primary_key(&["id"]).unwrap()
//!     .build().unwrap();
//! let chats = MemorySource::new(schema);
//! chats.add(Row::new().with("id", 1i64));
//!
//! let store = ViewStore::new();
//! let session = Session::signed_in("alice");
//! let query = Rc::new(MemoryQuery::new("chats:all", &chats, Format::plural()));
//!
//! let handle = use_query(&store, &session, query.clone(), true);
//! let observer = handle.observe(|result| {
//!     println!("{} chats", result.data.len());
//! }).unwrap();
//! assert_eq!(handle.current().data.len(), 1);
//!
//! // A second call site shares the same view
//! let again = use_query(&store, &session, query.clone(), true);
//! assert!(again.ptr_eq(&handle));
//! assert_eq!(query.materialize_count(), 1);
//!
//! drop(observer);
//! assert!(store.is_empty());
//! ```

#![no_std]

extern crate alloc;

pub mod config;
pub mod handle;
pub mod result;
pub mod session;
pub mod store;
pub mod subscription;

pub use config::{StoreConfig, ANONYMOUS_SUBSCRIBER};
pub use handle::{Observer, QueryHandle};
pub use result::{QueryResult, QueryResultDetails};
pub use session::{use_query, Session};
pub use store::{Fingerprint, ViewStore};
pub use subscription::{ResultCallback, SubscriptionId, SubscriptionManager};

// Re-export commonly used types from dependencies
pub use syncview_core::{Error, Format, Result, ResultType};
