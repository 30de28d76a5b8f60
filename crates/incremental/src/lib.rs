//! Syncview Incremental - Transaction-batched view materialization.
//!
//! This crate turns the row-level change stream of a synchronized-query engine
//! into a stable, consumer-facing result tree that only changes at
//! transaction commit boundaries.
//!
//! # Core Concepts
//!
//! - `Change` / `Node`: one row-level delta and the row it carries, with lazy
//!   relationship producers
//! - `Entry` / `Slot` / `RowEntry`: the materialized result tree
//! - `apply_change`: order-preserving, identity-based application of a change
//! - `View`: the change sink of one live query, with builder-root and
//!   pending-queue batching
//! - `Query` / `Input` / `Output`: the contract with the query engine
//! - `MemorySource` / `MemoryQuery`: an in-memory engine table
//!
//! # Example
//!
//! ```rust
//! use syncview_core::schema::{Order, SourceSchema};
//! use syncview_core::{Format, Row};
//! use syncview_incremental::{MemoryQuery, MemorySource, Query, View, ViewOptions};
//!
//! let schema = SourceSchema::builder("messages").unwrap()
//!     .primary_key(&["id"]).unwrap()
//!     .order_by("createdAt", Order::Asc)
//!     .build().unwrap();
//! let messages = MemorySource::new(schema);
//! messages.add(Row::new().with("id", 1i64).with("createdAt", 10i64));
//!
//! let query = MemoryQuery::new("messages:all", &messages, Format::plural());
//! let view = View::new(query.materialize(), query.format(), ViewOptions::default());
//! assert_eq!(view.current_value().root().len(), 1);
//!
//! // Changes become visible at the next commit
//! messages.add(Row::new().with("id", 2i64).with("createdAt", 20i64));
//! assert_eq!(view.current_value().root().len(), 1);
//! messages.commit();
//! assert_eq!(view.current_value().root().len(), 2);
//! ```

#![no_std]

extern crate alloc;

pub mod apply;
pub mod change;
pub mod entry;
pub mod memory;
pub mod source;
pub mod view;

pub use apply::{apply_change, apply_changes};
pub use change::{materialize_relationships, Change, Node, NodeStream, Relationship};
pub use entry::{Entry, RowEntry, Slot};
pub use memory::{MemoryQuery, MemorySource};
pub use source::{Input, Materialization, Output, Query};
pub use view::{MalformedChange, View, ViewListener, ViewOptions};
