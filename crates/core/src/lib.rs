//! Syncview Core - Shared types for the syncview view materializer.
//!
//! This crate provides the vocabulary the other syncview crates are built on:
//!
//! - `Value`: a column value as delivered by the synchronized-query engine
//! - `Row`: a column-name to value map
//! - `schema`: `SourceSchema`, the engine's row identity, ordering and relationships
//! - `Format` / `ResultType`: result shape and completeness descriptors
//! - `TransactionSignal`, `Deferred`, `QueryComplete`: single-threaded signals
//! - `Error`: error types for the view layer
//!
//! # Example
//!
//! ```rust
//! use syncview_core::{Row, Value};
//! use syncview_core::schema::{Order, SourceSchema};
//!
//! let schema = SourceSchema::builder("messages")
//!     .unwrap()
//!     .primary_key(&["id"])
//!     .unwrap()
//!     .order_by("createdAt", Order::Asc)
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new().with("id", 1i64).with("content", "hello");
//!
//! assert_eq!(schema.row_key(&row), "id=1");
//! assert_eq!(row.get("content"), Some(&Value::String("hello".into())));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod format;
mod row;
pub mod schema;
pub mod signal;
mod value;

pub use error::{Error, Result};
pub use format::{Format, ResultType};
pub use row::Row;
pub use signal::{Deferred, ListenerId, QueryComplete, TransactionSignal};
pub use value::Value;
