//! Schema module for synchronized query sources.
//!
//! A `SourceSchema` describes how the query engine identifies and orders the
//! rows of one table, and which named relationships hang off each row.

mod ordering;
mod source;

pub use ordering::{Order, Ordering};
pub use source::{SourceSchema, SourceSchemaBuilder};
