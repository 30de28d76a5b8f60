//! Query engine collaborator contracts.
//!
//! The view layer never executes queries. It consumes these traits, which the
//! synchronized-query engine implements:
//!
//! - `Query`: a query definition with a stable content hash and result format
//! - `Input`: one live execution of a query, feeding exactly one `Output`
//! - `Output`: the change sink a `View` registers on its input

use crate::change::{Change, Node};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::rc::Weak;
use alloc::vec::Vec;
use core::cell::RefCell;
use syncview_core::schema::SourceSchema;
use syncview_core::{Format, QueryComplete, TransactionSignal};

/// Receives the changes of one live query.
pub trait Output {
    /// Delivers one change. Lazy relationship producers inside `change` are
    /// only valid for the duration of this call.
    fn push(&mut self, change: Change);
}

/// One live execution of a query.
pub trait Input {
    /// Registers the change sink. Called exactly once per input.
    fn set_output(&mut self, output: Weak<RefCell<dyn Output>>);

    /// Enumerates the rows currently matching the query, in engine order.
    ///
    /// Must not push into the registered output while running.
    fn fetch(&mut self) -> Vec<Node>;

    /// Returns the schema of the rows this input produces.
    fn schema(&self) -> &SourceSchema;

    /// Releases the upstream subscription. No changes are pushed afterwards.
    fn destroy(&mut self);
}

/// Everything a view needs from one `Query::materialize` call.
pub struct Materialization {
    /// The live execution.
    pub input: Box<dyn Input>,
    /// Fired by the engine at each transaction commit.
    pub commits: TransactionSignal,
    /// Whether the result is already known to be complete.
    pub query_complete: QueryComplete,
}

/// A query definition that can be materialized.
pub trait Query {
    /// Stable hash of the query's semantic identity.
    fn hash(&self) -> String;

    /// Shape of the query's result.
    fn format(&self) -> Format;

    /// Starts a live execution of the query.
    fn materialize(&self) -> Materialization;
}
