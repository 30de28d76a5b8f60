//! Change model for incremental view maintenance.
//!
//! A `Change` is one row-level delta delivered by the query engine. `Add` and
//! `Remove` carry a `Node`: the row plus, per relationship name, a producer of
//! child nodes. Producers handed out by the engine are lazy and only valid
//! during the tick the change was delivered in; `materialize_relationships`
//! snapshots them into owned node lists so the change can be queued.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use syncview_core::Row;

/// A stream of child nodes produced by a relationship.
pub type NodeStream = Box<dyn Iterator<Item = Node>>;

/// Child nodes of one named relationship.
#[derive(Clone)]
pub enum Relationship {
    /// Produces children on demand. Only valid for the current tick.
    Lazy(Rc<dyn Fn() -> NodeStream>),
    /// Owned snapshot of the children.
    Materialized(Vec<Node>),
}

impl Relationship {
    /// Creates a lazy relationship from a producer.
    pub fn lazy<F>(producer: F) -> Self
    where
        F: Fn() -> NodeStream + 'static,
    {
        Relationship::Lazy(Rc::new(producer))
    }

    /// Enumerates the child nodes.
    pub fn nodes(&self) -> NodeStream {
        match self {
            Relationship::Lazy(producer) => producer(),
            Relationship::Materialized(nodes) => Box::new(nodes.clone().into_iter()),
        }
    }

    /// Returns true if this relationship, and every relationship below it,
    /// holds owned data.
    pub fn is_materialized(&self) -> bool {
        match self {
            Relationship::Lazy(_) => false,
            Relationship::Materialized(nodes) => nodes.iter().all(Node::is_materialized),
        }
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relationship::Lazy(_) => f.write_str("Lazy(..)"),
            Relationship::Materialized(nodes) => f.debug_tuple("Materialized").field(nodes).finish(),
        }
    }
}

/// A row together with its relationships.
#[derive(Clone, Debug)]
pub struct Node {
    /// The row itself.
    pub row: Row,
    /// Child producers keyed by relationship name.
    pub relationships: BTreeMap<String, Relationship>,
}

impl Node {
    /// Creates a node without relationships.
    pub fn new(row: Row) -> Self {
        Self {
            row,
            relationships: BTreeMap::new(),
        }
    }

    /// Returns this node with an added relationship.
    pub fn with_relationship(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
        self.relationships.insert(name.into(), relationship);
        self
    }

    /// Gets a relationship by name.
    #[inline]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Returns true if no lazy producer is reachable from this node.
    pub fn is_materialized(&self) -> bool {
        self.relationships.values().all(Relationship::is_materialized)
    }

    /// Replaces every lazy producer below this node with an owned snapshot.
    pub fn materialize(self) -> Node {
        let relationships = self
            .relationships
            .into_iter()
            .map(|(name, relationship)| {
                let children: Vec<Node> = relationship.nodes().map(Node::materialize).collect();
                (name, Relationship::Materialized(children))
            })
            .collect();
        Node {
            row: self.row,
            relationships,
        }
    }
}

/// A single row-level delta.
#[derive(Clone, Debug)]
pub enum Change {
    /// A row entered the result.
    Add { node: Node },
    /// A row left the result.
    Remove { node: Node },
    /// A row's columns changed. Relationships are untouched.
    Edit { old_row: Row, row: Row },
    /// A change inside the named relationship of the row.
    Child {
        row: Row,
        relationship: String,
        change: Box<Change>,
    },
}

impl Change {
    /// Creates an add change.
    #[inline]
    pub fn add(node: Node) -> Self {
        Change::Add { node }
    }

    /// Creates a remove change.
    #[inline]
    pub fn remove(node: Node) -> Self {
        Change::Remove { node }
    }

    /// Creates an edit change.
    #[inline]
    pub fn edit(old_row: Row, row: Row) -> Self {
        Change::Edit { old_row, row }
    }

    /// Creates a child change addressed at `row`'s `relationship`.
    pub fn child(row: Row, relationship: impl Into<String>, change: Change) -> Self {
        Change::Child {
            row,
            relationship: relationship.into(),
            change: Box::new(change),
        }
    }

    /// Returns the row this change addresses.
    ///
    /// For edits this is the old row, the one currently in the view.
    pub fn row(&self) -> &Row {
        match self {
            Change::Add { node } | Change::Remove { node } => &node.row,
            Change::Edit { old_row, .. } => old_row,
            Change::Child { row, .. } => row,
        }
    }

    /// Returns the change kind as a static label, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Remove { .. } => "remove",
            Change::Edit { .. } => "edit",
            Change::Child { .. } => "child",
        }
    }

    /// Returns true if no lazy producer is reachable from this change.
    pub fn is_materialized(&self) -> bool {
        match self {
            Change::Add { node } | Change::Remove { node } => node.is_materialized(),
            Change::Edit { .. } => true,
            Change::Child { change, .. } => change.is_materialized(),
        }
    }
}

/// Snapshots every lazy relationship producer reachable from `change`.
///
/// Nesting depth follows the schema's relationship depth, not the amount of
/// data, so the recursion stays shallow.
pub fn materialize_relationships(change: Change) -> Change {
    match change {
        Change::Add { node } => Change::Add {
            node: node.materialize(),
        },
        Change::Remove { node } => Change::Remove {
            node: node.materialize(),
        },
        Change::Edit { old_row, row } => Change::Edit { old_row, row },
        Change::Child {
            row,
            relationship,
            change,
        } => Change::Child {
            row,
            relationship,
            change: Box::new(materialize_relationships(*change)),
        },
    }
}
