//! In-memory query source.
//!
//! `MemorySource` stands in for one table of the synchronized-query engine. It
//! keeps its rows sorted by the table's `SourceSchema`, serves `fetch` from
//! them and pushes a `Change` to every connected output whenever a row is
//! added, removed or edited. Relationships resolve lazily against child
//! sources through a join column, and a change to a child row reaches the
//! outputs of every parent row that owns it as a `Child` change.
//!
//! `MemoryQuery` wraps a source as a `Query` and counts how often it is
//! materialized.

use crate::change::{Change, Node, Relationship};
use crate::source::{Input, Materialization, Output, Query};
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use syncview_core::schema::SourceSchema;
use syncview_core::{Deferred, Error, Format, QueryComplete, Result, Row, TransactionSignal, Value};
use tracing::debug;

type RowFilter = Rc<dyn Fn(&Row) -> bool>;
type ConnectionId = u64;

struct Connection {
    id: ConnectionId,
    output: Weak<RefCell<dyn Output>>,
    filter: Option<RowFilter>,
}

impl Connection {
    /// Translates a change into what this connection's filter lets through.
    ///
    /// An edit that moves a row across the filter becomes an add or remove.
    fn route(&self, state: &SourceState, change: &Change) -> Option<Change> {
        let Some(filter) = &self.filter else {
            return Some(change.clone());
        };
        match change {
            Change::Edit { old_row, row } => match (filter(old_row), filter(row)) {
                (true, true) => Some(change.clone()),
                (true, false) => Some(Change::remove(state.node(old_row.clone()))),
                (false, true) => Some(Change::add(state.node(row.clone()))),
                (false, false) => None,
            },
            other => filter(other.row()).then(|| other.clone()),
        }
    }
}

struct ChildLink {
    name: String,
    child: MemorySource,
    parent_column: String,
    child_column: String,
}

struct ParentLink {
    name: String,
    parent: Weak<RefCell<SourceState>>,
    parent_column: String,
    child_column: String,
}

struct SourceState {
    schema: SourceSchema,
    rows: Vec<Row>,
    children: Vec<ChildLink>,
    parents: Vec<ParentLink>,
    connections: Vec<Connection>,
    next_connection: ConnectionId,
}

impl SourceState {
    fn node(&self, row: Row) -> Node {
        let mut node = Node::new(row);
        for link in &self.children {
            let key = node.row.get_or_null(&link.parent_column).clone();
            let child = link.child.clone();
            let column = link.child_column.clone();
            node.relationships.insert(
                link.name.clone(),
                Relationship::lazy(move || Box::new(child.matching(&column, &key).into_iter())),
            );
        }
        node
    }

    fn position_of(&self, row: &Row) -> Option<usize> {
        self.rows.iter().position(|r| self.schema.same_row(r, row))
    }

    fn insert_sorted(&mut self, row: Row) {
        let schema = &self.schema;
        let at = self
            .rows
            .partition_point(|r| schema.compare_rows(r, &row) != Ordering::Greater);
        self.rows.insert(at, row);
    }
}

/// One in-memory table feeding live queries.
#[derive(Clone)]
pub struct MemorySource {
    state: Rc<RefCell<SourceState>>,
    commits: TransactionSignal,
}

impl MemorySource {
    /// Creates an empty source with its own transaction signal.
    pub fn new(schema: SourceSchema) -> Self {
        Self::with_commits(schema, TransactionSignal::new())
    }

    /// Creates an empty source committing through an existing signal.
    ///
    /// Sources joined by relationships should share one signal so a commit
    /// covers changes made to any of them.
    pub fn with_commits(schema: SourceSchema, commits: TransactionSignal) -> Self {
        Self {
            state: Rc::new(RefCell::new(SourceState {
                schema,
                rows: Vec::new(),
                children: Vec::new(),
                parents: Vec::new(),
                connections: Vec::new(),
                next_connection: 1,
            })),
            commits,
        }
    }

    /// Joins `child` as the relationship `name`: a child row belongs to every
    /// parent row whose `parent_column` equals the child's `child_column`.
    ///
    /// The relationship must be declared in this source's schema with the
    /// child's schema.
    pub fn with_relationship(
        &self,
        name: impl Into<String>,
        child: &MemorySource,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        let parent_column = parent_column.into();
        let child_column = child_column.into();
        {
            let state = self.state.borrow();
            match state.schema.relationship(&name) {
                Some(declared) if *declared == child.schema() => {}
                Some(_) => {
                    return Err(Error::invalid_schema(alloc::format!(
                        "relationship {} of {} does not match the child source's schema",
                        name,
                        state.schema.name()
                    )))
                }
                None => return Err(Error::unknown_relationship(state.schema.name(), name)),
            }
        }
        child.state.borrow_mut().parents.push(ParentLink {
            name: name.clone(),
            parent: Rc::downgrade(&self.state),
            parent_column: parent_column.clone(),
            child_column: child_column.clone(),
        });
        self.state.borrow_mut().children.push(ChildLink {
            name,
            child: child.clone(),
            parent_column,
            child_column,
        });
        Ok(())
    }

    /// Returns a copy of the source's schema.
    pub fn schema(&self) -> SourceSchema {
        self.state.borrow().schema.clone()
    }

    /// Returns the transaction signal fired by `commit`.
    pub fn commits(&self) -> TransactionSignal {
        self.commits.clone()
    }

    /// Returns the rows in schema order.
    pub fn rows(&self) -> Vec<Row> {
        self.state.borrow().rows.clone()
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.state.borrow().rows.len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().rows.is_empty()
    }

    /// Returns the number of live outputs connected to this source.
    pub fn connection_count(&self) -> usize {
        self.state.borrow().connections.len()
    }

    /// Opens an input over every row.
    pub fn input(&self) -> Box<dyn Input> {
        self.open(None)
    }

    /// Opens an input over the rows accepted by `filter`.
    pub fn filtered_input<F>(&self, filter: F) -> Box<dyn Input>
    where
        F: Fn(&Row) -> bool + 'static,
    {
        self.open(Some(Rc::new(filter)))
    }

    fn open(&self, filter: Option<RowFilter>) -> Box<dyn Input> {
        let schema = self.schema();
        Box::new(MemoryInput {
            source: self.clone(),
            schema,
            filter,
            connection: None,
        })
    }

    /// Inserts a row and pushes the resulting changes.
    ///
    /// Adding a row whose key is already stored keeps both copies, the way an
    /// engine delivers a duplicate add.
    pub fn add(&self, row: Row) {
        let change = {
            let mut state = self.state.borrow_mut();
            state.insert_sorted(row.clone());
            Change::add(state.node(row))
        };
        propagate(&self.state, change);
    }

    /// Removes the stored row with `row`'s key and pushes the resulting changes.
    pub fn remove(&self, row: &Row) -> Result<()> {
        let change = {
            let mut state = self.state.borrow_mut();
            let at = state
                .position_of(row)
                .ok_or_else(|| Error::row_not_found(state.schema.name(), state.schema.row_key(row)))?;
            let removed = state.rows.remove(at);
            Change::remove(state.node(removed))
        };
        propagate(&self.state, change);
        Ok(())
    }

    /// Replaces the stored row with `old_row`'s key by `row`.
    pub fn edit(&self, old_row: &Row, row: Row) -> Result<()> {
        let change = {
            let mut state = self.state.borrow_mut();
            let at = state.position_of(old_row).ok_or_else(|| {
                Error::row_not_found(state.schema.name(), state.schema.row_key(old_row))
            })?;
            let previous = state.rows.remove(at);
            state.insert_sorted(row.clone());
            Change::edit(previous, row)
        };
        propagate(&self.state, change);
        Ok(())
    }

    /// Fires the transaction signal.
    pub fn commit(&self) {
        self.commits.commit();
    }

    /// Builds the nodes of every child row whose `column` equals `key`.
    fn matching(&self, column: &str, key: &Value) -> Vec<Node> {
        let state = self.state.borrow();
        state
            .rows
            .iter()
            .filter(|r| r.get_or_null(column) == key)
            .map(|r| state.node(r.clone()))
            .collect()
    }

    fn nodes(&self, filter: Option<&RowFilter>) -> Vec<Node> {
        let state = self.state.borrow();
        state
            .rows
            .iter()
            .filter(|r| filter.map_or(true, |f| f(r)))
            .map(|r| state.node(r.clone()))
            .collect()
    }

    fn connect(&self, output: Weak<RefCell<dyn Output>>, filter: Option<RowFilter>) -> ConnectionId {
        let mut state = self.state.borrow_mut();
        let id = state.next_connection;
        state.next_connection += 1;
        state.connections.push(Connection { id, output, filter });
        debug!(table = state.schema.name(), connection = id, "output connected");
        id
    }

    fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.borrow_mut();
        state.connections.retain(|c| c.id != id);
        debug!(table = state.schema.name(), connection = id, "output disconnected");
    }
}

/// Delivers `change` to the outputs of `source` and, wrapped as a child
/// change, to the outputs of every parent row owning the changed row.
fn propagate(source: &Rc<RefCell<SourceState>>, change: Change) {
    let (deliveries, parents) = {
        let state = source.borrow();
        let deliveries: Vec<(Weak<RefCell<dyn Output>>, Change)> = state
            .connections
            .iter()
            .filter_map(|c| Some((c.output.clone(), c.route(&state, &change)?)))
            .collect();
        let parents: Vec<(Rc<RefCell<SourceState>>, String, Vec<(Row, Change)>)> = state
            .parents
            .iter()
            .filter_map(|link| {
                let parent = link.parent.upgrade()?;
                let owned = owner_changes(&state, &parent.borrow(), link, &change);
                Some((parent, link.name.clone(), owned))
            })
            .collect();
        (deliveries, parents)
    };

    for (output, change) in deliveries {
        if let Some(output) = output.upgrade() {
            output.borrow_mut().push(change);
        }
    }
    for (parent, name, owned) in parents {
        for (owner, change) in owned {
            propagate(&parent, Change::child(owner, name.clone(), change));
        }
    }
}

/// Pairs each parent row affected by a child `change` with the change it sees.
///
/// An edit that moves the child to another parent is a remove for the old
/// owners and an add for the new ones.
fn owner_changes(
    child: &SourceState,
    parent: &SourceState,
    link: &ParentLink,
    change: &Change,
) -> Vec<(Row, Change)> {
    let owners = |row: &Row| -> Vec<Row> {
        let key = row.get_or_null(&link.child_column);
        parent
            .rows
            .iter()
            .filter(|r| r.get_or_null(&link.parent_column) == key)
            .cloned()
            .collect()
    };
    match change {
        Change::Edit { old_row, row }
            if old_row.get_or_null(&link.child_column) != row.get_or_null(&link.child_column) =>
        {
            let removed = Change::remove(child.node(old_row.clone()));
            let added = Change::add(child.node(row.clone()));
            let mut owned: Vec<(Row, Change)> =
                owners(old_row).into_iter().map(|owner| (owner, removed.clone())).collect();
            owned.extend(owners(row).into_iter().map(|owner| (owner, added.clone())));
            owned
        }
        other => owners(other.row()).into_iter().map(|owner| (owner, other.clone())).collect(),
    }
}

struct MemoryInput {
    source: MemorySource,
    schema: SourceSchema,
    filter: Option<RowFilter>,
    connection: Option<ConnectionId>,
}

impl Input for MemoryInput {
    fn set_output(&mut self, output: Weak<RefCell<dyn Output>>) {
        let id = self.source.connect(output, self.filter.clone());
        self.connection = Some(id);
    }

    fn fetch(&mut self) -> Vec<Node> {
        self.source.nodes(self.filter.as_ref())
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn destroy(&mut self) {
        if let Some(id) = self.connection.take() {
            self.source.disconnect(id);
        }
    }
}

/// A query over one `MemorySource`.
///
/// Clones share the materialization counter.
#[derive(Clone)]
pub struct MemoryQuery {
    hash: String,
    source: MemorySource,
    format: Format,
    filter: Option<RowFilter>,
    completion: Option<Deferred>,
    materialize_count: Rc<Cell<usize>>,
}

impl MemoryQuery {
    /// Creates a query that is complete as soon as it is materialized.
    pub fn new(hash: impl Into<String>, source: &MemorySource, format: Format) -> Self {
        Self {
            hash: hash.into(),
            source: source.clone(),
            format,
            filter: None,
            completion: None,
            materialize_count: Rc::new(Cell::new(0)),
        }
    }

    /// Restricts the query to rows accepted by `filter`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Row) -> bool + 'static,
    {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Makes the query's result complete only once `deferred` resolves.
    pub fn with_completion(mut self, deferred: Deferred) -> Self {
        self.completion = Some(deferred);
        self
    }

    /// Returns how many times the query has been materialized.
    pub fn materialize_count(&self) -> usize {
        self.materialize_count.get()
    }
}

impl Query for MemoryQuery {
    fn hash(&self) -> String {
        self.hash.clone()
    }

    fn format(&self) -> Format {
        self.format.clone()
    }

    fn materialize(&self) -> Materialization {
        self.materialize_count.set(self.materialize_count.get() + 1);
        debug!(query = %self.hash, "materializing memory query");
        Materialization {
            input: self.source.open(self.filter.clone()),
            commits: self.source.commits(),
            query_complete: match &self.completion {
                Some(deferred) => QueryComplete::Pending(deferred.clone()),
                None => QueryComplete::Ready,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use syncview_core::schema::Order;

    #[derive(Default)]
    struct Recorder {
        changes: Vec<Change>,
    }

    impl Output for Recorder {
        fn push(&mut self, change: Change) {
            self.changes.push(change);
        }
    }

    fn message_schema() -> SourceSchema {
        SourceSchema::builder("messages")
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .order_by("createdAt", Order::Asc)
            .build()
            .unwrap()
    }

    fn chat_schema() -> SourceSchema {
        SourceSchema::builder("chats")
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .relationship("messages", message_schema())
            .unwrap()
            .build()
            .unwrap()
    }

    fn message(id: i64, chat: i64, at: i64) -> Row {
        Row::new().with("id", id).with("chatId", chat).with("createdAt", at)
    }

    fn connect(input: &mut Box<dyn Input>) -> Rc<RefCell<Recorder>> {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let weak: Weak<RefCell<dyn Output>> = Rc::downgrade(&recorder) as Weak<RefCell<dyn Output>>;
        input.set_output(weak);
        recorder
    }

    #[test]
    fn test_rows_kept_in_schema_order() {
        let source = MemorySource::new(message_schema());
        source.add(message(1, 1, 30));
        source.add(message(2, 1, 10));
        source.add(message(3, 1, 20));

        let ids: Vec<i64> = source.rows().iter().filter_map(|r| r.get("id")?.as_i64()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let mut input = source.input();
        let fetched: Vec<i64> = input.fetch().iter().filter_map(|n| n.row.get("id")?.as_i64()).collect();
        assert_eq!(fetched, vec![2, 3, 1]);
    }

    #[test]
    fn test_push_to_connected_output() {
        let source = MemorySource::new(message_schema());
        let mut input = source.input();
        let recorder = connect(&mut input);
        assert_eq!(source.connection_count(), 1);

        source.add(message(1, 1, 10));
        source.edit(&message(1, 1, 10), message(1, 1, 15)).unwrap();
        source.remove(&message(1, 1, 15)).unwrap();

        let kinds: Vec<&str> = recorder.borrow().changes.iter().map(Change::kind).collect();
        assert_eq!(kinds, vec!["add", "edit", "remove"]);

        input.destroy();
        assert_eq!(source.connection_count(), 0);
        source.add(message(2, 1, 10));
        assert_eq!(recorder.borrow().changes.len(), 3);
    }

    #[test]
    fn test_remove_missing_row() {
        let source = MemorySource::new(message_schema());
        let err = source.remove(&message(9, 1, 0)).unwrap_err();
        assert!(err.is_row_not_found());
    }

    #[test]
    fn test_filter_turns_edits_into_adds_and_removes() {
        let source = MemorySource::new(message_schema());
        let mut input = source.filtered_input(|r| r.get("chatId").and_then(Value::as_i64) == Some(1));
        let recorder = connect(&mut input);

        source.add(message(1, 2, 10));
        source.edit(&message(1, 2, 10), message(1, 1, 10)).unwrap();
        source.edit(&message(1, 1, 10), message(1, 1, 20)).unwrap();
        source.edit(&message(1, 1, 20), message(1, 3, 20)).unwrap();

        let kinds: Vec<&str> = recorder.borrow().changes.iter().map(Change::kind).collect();
        assert_eq!(kinds, vec!["add", "edit", "remove"]);
    }

    #[test]
    fn test_child_changes_reach_parent_outputs() {
        let chats = MemorySource::new(chat_schema());
        let messages = MemorySource::with_commits(message_schema(), chats.commits());
        chats.with_relationship("messages", &messages, "id", "chatId").unwrap();

        chats.add(Row::new().with("id", 1i64));
        chats.add(Row::new().with("id", 2i64));
        let mut input = chats.input();
        let recorder = connect(&mut input);

        messages.add(message(10, 1, 5));

        let recorded = recorder.borrow();
        assert_eq!(recorded.changes.len(), 1);
        match &recorded.changes[0] {
            Change::Child { row, relationship, change } => {
                assert_eq!(row.get("id"), Some(&Value::Int64(1)));
                assert_eq!(relationship, "messages");
                assert_eq!(change.kind(), "add");
            }
            other => panic!("expected child change, got {:?}", other),
        }
    }

    #[test]
    fn test_child_moving_between_parents() {
        let chats = MemorySource::new(chat_schema());
        let messages = MemorySource::with_commits(message_schema(), chats.commits());
        chats.with_relationship("messages", &messages, "id", "chatId").unwrap();

        chats.add(Row::new().with("id", 1i64));
        chats.add(Row::new().with("id", 2i64));
        messages.add(message(10, 1, 5));
        let mut input = chats.input();
        let recorder = connect(&mut input);

        messages.edit(&message(10, 1, 5), message(10, 1, 6)).unwrap();
        messages.edit(&message(10, 1, 6), message(10, 2, 6)).unwrap();

        let recorded = recorder.borrow();
        let seen: Vec<(i64, &str)> = recorded
            .changes
            .iter()
            .map(|c| match c {
                Change::Child { row, change, .. } => (row.get("id").and_then(Value::as_i64).unwrap(), change.kind()),
                other => panic!("expected child change, got {:?}", other),
            })
            .collect();
        assert_eq!(seen, vec![(1, "edit"), (1, "remove"), (2, "add")]);
    }

    #[test]
    fn test_lazy_relationship_reads_current_children() {
        let chats = MemorySource::new(chat_schema());
        let messages = MemorySource::with_commits(message_schema(), chats.commits());
        chats.with_relationship("messages", &messages, "id", "chatId").unwrap();
        chats.add(Row::new().with("id", 1i64));
        messages.add(message(10, 1, 5));
        messages.add(message(11, 2, 5));

        let mut input = chats.input();
        let nodes = input.fetch();
        let children: Vec<Node> = nodes[0].relationship("messages").unwrap().nodes().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].row, message(10, 1, 5));
    }

    #[test]
    fn test_relationship_must_be_declared() {
        let chats = MemorySource::new(chat_schema());
        let messages = MemorySource::new(message_schema());
        assert!(chats.with_relationship("reactions", &messages, "id", "chatId").is_err());
        assert!(messages.with_relationship("messages", &chats, "chatId", "id").is_err());
    }

    #[test]
    fn test_memory_query_counts_materializations() {
        let source = MemorySource::new(message_schema());
        let deferred = Deferred::new();
        let query = MemoryQuery::new("messages:all", &source, Format::plural()).with_completion(deferred.clone());

        assert_eq!(query.hash(), "messages:all");
        let materialization = query.materialize();
        assert!(!materialization.query_complete.is_complete());
        deferred.resolve();
        assert!(materialization.query_complete.is_complete());

        let copy = query.clone();
        let _ = copy.materialize();
        assert_eq!(query.materialize_count(), 2);
    }
}
