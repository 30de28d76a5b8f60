//! Transaction-batched materialized view.
//!
//! A `View` is the change sink of one live query. It applies the query's
//! initial rows, then receives changes from the engine and exposes only
//! states as of a transaction commit:
//!
//! - While the committed entry is empty, changes build a separate
//!   *builder root* that replaces the committed entry at the next commit.
//! - Otherwise changes are queued, with their relationships materialized at
//!   enqueue time, and applied in arrival order at the next commit onto a
//!   copy-on-write clone of the committed entry.
//!
//! Listeners are called with the committed entry and its completeness after
//! every commit that changed something and once when the query completes.

use crate::apply::apply_change;
use crate::change::{materialize_relationships, Change};
use crate::entry::{Entry, Slot};
use crate::source::{Input, Materialization, Output};
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use syncview_core::schema::SourceSchema;
use syncview_core::{Format, ListenerId, QueryComplete, ResultType, TransactionSignal};
use tracing::{debug, warn};

/// Callback receiving each committed state of a view.
pub type ViewListener = Rc<dyn Fn(&Rc<Entry>, ResultType)>;

/// What a view does with a change it cannot apply, such as a remove of a row
/// it does not hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedChange {
    /// Skip the change silently.
    Ignore,
    /// Log a warning and skip the change.
    #[default]
    Warn,
    /// Panic. Meant for tests and debugging.
    Panic,
}

/// Options applied to every view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub on_malformed_change: MalformedChange,
}

impl ViewOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the malformed-change policy.
    pub fn with_malformed_change(mut self, policy: MalformedChange) -> Self {
        self.on_malformed_change = policy;
        self
    }
}

struct ViewState {
    input: Option<Box<dyn Input>>,
    schema: SourceSchema,
    format: Format,
    options: ViewOptions,
    committed: Rc<Entry>,
    result_type: ResultType,
    builder_root: Option<Entry>,
    pending: Vec<Change>,
    listeners: Vec<(ListenerId, ViewListener)>,
    next_listener_id: ListenerId,
    commits: TransactionSignal,
    commit_listener: Option<ListenerId>,
    destroyed: bool,
}

impl ViewState {
    /// Publishes the builder root or the pending changes.
    ///
    /// Returns true if the committed entry changed.
    fn commit(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        if let Some(builder) = self.builder_root.take() {
            if builder.is_empty() {
                self.builder_root = Some(builder);
                return false;
            }
            debug!(table = self.schema.name(), rows = builder.root().len(), "committing builder root");
            self.committed = Rc::new(builder);
            return true;
        }
        if self.pending.is_empty() {
            return false;
        }

        let pending = core::mem::take(&mut self.pending);
        debug!(table = self.schema.name(), changes = pending.len(), "committing pending changes");
        let entry = Rc::make_mut(&mut self.committed);
        for change in &pending {
            apply_or_skip(
                entry.root_mut(),
                change,
                &self.schema,
                &self.format,
                self.options.on_malformed_change,
            );
        }
        if self.committed.is_empty() {
            self.builder_root = Some(Entry::empty(&self.format));
        }
        true
    }

    fn snapshot(&self) -> (Vec<ViewListener>, Rc<Entry>, ResultType) {
        let listeners = self.listeners.iter().map(|(_, l)| l.clone()).collect();
        (listeners, self.committed.clone(), self.result_type)
    }
}

impl Output for ViewState {
    fn push(&mut self, change: Change) {
        if self.destroyed {
            debug!(table = self.schema.name(), kind = change.kind(), "ignoring change pushed after destroy");
            return;
        }
        let policy = self.options.on_malformed_change;
        match self.builder_root.as_mut() {
            Some(builder) => apply_or_skip(builder.root_mut(), &change, &self.schema, &self.format, policy),
            None => self.pending.push(materialize_relationships(change)),
        }
    }
}

fn apply_or_skip(
    slot: &mut Slot,
    change: &Change,
    schema: &SourceSchema,
    format: &Format,
    policy: MalformedChange,
) {
    if let Err(err) = apply_change(slot, change, schema, format) {
        match policy {
            MalformedChange::Ignore => {}
            MalformedChange::Warn => {
                warn!(table = schema.name(), kind = change.kind(), error = %err, "skipping malformed change")
            }
            MalformedChange::Panic => {
                panic!("malformed {} change for {}: {}", change.kind(), schema.name(), err)
            }
        }
    }
}

fn notify(inner: &Rc<RefCell<ViewState>>) {
    let (listeners, entry, result_type) = inner.borrow().snapshot();
    for listener in listeners {
        listener(&entry, result_type);
    }
}

fn on_commit(inner: &Rc<RefCell<ViewState>>) {
    let changed = inner.borrow_mut().commit();
    if changed {
        notify(inner);
    }
}

fn on_complete(inner: &Rc<RefCell<ViewState>>) {
    {
        let mut state = inner.borrow_mut();
        if state.destroyed || state.result_type.is_complete() {
            return;
        }
        state.result_type = ResultType::Complete;
        debug!(table = state.schema.name(), "query complete");
    }
    notify(inner);
}

/// A live, transaction-batched materialization of one query.
///
/// Cloning yields another handle to the same view.
#[derive(Clone)]
pub struct View {
    inner: Rc<RefCell<ViewState>>,
}

impl View {
    /// Builds a view from a materialized query.
    ///
    /// Registers the view as the input's output, applies the input's current
    /// rows as adds and subscribes to the engine's commits.
    pub fn new(materialization: Materialization, format: Format, options: ViewOptions) -> Self {
        let Materialization {
            mut input,
            commits,
            query_complete,
        } = materialization;

        let schema = input.schema().clone();
        let inner = Rc::new(RefCell::new(ViewState {
            input: None,
            schema: schema.clone(),
            format: format.clone(),
            options,
            committed: Rc::new(Entry::empty(&format)),
            result_type: ResultType::Unknown,
            builder_root: None,
            pending: Vec::new(),
            listeners: Vec::new(),
            next_listener_id: 1,
            commits: commits.clone(),
            commit_listener: None,
            destroyed: false,
        }));

        let output: Weak<RefCell<dyn Output>> = Rc::downgrade(&inner) as Weak<RefCell<dyn Output>>;
        input.set_output(output);

        let mut initial = Entry::empty(&format);
        let nodes = input.fetch();
        let fetched = nodes.len();
        for node in nodes {
            apply_or_skip(
                initial.root_mut(),
                &Change::add(node),
                &schema,
                &format,
                options.on_malformed_change,
            );
        }

        let weak = Rc::downgrade(&inner);
        let commit_listener = commits.on_commit(move || {
            if let Some(inner) = weak.upgrade() {
                on_commit(&inner);
            }
        });

        {
            let mut state = inner.borrow_mut();
            if initial.is_empty() {
                state.builder_root = Some(Entry::empty(&format));
            }
            state.committed = Rc::new(initial);
            state.input = Some(input);
            state.commit_listener = Some(commit_listener);
            if query_complete.is_complete() {
                state.result_type = ResultType::Complete;
            }
        }
        debug!(table = schema.name(), rows = fetched, "view materialized");

        if let QueryComplete::Pending(deferred) = query_complete {
            if !deferred.is_resolved() {
                let weak = Rc::downgrade(&inner);
                deferred.then(move || {
                    if let Some(inner) = weak.upgrade() {
                        on_complete(&inner);
                    }
                });
            }
        }

        Self { inner }
    }

    /// Delivers a change as if pushed by the engine.
    pub fn push(&self, change: Change) {
        self.inner.borrow_mut().push(change);
    }

    /// Returns the last committed entry.
    pub fn current_value(&self) -> Rc<Entry> {
        self.inner.borrow().committed.clone()
    }

    /// Returns the completeness of the committed entry.
    pub fn current_result_type(&self) -> ResultType {
        self.inner.borrow().result_type
    }

    /// Returns the result format.
    pub fn format(&self) -> Format {
        self.inner.borrow().format.clone()
    }

    /// Returns the number of changes waiting for the next commit.
    pub fn pending_len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Registers a listener and immediately calls it with the current state.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Rc<Entry>, ResultType) + 'static,
    {
        let listener: ViewListener = Rc::new(listener);
        let (id, entry, result_type) = {
            let mut state = self.inner.borrow_mut();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.push((id, listener.clone()));
            (id, state.committed.clone(), state.result_type)
        };
        listener(&entry, result_type);
        id
    }

    /// Removes a listener.
    ///
    /// Returns true if the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.inner.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() < before
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Releases the upstream subscription and stops listening for commits.
    ///
    /// The last committed entry stays readable. Destroying twice is a no-op.
    pub fn destroy(&self) {
        let (input, commit_listener, commits) = {
            let mut state = self.inner.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.pending.clear();
            state.builder_root = None;
            state.listeners.clear();
            debug!(table = state.schema.name(), "view destroyed");
            (state.input.take(), state.commit_listener.take(), state.commits.clone())
        };
        if let Some(id) = commit_listener {
            commits.remove(id);
        }
        if let Some(mut input) = input {
            input.destroy();
        }
    }

    /// Returns true once `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }
}
