//! Materialized result tree.
//!
//! An `Entry` is the consumer-facing value of a query: a single root slot that
//! is either singular (no row yet, or exactly one row) or plural (an ordered
//! list of rows). Each `RowEntry` holds the row's columns and one slot per
//! relationship named in the query's `Format`.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use serde_json::{Map, Value as JsonValue};
use syncview_core::{Format, Row};

/// A materialized slot: the root of a query or one relationship of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// Singular shape: no row yet, or exactly one row.
    Singular(Option<RowEntry>),
    /// Plural shape: rows in the engine's order.
    Plural(Vec<RowEntry>),
}

impl Slot {
    /// Creates the empty slot for a format.
    pub fn empty(format: &Format) -> Self {
        if format.is_singular() {
            Slot::Singular(None)
        } else {
            Slot::Plural(Vec::new())
        }
    }

    /// Returns true if the slot holds no rows.
    pub fn is_empty(&self) -> bool {
        match self {
            Slot::Singular(entry) => entry.is_none(),
            Slot::Plural(entries) => entries.is_empty(),
        }
    }

    /// Returns the number of rows in the slot.
    pub fn len(&self) -> usize {
        match self {
            Slot::Singular(entry) => usize::from(entry.is_some()),
            Slot::Plural(entries) => entries.len(),
        }
    }

    /// Returns true for the singular shape.
    #[inline]
    pub fn is_singular(&self) -> bool {
        matches!(self, Slot::Singular(_))
    }

    /// Returns the single row entry, if this is a singular slot holding one.
    pub fn as_singular(&self) -> Option<&RowEntry> {
        match self {
            Slot::Singular(entry) => entry.as_ref(),
            Slot::Plural(_) => None,
        }
    }

    /// Returns the row entries if this is a plural slot.
    pub fn as_plural(&self) -> Option<&[RowEntry]> {
        match self {
            Slot::Singular(_) => None,
            Slot::Plural(entries) => Some(entries),
        }
    }

    /// Iterates over the rows of the slot, in order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        let entries: &[RowEntry] = match self {
            Slot::Singular(Some(entry)) => core::slice::from_ref(entry),
            Slot::Singular(None) => &[],
            Slot::Plural(entries) => entries,
        };
        entries.iter().map(|e| &e.row)
    }

    /// Converts the slot into JSON: `null`, an object, or an array.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Slot::Singular(None) => JsonValue::Null,
            Slot::Singular(Some(entry)) => entry.to_json(),
            Slot::Plural(entries) => JsonValue::Array(entries.iter().map(RowEntry::to_json).collect()),
        }
    }
}

/// A materialized row with its relationship slots.
#[derive(Clone, Debug, PartialEq)]
pub struct RowEntry {
    pub(crate) row: Row,
    pub(crate) relationships: BTreeMap<String, Slot>,
    /// Number of times the engine has added this row without removing it.
    pub(crate) ref_count: u32,
}

impl RowEntry {
    /// Creates an entry with an empty slot for every relationship in `format`.
    pub(crate) fn new(row: Row, format: &Format) -> Self {
        let relationships = format
            .relationships()
            .iter()
            .map(|(name, child)| (name.clone(), Slot::empty(child)))
            .collect();
        Self {
            row,
            relationships,
            ref_count: 1,
        }
    }

    /// Returns the row.
    #[inline]
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Gets a relationship slot by name.
    #[inline]
    pub fn relationship(&self, name: &str) -> Option<&Slot> {
        self.relationships.get(name)
    }

    /// Returns all relationship slots.
    #[inline]
    pub fn relationships(&self) -> &BTreeMap<String, Slot> {
        &self.relationships
    }

    /// Returns how many outstanding adds this entry represents.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Converts the entry into a JSON object of its columns and relationships.
    ///
    /// A relationship named like a column shadows that column.
    pub fn to_json(&self) -> JsonValue {
        let mut map: Map<String, JsonValue> = self.row.to_json_map();
        for (name, slot) in &self.relationships {
            map.insert(name.clone(), slot.to_json());
        }
        JsonValue::Object(map)
    }
}

/// The materialized value of a query.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    root: Slot,
}

impl Entry {
    /// Creates the empty entry for a format.
    pub fn empty(format: &Format) -> Self {
        Self {
            root: Slot::empty(format),
        }
    }

    /// Returns the root slot.
    #[inline]
    pub fn root(&self) -> &Slot {
        &self.root
    }

    #[inline]
    pub(crate) fn root_mut(&mut self) -> &mut Slot {
        &mut self.root
    }

    /// Returns true if the root holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Converts the root slot into JSON.
    pub fn to_json(&self) -> JsonValue {
        self.root.to_json()
    }
}
