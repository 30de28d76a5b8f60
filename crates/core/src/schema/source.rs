//! Source schema definition.

use super::ordering::{Order, Ordering};
use crate::error::{Error, Result};
use crate::row::Row;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering as CmpOrdering;
use core::fmt::Write;

/// Identity, ordering and relationships of one query source.
///
/// The effective ordering always ends with the primary key columns, so
/// `compare_rows` is a total order and two rows compare equal exactly when
/// they are the same row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSchema {
    /// Table name.
    name: String,
    /// Primary key column names.
    primary_key: Vec<String>,
    /// Requested sort followed by any primary key columns not already in it.
    ordering: Ordering,
    /// Child schemas keyed by relationship name.
    relationships: BTreeMap<String, SourceSchema>,
}

impl SourceSchema {
    /// Starts building a schema for the given table.
    pub fn builder(name: impl Into<String>) -> Result<SourceSchemaBuilder> {
        SourceSchemaBuilder::new(name)
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary key columns.
    #[inline]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Returns the effective ordering (sort plus primary key tie-breaker).
    #[inline]
    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    /// Gets the schema of a named relationship.
    pub fn relationship(&self, name: &str) -> Option<&SourceSchema> {
        self.relationships.get(name)
    }

    /// Returns all relationships.
    #[inline]
    pub fn relationships(&self) -> &BTreeMap<String, SourceSchema> {
        &self.relationships
    }

    /// Compares two rows under the engine's ordering.
    pub fn compare_rows(&self, a: &Row, b: &Row) -> CmpOrdering {
        for (column, order) in &self.ordering {
            let ord = a.get_or_null(column).cmp(b.get_or_null(column));
            if ord != CmpOrdering::Equal {
                return order.apply(ord);
            }
        }
        CmpOrdering::Equal
    }

    /// Returns true if both rows have the same primary key.
    pub fn same_row(&self, a: &Row, b: &Row) -> bool {
        self.primary_key
            .iter()
            .all(|column| a.get_or_null(column) == b.get_or_null(column))
    }

    /// Formats the primary key of a row, e.g. `id=1`, for errors and logs.
    pub fn row_key(&self, row: &Row) -> String {
        let mut key = String::new();
        for (i, column) in self.primary_key.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            let _ = write!(key, "{}={}", column, row.get_or_null(column).to_json());
        }
        key
    }
}

/// Builder for `SourceSchema`.
pub struct SourceSchemaBuilder {
    name: String,
    primary_key: Vec<String>,
    sort: Ordering,
    relationships: BTreeMap<String, SourceSchema>,
}

impl SourceSchemaBuilder {
    /// Creates a new schema builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            primary_key: Vec::new(),
            sort: Vec::new(),
            relationships: BTreeMap::new(),
        })
    }

    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Sets the primary key columns.
    pub fn primary_key(mut self, columns: &[&str]) -> Result<Self> {
        for column in columns {
            Self::check_naming_rules(column)?;
        }
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        Ok(self)
    }

    /// Appends a sort column.
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.sort.push((column.into(), order));
        self
    }

    /// Adds a named relationship.
    pub fn relationship(mut self, name: impl Into<String>, schema: SourceSchema) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.relationships.contains_key(&name) {
            return Err(Error::invalid_schema(format!(
                "Relationship already exists: {}",
                name
            )));
        }
        self.relationships.insert(name, schema);
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<SourceSchema> {
        if self.primary_key.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Primary key required for {}",
                self.name
            )));
        }

        let mut ordering = self.sort;
        for column in &self.primary_key {
            if !ordering.iter().any(|(c, _)| c == column) {
                ordering.push((column.clone(), Order::Asc));
            }
        }

        Ok(SourceSchema {
            name: self.name,
            primary_key: self.primary_key,
            ordering,
            relationships: self.relationships,
        })
    }
}
