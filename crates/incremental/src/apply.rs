//! Applying changes to a materialized slot.
//!
//! Plural slots are kept in the engine's order (`SourceSchema::compare_rows`):
//! new rows are inserted at their binary-search position and the list is
//! never re-sorted. Rows are matched by primary key.

use crate::change::{Change, Node};
use crate::entry::{RowEntry, Slot};
use syncview_core::schema::SourceSchema;
use syncview_core::{Error, Format, Result, Row};

/// Applies one change to `slot`.
///
/// `schema` and `format` describe the rows stored in `slot`. A change that
/// addresses a row missing from the slot yields `Error::RowNotFound` and
/// leaves the slot untouched.
pub fn apply_change(
    slot: &mut Slot,
    change: &Change,
    schema: &SourceSchema,
    format: &Format,
) -> Result<()> {
    match change {
        Change::Add { node } => add(slot, node, schema, format),
        Change::Remove { node } => remove(slot, &node.row, schema),
        Change::Edit { old_row, row } => edit(slot, old_row, row, schema),
        Change::Child {
            row,
            relationship,
            change,
        } => {
            let child_format = match format.relationship(relationship) {
                Some(f) => f,
                // Not part of the query's result shape
                None => return Ok(()),
            };
            let child_schema = schema
                .relationship(relationship)
                .ok_or_else(|| Error::unknown_relationship(schema.name(), relationship.as_str()))?;
            let parent = find_entry_mut(slot, row, schema)?;
            let child_slot = parent
                .relationships
                .entry(relationship.clone())
                .or_insert_with(|| Slot::empty(child_format));
            apply_change(child_slot, change, child_schema, child_format)
        }
    }
}

fn add(slot: &mut Slot, node: &Node, schema: &SourceSchema, format: &Format) -> Result<()> {
    match slot {
        Slot::Singular(Some(existing)) => {
            if !schema.same_row(&existing.row, &node.row) {
                return Err(Error::singular_conflict(schema.name(), schema.row_key(&node.row)));
            }
            existing.ref_count += 1;
            Ok(())
        }
        Slot::Singular(empty) => {
            *empty = Some(build_entry(node, schema, format)?);
            Ok(())
        }
        Slot::Plural(entries) => {
            match entries.binary_search_by(|e| schema.compare_rows(&e.row, &node.row)) {
                Ok(pos) => entries[pos].ref_count += 1,
                Err(pos) => entries.insert(pos, build_entry(node, schema, format)?),
            }
            Ok(())
        }
    }
}

/// Builds a fresh entry for `node`, materializing every relationship the
/// format asks for.
fn build_entry(node: &Node, schema: &SourceSchema, format: &Format) -> Result<RowEntry> {
    let mut entry = RowEntry::new(node.row.clone(), format);
    for (name, relationship) in &node.relationships {
        let child_format = match format.relationship(name) {
            Some(f) => f,
            None => continue,
        };
        let child_schema = schema
            .relationship(name)
            .ok_or_else(|| Error::unknown_relationship(schema.name(), name.as_str()))?;
        let child_slot = entry
            .relationships
            .entry(name.clone())
            .or_insert_with(|| Slot::empty(child_format));
        for child in relationship.nodes() {
            add(child_slot, &child, child_schema, child_format)?;
        }
    }
    Ok(entry)
}

fn remove(slot: &mut Slot, row: &Row, schema: &SourceSchema) -> Result<()> {
    match slot {
        Slot::Singular(current) => {
            let existing = match current.as_mut() {
                Some(e) if schema.same_row(&e.row, row) => e,
                _ => return Err(Error::row_not_found(schema.name(), schema.row_key(row))),
            };
            existing.ref_count -= 1;
            if existing.ref_count == 0 {
                *current = None;
            }
            Ok(())
        }
        Slot::Plural(entries) => {
            let pos = find_position(entries, row, schema)
                .ok_or_else(|| Error::row_not_found(schema.name(), schema.row_key(row)))?;
            entries[pos].ref_count -= 1;
            if entries[pos].ref_count == 0 {
                entries.remove(pos);
            }
            Ok(())
        }
    }
}

fn edit(slot: &mut Slot, old_row: &Row, row: &Row, schema: &SourceSchema) -> Result<()> {
    match slot {
        Slot::Singular(current) => match current {
            Some(e) if schema.same_row(&e.row, old_row) => {
                e.row = row.clone();
                Ok(())
            }
            _ => Err(Error::row_not_found(schema.name(), schema.row_key(old_row))),
        },
        Slot::Plural(entries) => {
            let pos = find_position(entries, old_row, schema)
                .ok_or_else(|| Error::row_not_found(schema.name(), schema.row_key(old_row)))?;

            if schema.compare_rows(old_row, row).is_eq() {
                entries[pos].row = row.clone();
                return Ok(());
            }

            // Ordering columns changed: move the entry, keeping its
            // relationships and reference count.
            let mut entry = entries.remove(pos);
            entry.row = row.clone();
            match entries.binary_search_by(|e| schema.compare_rows(&e.row, row)) {
                Err(new_pos) => entries.insert(new_pos, entry),
                Ok(existing) => {
                    // The edit turned this row into one already present.
                    entries[existing].ref_count += entry.ref_count;
                    entries[existing].row = row.clone();
                }
            }
            Ok(())
        }
    }
}

/// Locates a row by identity: binary search under the engine's order, with a
/// linear fallback for rows whose ordering columns disagree with the stored row.
fn find_position(entries: &[RowEntry], row: &Row, schema: &SourceSchema) -> Option<usize> {
    match entries.binary_search_by(|e| schema.compare_rows(&e.row, row)) {
        Ok(pos) => Some(pos),
        Err(_) => entries.iter().position(|e| schema.same_row(&e.row, row)),
    }
}

fn find_entry_mut<'a>(
    slot: &'a mut Slot,
    row: &Row,
    schema: &SourceSchema,
) -> Result<&'a mut RowEntry> {
    match slot {
        Slot::Singular(Some(entry)) if schema.same_row(&entry.row, row) => Ok(entry),
        Slot::Singular(_) => Err(Error::row_not_found(schema.name(), schema.row_key(row))),
        Slot::Plural(entries) => match find_position(entries, row, schema) {
            Some(pos) => Ok(&mut entries[pos]),
            None => Err(Error::row_not_found(schema.name(), schema.row_key(row))),
        },
    }
}

/// Applies a sequence of changes, stopping at the first error.
pub fn apply_changes<'a, I>(
    slot: &mut Slot,
    changes: I,
    schema: &SourceSchema,
    format: &Format,
) -> Result<()>
where
    I: IntoIterator<Item = &'a Change>,
{
    for change in changes {
        apply_change(slot, change, schema, format)?;
    }
    Ok(())
}
