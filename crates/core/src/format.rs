//! Result shape and completeness descriptors.

use alloc::collections::BTreeMap;
use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Describes whether a query yields one row or an ordered list of rows, and
/// the shape of each relationship below it.
///
/// Supplied by the query at subscription time and fixed for the lifetime of
/// the view built from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Format {
    singular: bool,
    relationships: BTreeMap<String, Format>,
}

impl Format {
    /// A list-shaped result.
    pub fn plural() -> Self {
        Self::default()
    }

    /// A single-row result.
    pub fn singular() -> Self {
        Self {
            singular: true,
            relationships: BTreeMap::new(),
        }
    }

    /// Adds the format of a named relationship.
    pub fn with_relationship(mut self, name: impl Into<String>, format: Format) -> Self {
        self.relationships.insert(name.into(), format);
        self
    }

    /// Returns true for single-row results.
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// Gets the format of a named relationship.
    ///
    /// Relationships without a format are not materialized.
    #[inline]
    pub fn relationship(&self, name: &str) -> Option<&Format> {
        self.relationships.get(name)
    }

    /// Returns all relationship formats.
    #[inline]
    pub fn relationships(&self) -> &BTreeMap<String, Format> {
        &self.relationships
    }
}

/// Completeness of a materialized result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// The result may still be an incomplete or stale snapshot.
    #[default]
    Unknown,
    /// The engine confirmed the result reflects a consistent point.
    Complete,
}

impl ResultType {
    /// Returns true once the result is complete.
    #[inline]
    pub fn is_complete(self) -> bool {
        matches!(self, ResultType::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_shapes() {
        let format = Format::plural().with_relationship("messages", Format::plural());
        assert!(!format.is_singular());
        assert!(format.relationship("messages").is_some());
        assert!(format.relationship("owner").is_none());
        assert!(Format::singular().is_singular());
    }

    #[test]
    fn test_result_type_serde() {
        assert_eq!(serde_json::to_string(&ResultType::Complete).unwrap(), "\"complete\"");
        assert_eq!(
            serde_json::from_str::<ResultType>("\"unknown\"").unwrap(),
            ResultType::Unknown
        );
        assert!(!ResultType::default().is_complete());
    }
}
