//! Error types for the syncview materializer.

use alloc::string::String;
use core::fmt;

/// Result type alias for syncview operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by the view layer.
///
/// None of these are transient: each one points at a defect either in the
/// upstream query engine or in how the caller manages subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A second live view tried to register under an occupied fingerprint.
    ViewAlreadyExists {
        fingerprint: String,
    },
    /// A change addressed a row that is not present in the materialized tree.
    RowNotFound {
        table: String,
        key: String,
    },
    /// An add targeted a singular slot already holding a different row.
    SingularConflict {
        table: String,
        key: String,
    },
    /// A change named a relationship the schema does not define.
    UnknownRelationship {
        table: String,
        relationship: String,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// Materialized data could not be decoded into the requested type.
    Decode {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ViewAlreadyExists { fingerprint } => {
                write!(f, "View already exists for fingerprint {}", fingerprint)
            }
            Error::RowNotFound { table, key } => {
                write!(f, "Row {} not found in {}", key, table)
            }
            Error::SingularConflict { table, key } => {
                write!(f, "Singular result of {} already holds a row other than {}", table, key)
            }
            Error::UnknownRelationship {
                table,
                relationship,
            } => {
                write!(f, "Relationship {} not defined on {}", relationship, table)
            }
            Error::InvalidSchema { message } => {
                write!(f, "Invalid schema: {}", message)
            }
            Error::Decode { message } => {
                write!(f, "Decode error: {}", message)
            }
        }
    }
}

impl Error {
    /// Creates a view-already-exists error.
    pub fn view_already_exists(fingerprint: impl Into<String>) -> Self {
        Error::ViewAlreadyExists {
            fingerprint: fingerprint.into(),
        }
    }

    /// Creates a row not found error.
    pub fn row_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Error::RowNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a singular conflict error.
    pub fn singular_conflict(table: impl Into<String>, key: impl Into<String>) -> Self {
        Error::SingularConflict {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates an unknown relationship error.
    pub fn unknown_relationship(table: impl Into<String>, relationship: impl Into<String>) -> Self {
        Error::UnknownRelationship {
            table: table.into(),
            relationship: relationship.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a change addressing a missing row.
    #[inline]
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Error::RowNotFound { .. })
    }
}
