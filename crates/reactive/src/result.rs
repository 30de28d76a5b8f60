//! Consumer-facing query results.

use alloc::format;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use syncview_core::{Error, Format, Result, ResultType};
use syncview_incremental::Slot;

/// Completeness details attached to a result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResultDetails {
    #[serde(rename = "type")]
    pub result_type: ResultType,
}

/// The data of a query together with its completeness.
///
/// `data` is an owned copy: later commits never change a result already
/// handed out.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub data: Slot,
    pub details: QueryResultDetails,
}

impl QueryResult {
    /// Creates a result.
    pub fn new(data: Slot, result_type: ResultType) -> Self {
        Self {
            data,
            details: QueryResultDetails { result_type },
        }
    }

    /// The result before anything has been materialized: no row for a
    /// singular query, an empty list for a plural one, completeness unknown.
    pub fn empty(format: &Format) -> Self {
        Self::new(Slot::empty(format), ResultType::Unknown)
    }

    /// Returns the completeness of the data.
    #[inline]
    pub fn result_type(&self) -> ResultType {
        self.details.result_type
    }

    /// Returns the data as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.data.to_json()
    }

    /// Decodes the data into `T` through its JSON form.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| Error::decode(format!("{}", e)))
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryResult", 2)?;
        state.serialize_field("data", &self.to_json())?;
        state.serialize_field("details", &self.details)?;
        state.end()
    }
}
