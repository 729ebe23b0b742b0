//! Positions in a replicated operation log.

use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::FetchError;

/// A per-term monotonic sequence number assigned to every oplog entry.
#[derive(Debug, Default, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonically increasing election epoch identifying a leader's reign.
pub type Term = u64;

/// The identity of an oplog entry.
///
/// A term and a timestamp identify an entry globally. The total order is
/// lexicographic: by term first, then by timestamp within a term.
#[derive(Debug, Default, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpTime {
    #[serde(rename = "t")]
    pub term: Term,

    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
}

impl Display for OpTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.term, self.timestamp)
    }
}

impl OpTime {
    pub fn new(term: Term, timestamp: Timestamp) -> Self {
        Self { term, timestamp }
    }

    /// The zero position, used before any entry has been fetched.
    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }

    /// Extracts the `ts` and `t` fields from an oplog document.
    ///
    /// Every entry carries both; a missing or non-integer field means the
    /// document cannot be an oplog entry.
    pub fn parse_from_doc(doc: &Value) -> Result<Self, FetchError> {
        let ts = doc
            .get("ts")
            .and_then(Value::as_u64)
            .ok_or(FetchError::MissingField { field: "ts" })?;
        let term = doc
            .get("t")
            .and_then(Value::as_u64)
            .ok_or(FetchError::MissingField { field: "t" })?;
        Ok(Self::new(term, Timestamp(ts)))
    }
}
