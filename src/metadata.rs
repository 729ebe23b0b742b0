//! Replication metadata piggybacked on every query and reply.
//!
//! Each outbound find advertises the local term so the sync source can
//! notice a stale client. Each reply carries the remote's own replication
//! state, which is forwarded verbatim to the external replication state
//! before the corresponding batch is enqueued.

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use crate::error::FetchError;
use crate::op_time::OpTime;
use crate::op_time::Term;

/// Reply field carrying [`ReplData`].
pub const REPL_DATA_FIELD: &str = "$replData";

/// Reply field carrying [`OplogQueryData`].
pub const OPLOG_QUERY_DATA_FIELD: &str = "$oplogQueryData";

/// Metadata attached to every outbound find request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// The election term the requesting node is operating in.
    pub term: Term,
}

impl RequestMetadata {
    /// Renders the metadata section of a find command.
    pub fn to_doc(&self) -> Value {
        json!({ "$replData": { "term": self.term } })
    }
}

/// The remote's general replication state, from `$replData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplData {
    /// The term the remote believes in.
    pub term: Term,

    /// The newest position the remote is willing to expose to readers.
    #[serde(rename = "lastOpVisible")]
    pub last_op_visible: OpTime,
}

/// Oplog-query specific metadata, from `$oplogQueryData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OplogQueryData {
    /// The last entry the remote has applied.
    #[serde(rename = "lastOpApplied")]
    pub last_op_applied: OpTime,

    /// The remote's view of the commit point.
    #[serde(rename = "lastOpCommitted")]
    pub last_op_committed: OpTime,

    /// Rollback id of the remote; a change means its log is no longer the
    /// one this fetcher started tailing.
    pub rbid: i64,

    /// Index of the primary in the remote's member list, or -1.
    #[serde(rename = "primaryIndex")]
    pub primary_index: i64,

    /// Index of the remote's own sync source, or -1.
    #[serde(rename = "syncSourceIndex")]
    pub sync_source_index: i64,
}

/// Both metadata sections parsed out of one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyMetadata {
    pub repl_data: ReplData,
    pub oplog_query_data: OplogQueryData,
}

impl ReplyMetadata {
    /// Extracts and parses the metadata sections of a reply document.
    ///
    /// The sync source includes both sections on every reply once the find
    /// requested them; an absent or malformed section is an error.
    pub fn parse(reply: &Value) -> Result<Self, FetchError> {
        let repl_data = Self::section(reply, REPL_DATA_FIELD)?;
        let oplog_query_data = Self::section(reply, OPLOG_QUERY_DATA_FIELD)?;
        Ok(Self {
            repl_data,
            oplog_query_data,
        })
    }

    fn section<T: for<'d> Deserialize<'d>>(reply: &Value, field: &'static str) -> Result<T, FetchError> {
        let doc = reply.get(field).ok_or(FetchError::MissingField { field })?;
        serde_json::from_value(doc.clone()).map_err(|_| FetchError::MissingField { field })
    }
}
