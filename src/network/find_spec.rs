use std::time::Duration;

use serde_json::json;
use serde_json::Value;

use crate::metadata::RequestMetadata;
use crate::op_time::Timestamp;

/// Everything needed to open one tailing cursor at a given log position.
#[derive(Debug, Clone)]
pub struct FindSpec {
    /// Namespace of the remote oplog, e.g. `local.oplog.rs`.
    pub namespace: String,

    /// Entries with `ts >= start` are selected. Greater-or-equal, so the
    /// first returned document can be checked against the last fetched
    /// position and optionally dropped.
    pub start: Timestamp,

    /// Server-side limit on documents per batch.
    pub batch_size: u64,

    /// Server-side time limit for this find.
    pub max_time: Duration,

    /// Metadata advertising the requesting node's term.
    pub metadata: RequestMetadata,
}

impl FindSpec {
    /// Renders the command document sent to the sync source.
    ///
    /// The cursor is tailable, await-data and exhaust: after the initial
    /// reply the server keeps pushing batches without a client request per
    /// batch.
    pub fn to_command(&self) -> Value {
        let (db, collection) = split_namespace(&self.namespace);

        let mut cmd = json!({
            "find": collection,
            "$db": db,
            "filter": { "ts": { "$gte": self.start } },
            "batchSize": self.batch_size,
            "maxTimeMS": self.max_time.as_millis() as u64,
            "tailable": true,
            "awaitData": true,
            "exhaust": true,
            "term": self.metadata.term,
        });

        if let (Value::Object(cmd_doc), Value::Object(meta_doc)) = (&mut cmd, self.metadata.to_doc()) {
            cmd_doc.extend(meta_doc);
        }
        cmd
    }
}

/// Splits `db.collection` on the first dot; the collection part may itself
/// contain dots.
fn split_namespace(namespace: &str) -> (&str, &str) {
    match namespace.split_once('.') {
        Some((db, collection)) => (db, collection),
        None => ("", namespace),
    }
}
