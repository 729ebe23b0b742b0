//! Hooks into the replication state that owns this fetcher.

use crate::error::FetchError;
use crate::metadata::ReplyMetadata;
use crate::op_time::Term;

/// A snapshot of the replica set configuration, taken when the fetcher is
/// constructed.
///
/// The snapshot is immutable for the fetcher's lifetime; a configuration
/// change requires constructing a new fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplSetConfigSnapshot {
    /// The election term this node is operating in. Advertised on every
    /// outbound find.
    pub term: Term,

    /// `host:port` of every member of the set.
    pub members: Vec<String>,
}

impl ReplSetConfigSnapshot {
    /// Checks that the snapshot can drive a fetcher tailing `source`.
    pub fn validate(&self, source: &str) -> Result<(), FetchError> {
        if self.members.is_empty() {
            return Err(FetchError::InvalidReplicaSetConfig {
                reason: "member list is empty".to_string(),
            });
        }
        if !self.members.iter().any(|m| m == source) {
            return Err(FetchError::InvalidReplicaSetConfig {
                reason: format!("sync source {} is not a member", source),
            });
        }
        Ok(())
    }
}

/// The external replication state the fetcher reports into.
///
/// The fetcher forwards the metadata of every reply here before the
/// corresponding batch reaches the applier buffer, so the external state
/// always observes the provenance of entries before the entries themselves.
pub trait ReplicationObserver: Send + Sync {
    /// Consume the metadata piggybacked on one reply from `source`.
    ///
    /// Returning an error declares the sync source ineligible (stale term,
    /// rolled back, no longer ahead); the fetcher stops with that error.
    fn observe_metadata(&self, source: &str, metadata: &ReplyMetadata) -> Result<(), FetchError>;
}
