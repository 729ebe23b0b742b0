//! Error types exposed by this crate.

use std::error::Error;

use anyerror::AnyError;

use crate::op_time::Timestamp;

/// Errors surfaced while tailing the sync source's oplog.
///
/// Transient transport errors may be retried with a new cursor, subject to
/// the restart policy. Every other variant is fatal: it tears down the
/// cursor and is delivered through the shutdown callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The sync source is temporarily unreachable.
    #[error("sync source unreachable: {source}")]
    HostUnreachable { source: AnyError },

    /// A network operation timed out.
    #[error("network timeout: {source}")]
    NetworkTimeout { source: AnyError },

    /// The transport failed mid-conversation.
    #[error("socket error: {source}")]
    SocketError { source: AnyError },

    /// The remote no longer knows the cursor, e.g. after it restarted.
    #[error("cursor {cursor_id} not found on sync source")]
    CursorNotFound { cursor_id: u64 },

    #[error(transparent)]
    OplogStartMissing(#[from] OplogStartMissing),

    #[error(transparent)]
    OplogOutOfOrder(#[from] OplogOutOfOrder),

    /// The sync source is not eligible to be tailed any longer.
    #[error("invalid sync source: {reason}")]
    InvalidSyncSource { reason: String },

    /// An oplog document lacks a required field.
    #[error("missing or invalid field '{field}' in sync source response")]
    MissingField { field: &'static str },

    #[error(transparent)]
    RollbackIdChanged(#[from] RollbackIdChanged),

    /// The replica set configuration handed to the fetcher is unusable.
    #[error("invalid replica set config: {reason}")]
    InvalidReplicaSetConfig { reason: String },

    /// The downstream buffer refused a batch.
    #[error("enqueue of fetched batch failed: {source}")]
    Enqueue { source: AnyError },

    /// A read was interrupted by shutdown.
    #[error("oplog fetching interrupted")]
    Interrupted,
}

impl FetchError {
    /// Whether a new cursor may be opened after this error.
    ///
    /// Only transport-level failures qualify; everything the validator or
    /// the metadata plumbing raises is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::HostUnreachable { .. }
                | FetchError::NetworkTimeout { .. }
                | FetchError::SocketError { .. }
                | FetchError::CursorNotFound { .. }
        )
    }

    pub fn host_unreachable<E: Error + 'static>(e: &E) -> Self {
        FetchError::HostUnreachable { source: AnyError::new(e) }
    }

    pub fn network_timeout<E: Error + 'static>(e: &E) -> Self {
        FetchError::NetworkTimeout { source: AnyError::new(e) }
    }

    pub fn socket<E: Error + 'static>(e: &E) -> Self {
        FetchError::SocketError { source: AnyError::new(e) }
    }
}

/// The sync source does not contain our last known fetched position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sync source does not contain the last fetched position: expected first ts {expected}, got {got}")]
pub struct OplogStartMissing {
    /// The timestamp the first document was required to match.
    pub expected: Timestamp,
    /// The timestamp actually observed.
    pub got: Timestamp,
}

/// A batch contained entries that do not advance the log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("out-of-order oplog entries: ts {prev} followed by ts {next}")]
pub struct OplogOutOfOrder {
    pub prev: Timestamp,
    pub next: Timestamp,
}

/// The sync source rolled back since this fetcher was constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sync source rollback id changed: required {required}, actual {actual}")]
pub struct RollbackIdChanged {
    pub required: i64,
    pub actual: i64,
}

/// Errors returned synchronously from `OplogFetcher::start`.
///
/// These indicate local misuse and have no callback side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("oplog fetcher is already started")]
    AlreadyStarted,

    #[error("oplog fetcher is shutting down")]
    ShutdownInProgress,
}
