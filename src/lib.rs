//! `oplogtail` keeps a replica's view of its sync source's operation log
//! advancing.
//!
//! The crate provides the [`OplogFetcher`]: a long-lived component that
//! tails the oplog of a remote sync source over a tailable, await-data,
//! exhaust cursor and hands validated batches to a local applier buffer.
//! It restarts the cursor on transient network failures within a
//! configurable budget, treats semantic divergence (rollback, term change,
//! out-of-order entries, a stale source) as fatal, and supports prompt
//! cooperative shutdown that interrupts a blocked network read.
//!
//! What the fetcher deliberately does not do: pick the sync source, apply
//! or persist entries, issue writes, or reason about commit points beyond
//! forwarding reply metadata to the external replication state.
//!
//! Callers supply the wire transport (a [`SyncSourceConnector`]), the
//! external replication state (a [`ReplicationObserver`]), the enqueue
//! callback feeding the applier, and a shutdown callback that receives the
//! final status exactly once.

#![deny(unused_qualifications)]

mod config;
mod error;
mod fetcher;
mod metadata;
mod network;
mod observer;
mod op_time;

pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::error::FetchError;
pub use crate::error::OplogOutOfOrder;
pub use crate::error::OplogStartMissing;
pub use crate::error::RollbackIdChanged;
pub use crate::error::StartError;
pub use crate::fetcher::validate_documents;
pub use crate::fetcher::BatchStats;
pub use crate::fetcher::DefaultRestartDecision;
pub use crate::fetcher::EnqueueFn;
pub use crate::fetcher::OnShutdownFn;
pub use crate::fetcher::OplogFetcher;
pub use crate::fetcher::RestartDecision;
pub use crate::fetcher::StartingPoint;
pub use crate::metadata::OplogQueryData;
pub use crate::metadata::ReplData;
pub use crate::metadata::ReplyMetadata;
pub use crate::metadata::RequestMetadata;
pub use crate::metadata::OPLOG_QUERY_DATA_FIELD;
pub use crate::metadata::REPL_DATA_FIELD;
pub use crate::network::CursorReply;
pub use crate::network::FindSpec;
pub use crate::network::InterruptHandle;
pub use crate::network::SyncSourceConn;
pub use crate::network::SyncSourceConnector;
pub use crate::observer::ReplSetConfigSnapshot;
pub use crate::observer::ReplicationObserver;
pub use crate::op_time::OpTime;
pub use crate::op_time::Term;
pub use crate::op_time::Timestamp;
