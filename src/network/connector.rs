use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use crate::network::find_spec::FindSpec;
use crate::network::interrupt::InterruptHandle;

/// One reply from the sync source: a batch of oplog documents plus the
/// reply metadata document.
#[derive(Debug, Clone)]
pub struct CursorReply {
    /// Server-side cursor id; `0` once the server has closed the cursor.
    pub cursor_id: u64,

    /// The oplog documents of this batch, in log order. May be empty when
    /// the await-data bound expired with no new entries.
    pub documents: Vec<Value>,

    /// Raw reply metadata (`$replData`, `$oplogQueryData`).
    pub metadata: Value,
}

impl CursorReply {
    pub fn is_closed(&self) -> bool {
        self.cursor_id == 0
    }
}

/// Creates connections to a sync source.
///
/// A user of this crate implements this trait on top of its RPC client and
/// hands it to `OplogFetcher::new`. The fetcher reconnects through it every
/// time the restart policy lets a failed cursor be reopened.
#[async_trait]
pub trait SyncSourceConnector: Send + Sync + 'static {
    type Conn: SyncSourceConn;

    /// Establish a transport to `source` (a `host:port` string).
    async fn connect(&self, source: &str) -> Result<Self::Conn, FetchError>;
}

/// An established transport speaking the find/get-more protocol.
///
/// A read blocked in [`run_find`] or [`next_batch`] must unblock with
/// [`FetchError::Interrupted`] when the handle returned by
/// [`interrupt_handle`] fires, including when fired from another thread.
/// Once interrupted, every subsequent read fails the same way and the
/// connection must not reconnect.
///
/// [`run_find`]: Self::run_find
/// [`next_batch`]: Self::next_batch
/// [`interrupt_handle`]: Self::interrupt_handle
#[async_trait]
pub trait SyncSourceConn: Send + 'static {
    /// Issue the find that opens the cursor; the reply carries the first
    /// batch.
    async fn run_find(&mut self, spec: &FindSpec) -> Result<CursorReply, FetchError>;

    /// Await the next server-pushed batch on the exhaust stream.
    ///
    /// `await_timeout` bounds the server-side long-poll; expiry yields an
    /// empty batch on a live cursor, not an error.
    async fn next_batch(&mut self, cursor_id: u64, await_timeout: Duration) -> Result<CursorReply, FetchError>;

    /// A handle that can interrupt in-flight reads out of band.
    fn interrupt_handle(&self) -> InterruptHandle;
}
