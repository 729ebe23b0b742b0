//! One tailing cursor against the sync source.

use std::time::Duration;

use crate::error::FetchError;
use crate::network::CursorReply;
use crate::network::FindSpec;
use crate::network::SyncSourceConn;

/// Owns the connection and the server-side cursor for one streaming
/// conversation.
///
/// The session delivers batches; it does not interpret them and it does
/// not decide whether a failure warrants a restart. Any error tears the
/// whole session down, connection included.
pub(crate) struct CursorSession<Conn> {
    conn: Conn,
    cursor_id: u64,

    /// The find's own reply, handed out as the first batch.
    pending: Option<CursorReply>,
}

impl<Conn: SyncSourceConn> CursorSession<Conn> {
    /// Issues the find that opens the cursor.
    pub(crate) async fn open(mut conn: Conn, spec: &FindSpec) -> Result<Self, FetchError> {
        let reply = conn.run_find(spec).await?;
        let cursor_id = reply.cursor_id;
        Ok(Self {
            conn,
            cursor_id,
            pending: Some(reply),
        })
    }

    /// Returns the next batch: the find reply first, then each
    /// server-pushed batch in arrival order.
    ///
    /// An empty batch on a live cursor is a timed-out long-poll, not an
    /// error; the caller simply reads again.
    pub(crate) async fn next_batch(&mut self, await_timeout: Duration) -> Result<CursorReply, FetchError> {
        if let Some(first) = self.pending.take() {
            return Ok(first);
        }

        let reply = self.conn.next_batch(self.cursor_id, await_timeout).await?;
        self.cursor_id = reply.cursor_id;
        Ok(reply)
    }
}
