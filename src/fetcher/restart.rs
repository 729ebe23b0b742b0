//! Restart policy for failed oplog queries.

use crate::error::FetchError;
use crate::op_time::OpTime;

/// Decides whether a failed query may be retried with a new cursor.
///
/// A strategy object so tests can substitute always-stop or
/// always-continue variants. The default allows a bounded number of
/// consecutive restarts for transient errors.
pub trait RestartDecision: Send {
    /// Called after a failed cursor open or batch read, with the position
    /// the fetcher would resume from. Returning false stops the fetcher
    /// with that error.
    fn should_continue(&mut self, last_fetched: OpTime, err: &FetchError) -> bool;

    /// Called after every successfully validated batch.
    fn fetch_successful(&mut self);
}

/// Allows up to `max_restarts` consecutive restarts, for transient errors
/// only.
#[derive(Debug)]
pub struct DefaultRestartDecision {
    /// Restarts since the last successful query response.
    num_restarts: u64,

    max_restarts: u64,
}

impl DefaultRestartDecision {
    pub fn new(max_restarts: u64) -> Self {
        Self {
            num_restarts: 0,
            max_restarts,
        }
    }
}

impl RestartDecision for DefaultRestartDecision {
    fn should_continue(&mut self, last_fetched: OpTime, err: &FetchError) -> bool {
        if self.num_restarts >= self.max_restarts {
            tracing::info!(error = %err, "oplog fetcher exhausted its restart budget");
            return false;
        }
        if !err.is_transient() {
            return false;
        }

        self.num_restarts += 1;
        tracing::info!(
            error = %err,
            restarts = self.num_restarts,
            max_restarts = self.max_restarts,
            last_fetched = %last_fetched,
            "oplog fetcher restarting the cursor"
        );
        true
    }

    fn fetch_successful(&mut self) {
        self.num_restarts = 0;
    }
}
