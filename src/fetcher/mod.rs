//! The oplog fetcher.
//!
//! Once started, the fetcher reads operations from the remote oplog of its
//! sync source through a tailable, await-data, exhaust cursor. The find
//! that opens the cursor is generated from the last fetched position;
//! every reply's metadata is forwarded to the external replication state;
//! every batch is validated before its entries are pushed onto the applier
//! buffer through the enqueue callback.
//!
//! On an error the fetcher closes the cursor and, when the restart policy
//! allows, issues a new find to the sync source. When the sync source is
//! no longer usable or the fetcher is shut down, the shutdown callback is
//! invoked with the final status to signal the end of processing.
//!
//! ```text
//!              run_query()
//!                   |
//!                   v
//!             open_cursor() <-------------------+
//!                   |                           |
//!                   v                           | (restart policy
//!             next_batch() ---- error ----------+  permitting)
//!              |        |
//!              |        v
//!              |   on_successful_batch()
//!              |        |
//!              +--------+
//! ```

mod cursor;
mod lifecycle;
mod restart;
mod validate;

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use anyerror::AnyError;
use serde_json::Value;
use tokio::sync::watch;

pub use restart::DefaultRestartDecision;
pub use restart::RestartDecision;
pub use validate::validate_documents;

use crate::config::Config;
use crate::error::FetchError;
use crate::error::RollbackIdChanged;
use crate::error::StartError;
use crate::fetcher::cursor::CursorSession;
use crate::fetcher::lifecycle::Lifecycle;
use crate::metadata::ReplyMetadata;
use crate::metadata::RequestMetadata;
use crate::network::CursorReply;
use crate::network::FindSpec;
use crate::network::SyncSourceConn;
use crate::network::SyncSourceConnector;
use crate::observer::ReplSetConfigSnapshot;
use crate::observer::ReplicationObserver;
use crate::op_time::OpTime;
use crate::op_time::Term;

/// Whether the first document of a cursor's initial batch, which matches
/// the last fetched position, is handed to the applier or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPoint {
    /// Drop the sentinel; the applier has already seen it.
    SkipFirstDoc,

    /// Hand the sentinel through as well.
    EnqueueFirstDoc,
}

/// Statistics on one validated batch of operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Documents received over the wire, sentinel included.
    pub network_document_count: usize,

    /// Serialized size of everything received.
    pub network_document_bytes: usize,

    /// Documents handed to the enqueue callback.
    pub to_apply_document_count: usize,

    /// Serialized size of the documents handed to the enqueue callback.
    pub to_apply_document_bytes: usize,

    /// Position of the last document in the batch; null for an empty batch.
    pub last_document: OpTime,
}

/// Copies a range of validated operations into the applier buffer.
///
/// Invoked on the fetcher's task, in batch arrival order, with the batch
/// minus any skipped sentinel. It may block; the fetcher treats it as
/// synchronous. It must not call back into the fetcher.
pub type EnqueueFn = dyn Fn(&[Value], &BatchStats) -> Result<(), AnyError> + Send + Sync;

/// Receives the final status when the fetcher stops.
///
/// Called zero times if `start` never succeeded, and exactly once
/// otherwise: with `Ok(())` when the remote closed the cursor naturally,
/// with the fatal error otherwise.
pub type OnShutdownFn = dyn FnOnce(Result<(), FetchError>) + Send;

/// Tails the oplog of a sync source and feeds a local applier buffer.
///
/// See the [module docs](self) for the full protocol. Construction wires
/// in every collaborator; `start` spawns the single background task;
/// `shutdown` requests cooperative cancellation and `join` awaits the
/// terminal state.
pub struct OplogFetcher<C: SyncSourceConnector> {
    lifecycle: Arc<Lifecycle>,
    handle: tokio::runtime::Handle,

    /// Consumed by the first successful `start`.
    task: Mutex<Option<FetcherTask<C>>>,

    last_fetched_rx: watch::Receiver<OpTime>,
}

impl<C: SyncSourceConnector> OplogFetcher<C> {
    /// Creates a fetcher that will tail `source` starting at `last_fetched`.
    ///
    /// `config` must already be validated. The replica set `rs_config` is a
    /// snapshot: a configuration change requires a new fetcher.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: tokio::runtime::Handle,
        connector: C,
        last_fetched: OpTime,
        source: String,
        namespace: String,
        rs_config: ReplSetConfigSnapshot,
        restart_decision: Box<dyn RestartDecision>,
        required_rbid: i64,
        require_fresher_sync_source: bool,
        observer: Arc<dyn ReplicationObserver>,
        enqueue_fn: Box<EnqueueFn>,
        on_shutdown: Box<OnShutdownFn>,
        config: Config,
        starting_point: StartingPoint,
    ) -> Result<Self, FetchError> {
        rs_config.validate(&source)?;
        if last_fetched.is_null() {
            return Err(FetchError::InvalidReplicaSetConfig {
                reason: "the starting position must not be null".to_string(),
            });
        }

        let lifecycle = Arc::new(Lifecycle::new(on_shutdown));
        let (last_fetched_tx, last_fetched_rx) = watch::channel(last_fetched);

        let task = FetcherTask {
            connector,
            source,
            namespace,
            term: rs_config.term,
            config,
            required_rbid,
            require_fresher_sync_source,
            observer,
            enqueue_fn,
            restart: restart_decision,
            starting_point,
            first_batch: true,
            last_fetched,
            last_fetched_tx,
            lifecycle: lifecycle.clone(),
        };

        Ok(Self {
            lifecycle,
            handle,
            task: Mutex::new(Some(task)),
            last_fetched_rx,
        })
    }

    /// Spawns the background task.
    ///
    /// Fails with [`StartError::AlreadyStarted`] on a second call and with
    /// [`StartError::ShutdownInProgress`] once shutdown has been requested.
    /// At most one background task ever exists.
    pub fn start(&self) -> Result<(), StartError> {
        self.lifecycle.begin_start()?;

        match self.task.lock().unwrap().take() {
            Some(task) => {
                self.handle.spawn(task.run());
                Ok(())
            }
            None => Err(StartError::AlreadyStarted),
        }
    }

    /// Requests shutdown and returns immediately.
    ///
    /// Idempotent. Interrupts any in-flight read on the connection; the
    /// background task observes the request, terminates, and invokes the
    /// shutdown callback.
    pub fn shutdown(&self) {
        self.lifecycle.request_shutdown();
    }

    /// Resolves once the background task has terminated and the shutdown
    /// callback has run.
    pub async fn join(&self) {
        self.lifecycle.join().await;
    }

    /// Whether the background task is running or still winding down.
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// The position of the last oplog entry fetched and enqueued.
    pub fn last_op_time_fetched(&self) -> OpTime {
        *self.last_fetched_rx.borrow()
    }
}

/// State owned by the background task; everything here is touched only on
/// that task and needs no locking.
struct FetcherTask<C: SyncSourceConnector> {
    connector: C,
    source: String,
    namespace: String,
    term: Term,
    config: Config,
    required_rbid: i64,
    require_fresher_sync_source: bool,
    observer: Arc<dyn ReplicationObserver>,
    enqueue_fn: Box<EnqueueFn>,
    restart: Box<dyn RestartDecision>,
    starting_point: StartingPoint,

    /// True until the current cursor has produced a non-empty batch.
    first_batch: bool,

    last_fetched: OpTime,
    last_fetched_tx: watch::Sender<OpTime>,
    lifecycle: Arc<Lifecycle>,
}

impl<C: SyncSourceConnector> fmt::Display for FetcherTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OplogFetcher(source={}, ns={}, last_fetched={})",
            self.source, self.namespace, self.last_fetched
        )
    }
}

impl<C: SyncSourceConnector> FetcherTask<C> {
    #[tracing::instrument(level = "debug", skip_all, fields(source = %self.source))]
    async fn run(mut self) {
        tracing::info!("{} started", self);

        let res = self.run_query().await;
        match &res {
            Ok(()) => tracing::info!("{} finished: stream ended", self),
            Err(err) => tracing::warn!(error = %err, "{} finished", self),
        }

        self.lifecycle.complete(res);
    }

    /// The outer loop: open a cursor, pump its batches, reopen on
    /// restartable failures.
    async fn run_query(&mut self) -> Result<(), FetchError> {
        let mut retried = false;

        loop {
            if self.lifecycle.is_shutting_down() {
                return Err(FetchError::Interrupted);
            }

            let mut session = match self.open_cursor(retried).await {
                Ok(session) => session,
                Err(err) => {
                    retried = true;
                    self.handle_failed_read(err)?;
                    continue;
                }
            };

            self.first_batch = true;

            loop {
                let reply = match session.next_batch(self.config.await_data_max_time()).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        retried = true;
                        self.handle_failed_read(err)?;
                        break;
                    }
                };

                let closed = reply.is_closed();
                self.on_successful_batch(reply)?;

                if closed {
                    tracing::info!("{}: sync source closed the cursor", self);
                    return Ok(());
                }
            }
        }
    }

    /// Decides between reopening the cursor and stopping. Shutdown always
    /// stops, without consulting the restart policy.
    fn handle_failed_read(&mut self, err: FetchError) -> Result<(), FetchError> {
        if self.lifecycle.is_shutting_down() {
            return Err(FetchError::Interrupted);
        }

        if self.restart.should_continue(self.last_fetched, &err) {
            tracing::warn!(error = %err, "{}: oplog query failed, recreating the cursor", self);
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Connects to the sync source and opens a tailing cursor at the
    /// current last fetched position.
    async fn open_cursor(&mut self, retried: bool) -> Result<CursorSession<C::Conn>, FetchError> {
        let spec = FindSpec {
            namespace: self.namespace.clone(),
            start: self.last_fetched.timestamp,
            batch_size: self.config.batch_size,
            max_time: self.config.find_max_time(retried),
            metadata: RequestMetadata { term: self.term },
        };

        tracing::debug!(start = %spec.start, retried, "{}: opening cursor", self);

        let conn = self.connector.connect(&self.source).await?;
        self.lifecycle.register_interrupt(conn.interrupt_handle());

        CursorSession::open(conn, &spec).await
    }

    /// Processes one successful reply: metadata, rollback id, validation,
    /// enqueue, position advance.
    fn on_successful_batch(&mut self, reply: CursorReply) -> Result<(), FetchError> {
        // Metadata first: the applier must never see entries whose
        // provenance the external state has not observed.
        let metadata = ReplyMetadata::parse(&reply.metadata)?;
        self.observer.observe_metadata(&self.source, &metadata)?;

        let actual_rbid = metadata.oplog_query_data.rbid;
        if actual_rbid != self.required_rbid {
            return Err(RollbackIdChanged {
                required: self.required_rbid,
                actual: actual_rbid,
            }
            .into());
        }

        let stats = validate_documents(
            &reply.documents,
            self.first_batch,
            self.last_fetched.timestamp,
            self.starting_point,
            self.require_fresher_sync_source,
        )?;

        tracing::debug!(
            network_count = stats.network_document_count,
            to_apply_count = stats.to_apply_document_count,
            last_document = %stats.last_document,
            "{}: validated batch",
            self
        );

        let skip = usize::from(
            self.first_batch
                && self.starting_point == StartingPoint::SkipFirstDoc
                && !reply.documents.is_empty(),
        );
        let to_apply = &reply.documents[skip..];
        if !to_apply.is_empty() {
            (self.enqueue_fn)(to_apply, &stats).map_err(|source| FetchError::Enqueue { source })?;
        }

        if stats.last_document > self.last_fetched {
            self.last_fetched = stats.last_document;
            self.last_fetched_tx.send_replace(self.last_fetched);
        }

        if !reply.documents.is_empty() {
            self.first_batch = false;
        }

        self.restart.fetch_successful();
        Ok(())
    }
}
