//! Test fixtures: a scriptable sync source and a fetcher harness.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use anyerror::AnyError;
use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;

use oplogtail::BatchStats;
use oplogtail::Config;
use oplogtail::CursorReply;
use oplogtail::DefaultRestartDecision;
use oplogtail::FetchError;
use oplogtail::FindSpec;
use oplogtail::InterruptHandle;
use oplogtail::OpTime;
use oplogtail::OplogFetcher;
use oplogtail::ReplSetConfigSnapshot;
use oplogtail::ReplicationObserver;
use oplogtail::ReplyMetadata;
use oplogtail::StartingPoint;
use oplogtail::SyncSourceConn;
use oplogtail::SyncSourceConnector;
use oplogtail::Timestamp;

pub const SOURCE: &str = "sync-source:27017";
pub const SELF_MEMBER: &str = "self:27017";
pub const RBID: i64 = 1;

/// Installs a tracing subscriber for the test process.
///
/// Controlled through `RUST_LOG`; repeated calls after the first are
/// no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A no-op oplog entry at the given position.
pub fn entry(ts: u64, term: u64) -> Value {
    json!({"ts": ts, "t": term, "op": "n", "ns": "", "o": {"msg": "periodic noop"}})
}

/// A reply metadata document advertising the given rollback id.
pub fn metadata_doc(rbid: i64, term: u64, last_applied: u64) -> Value {
    json!({
        "$replData": {
            "term": term,
            "lastOpVisible": {"ts": last_applied, "t": term},
        },
        "$oplogQueryData": {
            "lastOpApplied": {"ts": last_applied, "t": term},
            "lastOpCommitted": {"ts": last_applied, "t": term},
            "rbid": rbid,
            "primaryIndex": 0,
            "syncSourceIndex": -1,
        },
    })
}

/// One scripted reaction of the mock sync source to a read.
pub enum Step {
    /// Deliver a batch on a live cursor.
    Batch(Vec<Value>),

    /// Deliver a batch and close the cursor.
    FinalBatch(Vec<Value>),

    /// Deliver a batch advertising a specific rollback id.
    BatchWithRbid(Vec<Value>, i64),

    /// Fail the read.
    Fail(FetchError),

    /// Block until interrupted.
    Block,
}

/// The script for one connection attempt.
pub enum ConnScript {
    Connect(Vec<Step>),
    FailConnect(FetchError),
}

/// Hands out one scripted connection per connect call and records every
/// find command issued.
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<ConnScript>>,
    finds: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<ConnScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            finds: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn finds(&self) -> Arc<Mutex<Vec<Value>>> {
        self.finds.clone()
    }
}

#[async_trait]
impl SyncSourceConnector for ScriptedConnector {
    type Conn = ScriptedConn;

    async fn connect(&self, _source: &str) -> Result<ScriptedConn, FetchError> {
        match self.scripts.lock().unwrap().pop_front() {
            Some(ConnScript::Connect(steps)) => Ok(ScriptedConn {
                steps: steps.into(),
                interrupt: InterruptHandle::new(),
                finds: self.finds.clone(),
            }),
            Some(ConnScript::FailConnect(err)) => Err(err),
            None => Err(FetchError::HostUnreachable {
                source: AnyError::error("connection script exhausted"),
            }),
        }
    }
}

pub struct ScriptedConn {
    steps: VecDeque<Step>,
    interrupt: InterruptHandle,
    finds: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedConn {
    async fn next_step(&mut self) -> Result<CursorReply, FetchError> {
        if self.interrupt.is_interrupted() {
            return Err(FetchError::Interrupted);
        }

        match self.steps.pop_front() {
            Some(Step::Batch(documents)) => Ok(reply(1, documents, RBID)),
            Some(Step::FinalBatch(documents)) => Ok(reply(0, documents, RBID)),
            Some(Step::BatchWithRbid(documents, rbid)) => Ok(reply(1, documents, rbid)),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Block) | None => {
                self.interrupt.interrupted().await;
                Err(FetchError::Interrupted)
            }
        }
    }
}

fn reply(cursor_id: u64, documents: Vec<Value>, rbid: i64) -> CursorReply {
    let last_applied = documents
        .last()
        .and_then(|doc| doc.get("ts"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    CursorReply {
        cursor_id,
        documents,
        metadata: metadata_doc(rbid, 2, last_applied),
    }
}

#[async_trait]
impl SyncSourceConn for ScriptedConn {
    async fn run_find(&mut self, spec: &FindSpec) -> Result<CursorReply, FetchError> {
        self.finds.lock().unwrap().push(spec.to_command());
        self.next_step().await
    }

    async fn next_batch(&mut self, _cursor_id: u64, _await_timeout: Duration) -> Result<CursorReply, FetchError> {
        self.next_step().await
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }
}

/// Records forwarded metadata; can be primed to veto the sync source.
pub struct RecordingObserver {
    pub seen: Mutex<Vec<ReplyMetadata>>,
    pub events: Arc<Mutex<Vec<&'static str>>>,
    pub veto_after: Option<usize>,
}

impl RecordingObserver {
    pub fn new(events: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            events,
            veto_after: None,
        }
    }
}

impl ReplicationObserver for RecordingObserver {
    fn observe_metadata(&self, _source: &str, metadata: &ReplyMetadata) -> Result<(), FetchError> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(*metadata);
        self.events.lock().unwrap().push("metadata");

        if let Some(after) = self.veto_after {
            if seen.len() > after {
                return Err(FetchError::InvalidSyncSource {
                    reason: "sync source fell behind".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A fully wired fetcher plus handles on everything it touched.
pub struct Harness {
    pub fetcher: OplogFetcher<ScriptedConnector>,
    pub enqueued: Arc<Mutex<Vec<(Vec<Value>, BatchStats)>>>,
    pub status: Arc<Mutex<Option<Result<(), FetchError>>>>,
    pub shutdown_calls: Arc<AtomicUsize>,
    pub finds: Arc<Mutex<Vec<Value>>>,
    pub observer: Arc<RecordingObserver>,
    pub events: Arc<Mutex<Vec<&'static str>>>,
}

impl Harness {
    /// Joins the fetcher and returns the status the shutdown callback saw.
    pub async fn wait_for_status(&self) -> Result<(), FetchError> {
        self.fetcher.join().await;
        self.status
            .lock()
            .unwrap()
            .clone()
            .expect("fetcher completed without delivering a status")
    }

    /// Polls until the fetcher has advanced to the given position.
    pub async fn wait_for_position(&self, op_time: OpTime) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.fetcher.last_op_time_fetched() < op_time {
            assert!(
                Instant::now() < deadline,
                "fetcher did not reach {} in time",
                op_time
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub struct HarnessBuilder {
    scripts: Vec<ConnScript>,
    last_fetched: OpTime,
    starting_point: StartingPoint,
    require_fresher: bool,
    max_restarts: u64,
    required_rbid: i64,
    veto_after: Option<usize>,
    fail_enqueue: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            last_fetched: OpTime::new(2, Timestamp(5)),
            starting_point: StartingPoint::SkipFirstDoc,
            require_fresher: false,
            max_restarts: 3,
            required_rbid: RBID,
            veto_after: None,
            fail_enqueue: false,
        }
    }

    pub fn conn(mut self, steps: Vec<Step>) -> Self {
        self.scripts.push(ConnScript::Connect(steps));
        self
    }

    pub fn fail_connect(mut self, err: FetchError) -> Self {
        self.scripts.push(ConnScript::FailConnect(err));
        self
    }

    pub fn last_fetched(mut self, term: u64, ts: u64) -> Self {
        self.last_fetched = OpTime::new(term, Timestamp(ts));
        self
    }

    pub fn starting_point(mut self, starting_point: StartingPoint) -> Self {
        self.starting_point = starting_point;
        self
    }

    pub fn require_fresher(mut self, require: bool) -> Self {
        self.require_fresher = require;
        self
    }

    pub fn max_restarts(mut self, max_restarts: u64) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn required_rbid(mut self, rbid: i64) -> Self {
        self.required_rbid = rbid;
        self
    }

    pub fn veto_after(mut self, batches: usize) -> Self {
        self.veto_after = Some(batches);
        self
    }

    pub fn fail_enqueue(mut self) -> Self {
        self.fail_enqueue = true;
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();

        let connector = ScriptedConnector::new(self.scripts);
        let finds = connector.finds();

        let events = Arc::new(Mutex::new(Vec::new()));
        let mut observer = RecordingObserver::new(events.clone());
        observer.veto_after = self.veto_after;
        let observer = Arc::new(observer);

        let enqueued = Arc::new(Mutex::new(Vec::new()));
        let enqueue_fn = {
            let enqueued = enqueued.clone();
            let events = events.clone();
            let fail = self.fail_enqueue;
            Box::new(move |docs: &[Value], stats: &BatchStats| {
                if fail {
                    return Err(AnyError::error("applier buffer rejected the batch"));
                }
                events.lock().unwrap().push("enqueue");
                enqueued.lock().unwrap().push((docs.to_vec(), *stats));
                Ok(())
            })
        };

        let status = Arc::new(Mutex::new(None));
        let shutdown_calls = Arc::new(AtomicUsize::new(0));
        let on_shutdown = {
            let status = status.clone();
            let shutdown_calls = shutdown_calls.clone();
            Box::new(move |final_status: Result<(), FetchError>| {
                shutdown_calls.fetch_add(1, Ordering::SeqCst);
                *status.lock().unwrap() = Some(final_status);
            })
        };

        let config = Config {
            max_fetcher_restarts: self.max_restarts,
            ..Default::default()
        }
        .validate()
        .unwrap();

        let rs_config = ReplSetConfigSnapshot {
            term: 2,
            members: vec![SELF_MEMBER.to_string(), SOURCE.to_string()],
        };

        let fetcher = OplogFetcher::new(
            tokio::runtime::Handle::current(),
            connector,
            self.last_fetched,
            SOURCE.to_string(),
            "local.oplog.rs".to_string(),
            rs_config,
            Box::new(DefaultRestartDecision::new(self.max_restarts)),
            self.required_rbid,
            self.require_fresher,
            observer.clone(),
            enqueue_fn,
            on_shutdown,
            config,
            self.starting_point,
        )
        .unwrap();

        Harness {
            fetcher,
            enqueued,
            status,
            shutdown_calls,
            finds,
            observer,
            events,
        }
    }
}
