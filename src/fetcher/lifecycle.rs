//! Start/shutdown interlock shared by the caller and the background task.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::error::FetchError;
use crate::error::StartError;
use crate::fetcher::OnShutdownFn;
use crate::network::InterruptHandle;

/// Externally observable lifecycle of the fetcher.
///
/// `Complete` is terminal; reaching it runs the shutdown callback exactly
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    PreStart,
    Running,
    ShuttingDown,
    Complete,
}

/// Serializes lifecycle transitions and owns the shutdown side channel.
///
/// One mutex protects the state, the non-owning reference to the active
/// connection's interrupt handle, and the callback slot. The mutex is never
/// held across I/O or while running foreign code.
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    done_tx: watch::Sender<bool>,
}

struct Inner {
    state: State,
    interrupt: Option<InterruptHandle>,
    on_shutdown: Option<Box<OnShutdownFn>>,
}

impl Lifecycle {
    pub(crate) fn new(on_shutdown: Box<OnShutdownFn>) -> Self {
        let (done_tx, _rx) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                state: State::PreStart,
                interrupt: None,
                on_shutdown: Some(on_shutdown),
            }),
            done_tx,
        }
    }

    /// `PreStart` -> `Running`; anything else is caller misuse.
    pub(crate) fn begin_start(&self) -> Result<(), StartError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::PreStart => {
                inner.state = State::Running;
                Ok(())
            }
            State::Running => Err(StartError::AlreadyStarted),
            State::ShuttingDown | State::Complete => Err(StartError::ShutdownInProgress),
        }
    }

    /// Requests shutdown. Idempotent; never blocks on the background task.
    ///
    /// When a task is running, interrupts its in-flight read and leaves the
    /// terminal transition to the task itself. Before start, completes
    /// directly: there is no task, and the callback must not fire.
    pub(crate) fn request_shutdown(&self) {
        let interrupt = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::PreStart => {
                    inner.state = State::Complete;
                    let _unused_callback = inner.on_shutdown.take();
                    drop(inner);
                    self.done_tx.send_replace(true);
                    return;
                }
                State::Running => {
                    inner.state = State::ShuttingDown;
                    inner.interrupt.clone()
                }
                State::ShuttingDown | State::Complete => return,
            }
        };

        // Fired outside the lock.
        if let Some(handle) = interrupt {
            handle.interrupt();
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        matches!(
            self.inner.lock().unwrap().state,
            State::ShuttingDown | State::Complete
        )
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(
            self.inner.lock().unwrap().state,
            State::Running | State::ShuttingDown
        )
    }

    /// Makes `handle` the interrupt target for subsequent shutdowns.
    ///
    /// Fires it immediately when shutdown has already been requested, so a
    /// connection created concurrently with shutdown cannot block.
    pub(crate) fn register_interrupt(&self, handle: InterruptHandle) {
        let fire = {
            let mut inner = self.inner.lock().unwrap();
            let shutting_down = matches!(inner.state, State::ShuttingDown | State::Complete);
            inner.interrupt = Some(handle.clone());
            shutting_down
        };
        if fire {
            handle.interrupt();
        }
    }

    /// Terminal transition, invoked only by the background task. Runs the
    /// shutdown callback at most once over the fetcher's lifetime.
    pub(crate) fn complete(&self, status: Result<(), FetchError>) {
        let callback = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = State::Complete;
            inner.interrupt = None;
            inner.on_shutdown.take()
        };
        if let Some(callback) = callback {
            callback(status);
        }
        self.done_tx.send_replace(true);
    }

    /// Resolves once the background task has terminated and the shutdown
    /// callback has run; immediately when the fetcher never ran.
    pub(crate) async fn join(&self) {
        {
            let inner = self.inner.lock().unwrap();
            if matches!(inner.state, State::PreStart | State::Complete) {
                return;
            }
        }

        let mut rx = self.done_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
