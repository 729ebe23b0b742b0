use tokio::sync::watch;

/// Interrupts reads on a connection from outside the task that owns it.
///
/// The handle is cheap to clone; the shutdown path holds one so it can
/// unblock an in-flight read without touching the connection itself. The
/// flag is sticky: once fired, every current and future read on the owning
/// connection fails with [`FetchError::Interrupted`], and the connection
/// must not reconnect. Firing with no read in flight, repeatedly, or after
/// the connection is gone is safe and has no further effect.
///
/// [`FetchError::Interrupted`]: crate::error::FetchError::Interrupted
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the interrupt.
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the interrupt has fired; immediately if it already has.
    pub async fn interrupted(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
