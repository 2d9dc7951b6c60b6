//! Scoped handle over a running user data stream

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Result;
use crate::parser::UserEvent;

/// How long `close` waits for the stream task to tear down, unless told otherwise
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything that can open a user event subscription
#[async_trait]
pub trait UserEventSource: Send + Sync {
    async fn subscribe(&self) -> Result<Subscription>;
}

/// Receiving end of a user data stream
///
/// Dropping the subscription signals the background task to stop; call
/// [`Subscription::close`] to also wait for the stream to be torn down.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<UserEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<UserEvent>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
            task: Some(task),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Upper bound on how long `close` waits for the task
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Subscription fed by a channel with no task behind it
    pub fn from_channel(
        events: mpsc::UnboundedReceiver<UserEvent>,
        shutdown: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            events,
            shutdown,
            task: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Next event, `None` if nothing arrived within `wait` or the stream ended
    pub async fn next_event(&mut self, wait: Duration) -> Option<UserEvent> {
        match timeout(wait, self.events.recv()).await {
            Ok(event) => event,
            Err(_) => None,
        }
    }

    /// Next event without any bound on the wait
    pub async fn recv(&mut self) -> Option<UserEvent> {
        self.events.recv().await
    }

    /// Stop the stream and wait for its task to finish
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            match timeout(self.close_timeout, &mut task).await {
                Ok(Ok(())) => debug!("User stream task finished"),
                Ok(Err(e)) => warn!(error = %e, "User stream task failed"),
                Err(_) => {
                    warn!("User stream did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
