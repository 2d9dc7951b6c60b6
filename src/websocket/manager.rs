//! User data stream manager
//!
//! Owns the listen key lifecycle and runs the receiver loop on its own task.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Subscription, UserEventSource, WebSocketClient, DEFAULT_CLOSE_TIMEOUT};
use crate::error::Result;
use crate::exchange::ExchangeApi;
use crate::parser::UserEvent;

/// Listen keys expire after 60 minutes without a keepalive
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Silence after which a ping is sent to detect a stale connection
const RECV_TIMEOUT: Duration = Duration::from_secs(45);
/// Bound on the websocket close handshake during teardown
const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
const LISTEN_KEY_EXPIRED: &str = "listenKeyExpired";

/// Time the stream task needs to stop: socket close, then the listen key DELETE
fn teardown_budget(request_timeout: Duration) -> Duration {
    WS_CLOSE_TIMEOUT + request_timeout + Duration::from_secs(1)
}

/// Opens user data streams against the live exchange
pub struct UserStreamManager {
    api: Arc<dyn ExchangeApi>,
    ws_endpoint: String,
    keepalive_interval: Duration,
    close_timeout: Duration,
}

impl UserStreamManager {
    /// Create a new user stream manager
    pub fn new(api: Arc<dyn ExchangeApi>, ws_endpoint: &str) -> Self {
        Self {
            api,
            ws_endpoint: ws_endpoint.to_string(),
            keepalive_interval: KEEPALIVE_INTERVAL,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Size the teardown wait to the REST client's request timeout
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.close_timeout = teardown_budget(request_timeout);
        self
    }
}

#[async_trait]
impl UserEventSource for UserStreamManager {
    async fn subscribe(&self) -> Result<Subscription> {
        let listen_key = self.api.start_user_stream().await?;
        info!("Listen key created");

        let mut client = WebSocketClient::new(&self.ws_endpoint, &listen_key);
        if let Err(e) = client.connect().await {
            if let Err(close_err) = self.api.close_user_stream(&listen_key).await {
                warn!(error = %close_err, "Failed to close listen key");
            }
            return Err(e);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_stream(
            self.api.clone(),
            client,
            listen_key,
            event_tx,
            shutdown_rx,
            self.keepalive_interval,
        ));

        info!("Connected - user data stream running");
        Ok(Subscription::new(event_rx, shutdown_tx, task).with_close_timeout(self.close_timeout))
    }
}

/// Receiver loop: decode messages onto the channel until shutdown or disconnect
async fn run_stream(
    api: Arc<dyn ExchangeApi>,
    mut client: WebSocketClient,
    listen_key: String,
    events: mpsc::UnboundedSender<UserEvent>,
    mut shutdown: oneshot::Receiver<()>,
    keepalive_interval: Duration,
) {
    let mut keepalive = interval(keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    keepalive.tick().await;

    let mut last_message = Instant::now();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("User stream shutdown requested");
                break;
            }
            _ = keepalive.tick() => {
                match api.keepalive_user_stream(&listen_key).await {
                    Ok(()) => debug!("Listen key kept alive"),
                    Err(e) => warn!(error = %e, "Failed to keep listen key alive"),
                }
            }
            received = timeout(RECV_TIMEOUT, client.recv()) => match received {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    match UserEvent::parse(&text) {
                        Ok(event) if event.event_type() == LISTEN_KEY_EXPIRED => {
                            warn!("Listen key expired, stopping user stream");
                            break;
                        }
                        Ok(event) => {
                            debug!(event_type = %event.event_type(), "User event received");
                            if events.send(event).is_err() {
                                debug!("Event receiver dropped");
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, raw = %text, "Dropping undecodable user event"),
                    }
                }
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    error!(error = %e, "User stream disconnected");
                    break;
                }
                Err(_) => {
                    warn!(
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = client.ping().await {
                        error!(error = %e, "Failed to send keepalive ping");
                        break;
                    }
                }
            }
        }
    }

    if timeout(WS_CLOSE_TIMEOUT, client.close()).await.is_err() {
        warn!("WebSocket close handshake timed out");
    }
    if let Err(e) = api.close_user_stream(&listen_key).await {
        warn!(error = %e, "Failed to close listen key");
    }
    info!("User data stream closed");
}
