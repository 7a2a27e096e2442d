//! Push service client.
//!
//! Owns the connection to the push service and drives the protocol:
//!
//! ```text
//!   Disconnected ──connect()──► Connecting ──► AwaitingHelloAck ──► Ready
//!                                   ▲                                 │
//!                                   │                           register()
//!                                   │                                 ▼
//!                             Reconnecting ◄──read failure── Listening / Registering
//! ```
//!
//! Control operations (hello, register) run strictly before the streaming
//! operation ([`PushServiceClient::receive_loop`]). Reconnection happens
//! inline in the receive loop using the same bounded [`RetryPolicy`] as the
//! initial connect; the session id assigned by the first hello is echoed on
//! every later hello.

// Rust guideline compliant 2026-02

pub mod protocol;
pub mod retry;
pub mod transport;

use crate::error::PushError;
use crate::notifications::dispatcher::{NotificationDispatcher, NotificationSink};
use crate::notifications::subscription::{PushSubscription, SubscriptionStore};

use protocol::{HelloRequest, InboundFrame, RegisterRequest};
pub use retry::RetryPolicy;
pub use transport::{Connection, Dialer, WebSocketDialer};

/// Protocol state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection.
    Disconnected,
    /// Dialing the service.
    Connecting,
    /// Hello sent, waiting for the reply.
    AwaitingHelloAck,
    /// Handshake complete; control operations allowed.
    Ready,
    /// Register sent, waiting for the reply.
    Registering,
    /// Inside the receive loop.
    Listening,
    /// Read failed in the receive loop; connecting again.
    Reconnecting,
}

/// Where and how to reach the push service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Push service host name.
    pub host: String,
    /// Value of the `Sec-WebSocket-Protocol` header.
    pub subprotocol: String,
    /// Name of the version header sent with the upgrade request.
    pub version_header_name: String,
    /// Value of the version header.
    pub version_header_value: String,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            host: "push.services.mozilla.com".to_string(),
            subprotocol: "push-notification".to_string(),
            version_header_name: "Ssc-WebSocket-Version".to_string(),
            version_header_value: "13".to_string(),
        }
    }
}

impl ServiceEndpoint {
    /// Secure WebSocket URL of the service root.
    pub fn url(&self) -> String {
        format!("wss://{}/", self.host)
    }

    /// Headers sent with the upgrade request.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Sec-WebSocket-Protocol".to_string(), self.subprotocol.clone()),
            (
                self.version_header_name.clone(),
                self.version_header_value.clone(),
            ),
        ]
    }
}

/// Identity of this user agent towards the push service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentSession {
    user_agent_id: Option<String>,
    push_service_host: String,
}

impl UserAgentSession {
    /// New session with no assigned id.
    pub fn new(push_service_host: impl Into<String>) -> Self {
        Self {
            user_agent_id: None,
            push_service_host: push_service_host.into(),
        }
    }

    /// Session id assigned by the first successful hello.
    pub fn user_agent_id(&self) -> Option<&str> {
        self.user_agent_id.as_deref()
    }

    /// Configured push service host.
    pub fn push_service_host(&self) -> &str {
        &self.push_service_host
    }

    /// Record the id from a hello reply. Only the first non-empty id sticks.
    fn assign(&mut self, uaid: &str) {
        match &self.user_agent_id {
            None if !uaid.is_empty() => {
                log::info!("[PushService] Assigned user agent id {}", uaid);
                self.user_agent_id = Some(uaid.to_string());
            }
            Some(existing) if existing != uaid => {
                log::warn!(
                    "[PushService] Service answered with user agent id {} but session keeps {}",
                    uaid,
                    existing
                );
            }
            _ => {}
        }
    }
}

/// Client for the push service protocol.
pub struct PushServiceClient<D: Dialer> {
    dialer: D,
    endpoint: ServiceEndpoint,
    retry: RetryPolicy,
    session: UserAgentSession,
    state: ClientState,
    connection: Option<D::Connection>,
    subscriptions: SubscriptionStore,
}

impl<D: Dialer> std::fmt::Debug for PushServiceClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushServiceClient")
            .field("endpoint", &self.endpoint)
            .field("session", &self.session)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl<D: Dialer> PushServiceClient<D> {
    /// Create a disconnected client.
    pub fn new(dialer: D, endpoint: ServiceEndpoint, retry: RetryPolicy) -> Self {
        let session = UserAgentSession::new(endpoint.host.clone());
        Self {
            dialer,
            endpoint,
            retry,
            session,
            state: ClientState::Disconnected,
            connection: None,
            subscriptions: SubscriptionStore::new(),
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Session identity.
    pub fn session(&self) -> &UserAgentSession {
        &self.session
    }

    /// Registered subscriptions.
    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    /// Connect and complete the hello handshake.
    ///
    /// Retries the whole sequence (dial, send hello, read reply) up to the
    /// policy bound. Exhaustion returns [`PushError::RetriesExhausted`]
    /// carrying the final attempt's error.
    pub async fn connect(&mut self) -> Result<(), PushError> {
        let mut retry = self.retry.start();

        loop {
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!(
                        "[PushService] Connect attempt {} failed: {}",
                        retry.attempts() + 1,
                        e
                    );
                    match retry.record_failure(e) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            self.state = ClientState::Disconnected;
                            let error = retry.exhausted();
                            log::error!("[PushService] {}", error);
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Register a new channel scoped to `server_key`.
    ///
    /// On success the subscription (with its push endpoint) is stored and
    /// returned. A reply that is not a successful register for the same
    /// channel yields [`PushError::Registration`] with the raw frame.
    pub async fn register(&mut self, server_key: &str) -> Result<&PushSubscription, PushError> {
        self.require_state("register", &[ClientState::Ready])?;
        self.state = ClientState::Registering;

        let result = self.register_channel(server_key).await;
        self.state = if self.connection.is_some() {
            ClientState::Ready
        } else {
            ClientState::Disconnected
        };

        let channel_id = result?;
        log::info!("[PushService] Registered channel {}", channel_id);
        Ok(self.subscriptions.lookup(&channel_id)?)
    }

    /// Read frames forever, dispatching notifications.
    ///
    /// A read failure closes the connection and reconnects with the same
    /// retry bound as [`Self::connect`]. Only reconnect exhaustion ends the
    /// loop. Frames that fail to parse are logged and dropped.
    pub async fn receive_loop<S: NotificationSink>(
        &mut self,
        dispatcher: &mut NotificationDispatcher<S>,
    ) -> Result<(), PushError> {
        self.require_state("receive_loop", &[ClientState::Ready])?;
        self.state = ClientState::Listening;
        log::info!("[PushService] Waiting for notifications");

        loop {
            let read = match self.connection.as_mut() {
                Some(connection) => connection.recv_text().await,
                None => Err(anyhow::anyhow!("no open connection")),
            };

            match read {
                Ok(text) => self.handle_frame(&text, dispatcher),
                Err(e) => {
                    log::warn!("[PushService] Read failed: {:#}; reconnecting", e);
                    self.state = ClientState::Reconnecting;
                    self.close_connection().await;
                    self.connect().await?;
                    self.state = ClientState::Listening;
                }
            }
        }
    }

    fn handle_frame<S: NotificationSink>(
        &self,
        text: &str,
        dispatcher: &mut NotificationDispatcher<S>,
    ) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Notification(notification)) => {
                dispatcher.handle(&self.subscriptions, &notification);
            }
            Ok(frame) => {
                log::debug!(
                    "[PushService] Ignoring {} frame while listening: {}",
                    frame.kind(),
                    text
                );
            }
            Err(e) => {
                log::warn!("[PushService] Dropping malformed frame ({}): {}", e, text);
            }
        }
    }

    /// One dial + hello exchange.
    async fn connect_once(&mut self) -> Result<(), PushError> {
        self.close_connection().await;
        self.state = ClientState::Connecting;

        let url = self.endpoint.url();
        log::info!("[PushService] Connecting to {}", url);
        let mut connection = self
            .dialer
            .dial(&url, &self.endpoint.headers())
            .await
            .map_err(PushError::Connection)?;

        match self.hello(&mut connection).await {
            Ok(()) => {
                self.connection = Some(connection);
                self.state = ClientState::Ready;
                log::info!("[PushService] Connected");
                Ok(())
            }
            Err(e) => {
                connection.close().await;
                self.state = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    async fn hello(&mut self, connection: &mut D::Connection) -> Result<(), PushError> {
        let hello = serde_json::to_string(&HelloRequest::new(self.session.user_agent_id()))?;
        connection
            .send_text(&hello)
            .await
            .map_err(PushError::Connection)?;
        self.state = ClientState::AwaitingHelloAck;

        let raw = connection
            .recv_text()
            .await
            .map_err(PushError::Connection)?;

        match InboundFrame::parse(&raw) {
            Ok(InboundFrame::HelloAck(ack)) => {
                log::debug!("[PushService] Hello acknowledged with status {}", ack.status);
                self.session.assign(&ack.uaid);
                Ok(())
            }
            Ok(frame) => Err(PushError::Handshake {
                reason: format!("expected hello, got {}", frame.kind()),
                raw,
            }),
            Err(e) => Err(PushError::Handshake {
                reason: e.to_string(),
                raw,
            }),
        }
    }

    /// Send a register request and validate the reply. Returns the channel id.
    async fn register_channel(&mut self, server_key: &str) -> Result<String, PushError> {
        let subscription = PushSubscription::generate(server_key);
        let channel_id = subscription.channel_id().to_string();
        let request = serde_json::to_string(&RegisterRequest::new(&channel_id, server_key))?;

        let raw = match self.exchange(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                self.close_connection().await;
                return Err(PushError::Connection(e));
            }
        };

        let ack = match InboundFrame::parse(&raw) {
            Ok(InboundFrame::RegisterAck(ack)) => ack,
            Ok(frame) => {
                return Err(PushError::Registration {
                    reason: format!("expected register, got {}", frame.kind()),
                    raw,
                })
            }
            Err(e) => {
                return Err(PushError::Registration {
                    reason: e.to_string(),
                    raw,
                })
            }
        };

        if ack.status != 200 {
            return Err(PushError::Registration {
                reason: format!("status {}", ack.status),
                raw,
            });
        }
        if ack.channel_id != channel_id {
            return Err(PushError::Registration {
                reason: format!("reply is for channel {}", ack.channel_id),
                raw,
            });
        }
        let Some(push_endpoint) = ack.push_endpoint else {
            return Err(PushError::Registration {
                reason: "missing pushEndpoint".to_string(),
                raw,
            });
        };

        self.subscriptions.insert(subscription)?;
        self.subscriptions.set_endpoint(&channel_id, &push_endpoint)?;
        Ok(channel_id)
    }

    /// Send one frame and wait for the next one on the open connection.
    async fn exchange(&mut self, text: &str) -> anyhow::Result<String> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no open connection"))?;
        connection.send_text(text).await?;
        connection.recv_text().await
    }

    async fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }

    fn require_state(
        &self,
        operation: &'static str,
        allowed: &[ClientState],
    ) -> Result<(), PushError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PushError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
