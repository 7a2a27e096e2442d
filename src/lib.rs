//! Push Agent - WebPush user agent.
//!
//! Connects to a WebPush push service, registers a channel, and decrypts
//! the notifications delivered on it.
//!
//! # Architecture
//!
//! - **PushServiceClient** - Owns the connection, runs hello/register, then the receive loop
//! - **SubscriptionStore** - Per-channel key pairs, auth secrets and endpoints
//! - **NotificationDispatcher** - Decodes, decrypts and emits each notification
//! - **AppServerClient** - Hands the push endpoint to the application server
//!
//! # Modules
//!
//! - [`push_service`] - Protocol client, wire messages, transport, retry policy
//! - [`notifications`] - Subscriptions, decryption, dispatch
//! - [`app_server`] - Application-server login and endpoint registration
//! - [`config`] - Configuration loading
//! - [`error`] - Error types

pub mod app_server;
pub mod config;
pub mod error;
pub mod notifications;
pub mod push_service;

// Re-export commonly used types
pub use app_server::{AppServerClient, Credentials, EndpointRegistration};
pub use config::Config;
pub use error::{AppServerError, CryptoError, PushError, SubscriptionError};
pub use notifications::dispatcher::{
    ChannelSink, DecodedNotification, DispatchOutcome, NotificationDispatcher, NotificationSink,
    WriterSink,
};
pub use notifications::subscription::{PushSubscription, SubscriptionStore};
pub use push_service::{
    ClientState, PushServiceClient, RetryPolicy, ServiceEndpoint, UserAgentSession,
    WebSocketDialer,
};
