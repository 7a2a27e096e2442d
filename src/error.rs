//! Error types for the push agent.
//!
//! Errors are scoped by the boundary that contains them:
//!
//! - [`CryptoError`] - one notification; logged and dropped by the dispatcher
//! - [`SubscriptionError`] - subscription table lookups and updates
//! - [`PushError`] - connection and control-phase failures of the push service client
//! - [`AppServerError`] - application-server session and endpoint registration

use crate::push_service::ClientState;

/// Failures while decrypting a single encrypted record.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The record is shorter than the minimum layout or its key-id overruns the buffer.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The sender key is not a valid P-256 point.
    #[error("key agreement failed: sender key is not a valid P-256 point")]
    KeyAgreement,

    /// The AES-GCM tag did not verify.
    #[error("authentication tag mismatch")]
    AuthenticationFailure,

    /// HKDF produced fewer bytes than requested.
    #[error("key derivation produced fewer than {requested} bytes")]
    KeyDerivationShort {
        /// Number of bytes that were requested.
        requested: usize,
    },
}

/// Failures of the in-memory subscription table.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// No subscription exists for the channel id.
    #[error("no subscription for channel {0}")]
    NotFound(String),

    /// A subscription with this channel id is already stored.
    #[error("channel {0} is already registered")]
    DuplicateChannel(String),

    /// The push endpoint was already recorded for this channel.
    #[error("push endpoint for channel {0} is already set")]
    EndpointAlreadySet(String),
}

/// Failures of the push service client.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Dial, upgrade, send or read failure on the transport.
    #[error("connection error: {0:#}")]
    Connection(anyhow::Error),

    /// The hello response was missing or not a hello.
    #[error("handshake failed: {reason} (raw: {raw})")]
    Handshake {
        /// What was wrong with the response.
        reason: String,
        /// Raw response frame.
        raw: String,
    },

    /// The register response was rejected.
    #[error("registration failed: {reason} (raw: {raw})")]
    Registration {
        /// What was wrong with the response.
        reason: String,
        /// Raw response frame.
        raw: String,
    },

    /// Every connect attempt failed. Fatal.
    #[error("giving up after {attempts} connect attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Failure of the final attempt.
        last: Box<PushError>,
    },

    /// The operation is not valid in the client's current state.
    #[error("{operation} is not allowed while {state:?}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the client was in.
        state: ClientState,
    },

    /// Subscription table rejected an update.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of the application-server collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AppServerError {
    /// Login credentials are not present in the environment.
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// The subscription has no push endpoint yet.
    #[error("subscription {0} has no push endpoint")]
    MissingEndpoint(String),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The application server answered with a non-success status.
    #[error("application server returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}
