//! Push subscriptions and the in-memory subscription table.
//!
//! Each channel owns exactly one P-256 key pair and one 16-byte auth
//! secret, generated when the subscription is created and never shared
//! with another channel.

// Rust guideline compliant 2026-02

use std::collections::HashMap;

use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::RngCore;

use crate::error::SubscriptionError;

/// Length of the shared auth secret in bytes.
pub const AUTH_SECRET_LEN: usize = 16;

/// A single channel subscription with its key material.
///
/// Immutable after creation except for the push endpoint, which is set
/// once when the push service acknowledges the registration.
#[derive(Clone)]
pub struct PushSubscription {
    channel_id: String,
    server_key: String,
    push_endpoint: Option<String>,
    auth_secret: [u8; AUTH_SECRET_LEN],
    client_secret: SecretKey,
}

impl std::fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSubscription")
            .field("channel_id", &self.channel_id)
            .field("push_endpoint", &self.push_endpoint)
            .finish_non_exhaustive()
    }
}

impl PushSubscription {
    /// Generate a fresh subscription for `server_key`.
    ///
    /// Picks a random v4 channel id, a new P-256 key pair and a random auth secret.
    pub fn generate(server_key: &str) -> Self {
        let mut auth_secret = [0u8; AUTH_SECRET_LEN];
        rand::rng().fill_bytes(&mut auth_secret);

        Self {
            channel_id: uuid::Uuid::new_v4().to_string(),
            server_key: server_key.to_string(),
            push_endpoint: None,
            auth_secret,
            client_secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Rebuild a subscription from existing key material.
    #[cfg(test)]
    pub(crate) fn from_parts(
        channel_id: impl Into<String>,
        server_key: impl Into<String>,
        client_secret: SecretKey,
        auth_secret: [u8; AUTH_SECRET_LEN],
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            server_key: server_key.into(),
            push_endpoint: None,
            auth_secret,
            client_secret,
        }
    }

    /// Client-chosen channel id (UUID v4 string).
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Application server key presented at registration.
    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    /// Push endpoint URL, once registration succeeded.
    pub fn push_endpoint(&self) -> Option<&str> {
        self.push_endpoint.as_deref()
    }

    /// The 16-byte auth secret shared with senders.
    pub fn auth_secret(&self) -> &[u8; AUTH_SECRET_LEN] {
        &self.auth_secret
    }

    /// Client private key used for ECDH.
    pub fn client_secret(&self) -> &SecretKey {
        &self.client_secret
    }

    /// Client public key.
    pub fn client_public(&self) -> PublicKey {
        self.client_secret.public_key()
    }

    /// Uncompressed SEC1 encoding of the client public key (65 bytes).
    pub fn client_public_bytes(&self) -> Vec<u8> {
        self.client_public().to_encoded_point(false).as_bytes().to_vec()
    }
}

/// Subscriptions keyed by channel id.
///
/// Mutated only from the control flow (registration); the receive loop
/// only reads it.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    subscriptions: HashMap<String, PushSubscription>,
}

impl SubscriptionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and store a new subscription for `server_key`.
    pub fn create(&mut self, server_key: &str) -> Result<&PushSubscription, SubscriptionError> {
        self.insert(PushSubscription::generate(server_key))
    }

    /// Store an already generated subscription.
    pub fn insert(
        &mut self,
        subscription: PushSubscription,
    ) -> Result<&PushSubscription, SubscriptionError> {
        use std::collections::hash_map::Entry;

        match self.subscriptions.entry(subscription.channel_id.clone()) {
            Entry::Occupied(entry) => Err(SubscriptionError::DuplicateChannel(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(subscription)),
        }
    }

    /// Look up the subscription for `channel_id`.
    pub fn lookup(&self, channel_id: &str) -> Result<&PushSubscription, SubscriptionError> {
        self.subscriptions
            .get(channel_id)
            .ok_or_else(|| SubscriptionError::NotFound(channel_id.to_string()))
    }

    /// Record the push endpoint returned by the service. Only allowed once.
    pub fn set_endpoint(&mut self, channel_id: &str, url: &str) -> Result<(), SubscriptionError> {
        let subscription = self
            .subscriptions
            .get_mut(channel_id)
            .ok_or_else(|| SubscriptionError::NotFound(channel_id.to_string()))?;

        if subscription.push_endpoint.is_some() {
            return Err(SubscriptionError::EndpointAlreadySet(channel_id.to_string()));
        }
        subscription.push_endpoint = Some(url.to_string());
        Ok(())
    }

    /// All stored subscriptions.
    pub fn iter(&self) -> impl Iterator<Item = &PushSubscription> {
        self.subscriptions.values()
    }

    /// Number of stored subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
