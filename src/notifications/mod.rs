//! Web push notification receiving.
//!
//! Holds the per-channel key material and turns encrypted notification
//! frames back into application data.
//!
//! # Architecture
//!
//! ```text
//! notification frame (channelID, base64url data)
//!     ↓
//! dispatcher: base64url decode, look up channel
//!     ↓
//! subscription store: client key pair + auth secret
//!     ↓
//! ece: ECDH + HKDF + AES-128-GCM, strip padding
//!     ↓
//! NotificationSink (stdout, channel)
//! ```
//!
//! # Subscriptions
//!
//! Each registered channel gets its own P-256 key pair and 16-byte auth
//! secret, generated once and never shared between channels. The public
//! key and auth secret are what the application server encrypts to.

// Rust guideline compliant 2026-02

pub mod dispatcher;
pub mod ece;
pub mod subscription;
