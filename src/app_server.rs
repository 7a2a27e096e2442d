//! Application-server collaborator.
//!
//! After a channel is registered, its push endpoint, auth secret and
//! client public key are handed to the application server that will send
//! notifications. That call needs a logged-in cookie session, obtained by
//! posting credentials from the environment to the login form.

// Rust guideline compliant 2026-02

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;

use crate::config::AppServerConfig;
use crate::error::AppServerError;
use crate::notifications::subscription::PushSubscription;

/// Environment variable holding the login e-mail.
pub const EMAIL_VAR: &str = "NICONICO_EMAIL";
/// Environment variable holding the login password.
pub const PASSWORD_VAR: &str = "NICONICO_PASSWORD";

/// Login credentials.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from `NICONICO_EMAIL` and `NICONICO_PASSWORD`.
    pub fn from_env() -> Result<Self, AppServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppServerError> {
        let read = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(AppServerError::MissingCredentials(name))
        };
        Ok(Self {
            email: read(EMAIL_VAR)?,
            password: read(PASSWORD_VAR)?,
        })
    }

    /// Login e-mail.
    pub fn email(&self) -> &str {
        &self.email
    }
}

/// The three values an application server needs to encrypt for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointRegistration {
    /// Push endpoint URL.
    pub endpoint: String,
    /// Auth secret, standard base64.
    pub auth: String,
    /// Uncompressed client public key, standard base64.
    pub p256dh: String,
}

impl EndpointRegistration {
    /// Collect the registration values of a registered subscription.
    pub fn for_subscription(subscription: &PushSubscription) -> Result<Self, AppServerError> {
        let endpoint = subscription
            .push_endpoint()
            .ok_or_else(|| AppServerError::MissingEndpoint(subscription.channel_id().to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            auth: BASE64.encode(subscription.auth_secret()),
            p256dh: BASE64.encode(subscription.client_public_bytes()),
        })
    }
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    #[serde(rename = "destApp")]
    dest_app: &'a str,
    endpoint: &'a EndpointRegistration,
}

/// Logged-in HTTP session with the application server.
#[derive(Debug)]
pub struct AppServerClient {
    http: reqwest::Client,
    config: AppServerConfig,
}

impl AppServerClient {
    /// Post `credentials` to the login form and keep the session cookies.
    ///
    /// The login form answers with redirects whatever the outcome, so only
    /// transport failures are errors here; a bad login shows up as a
    /// rejected registration.
    pub async fn login(
        config: AppServerConfig,
        credentials: &Credentials,
    ) -> Result<Self, AppServerError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        log::info!("[AppServer] Logging in as {}", credentials.email);
        let response = http
            .post(&config.login_url)
            .form(&[
                ("mail_tel", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;
        log::debug!("[AppServer] Login answered {}", response.status());

        Ok(Self { http, config })
    }

    /// Hand a push endpoint to the application server.
    pub async fn register_endpoint(
        &self,
        registration: &EndpointRegistration,
    ) -> Result<(), AppServerError> {
        let body = RegistrationBody {
            dest_app: &self.config.dest_app,
            endpoint: registration,
        };

        let response = self
            .http
            .post(&self.config.register_endpoint)
            .header("Referer", &self.config.referer)
            .header("x-request-with", &self.config.request_with)
            .header("x-frontend-id", &self.config.frontend_id)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("[AppServer] Endpoint registration rejected: {} {}", status, body);
            return Err(AppServerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        log::info!("[AppServer] Registered push endpoint {}", registration.endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::subscription::SubscriptionStore;

    #[test]
    fn test_credentials_missing_email() {
        let err = Credentials::from_lookup(|name| (name == PASSWORD_VAR).then(|| "pw".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppServerError::MissingCredentials(EMAIL_VAR)));
    }

    #[test]
    fn test_credentials_empty_password_is_missing() {
        let err = Credentials::from_lookup(|name| {
            Some(if name == EMAIL_VAR { "a@example.test" } else { "" }.to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AppServerError::MissingCredentials(PASSWORD_VAR)));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::from_lookup(|name| {
            Some(if name == EMAIL_VAR { "a@example.test" } else { "hunter2" }.to_string())
        })
        .unwrap();
        assert_eq!(creds.email(), "a@example.test");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_registration_requires_endpoint() {
        let mut store = SubscriptionStore::new();
        let sub = store.create("BKEY").unwrap();
        assert!(matches!(
            EndpointRegistration::for_subscription(sub),
            Err(AppServerError::MissingEndpoint(_))
        ));
    }

    #[test]
    fn test_registration_encodes_keys_with_standard_base64() {
        let mut store = SubscriptionStore::new();
        let id = store.create("BKEY").unwrap().channel_id().to_string();
        store.set_endpoint(&id, "https://push.example/wpush/v2/x").unwrap();
        let sub = store.lookup(&id).unwrap();

        let registration = EndpointRegistration::for_subscription(sub).unwrap();
        assert_eq!(registration.endpoint, "https://push.example/wpush/v2/x");
        assert_eq!(BASE64.decode(&registration.auth).unwrap(), sub.auth_secret());
        let p256dh = BASE64.decode(&registration.p256dh).unwrap();
        assert_eq!(p256dh.len(), 65);
        assert_eq!(p256dh[0], 0x04);
    }
}
