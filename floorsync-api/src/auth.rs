//! Session verification against the back office auth service
//!
//! The coordinator never mints tokens. A client connects with an opaque
//! session token issued by the main service; we introspect it once at
//! handshake time and trust the returned identity for the life of the
//! connection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use floorsync_core::models::UserIdentity;
use floorsync_core::{Error, Result};

/// Resolves an opaque session token to the user behind it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserIdentity>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

/// Identity payload returned by the introspection endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    user_id: String,
    user_name: String,
    avatar_url: Option<String>,
}

/// Production verifier: POSTs `{token}` to the introspection endpoint
#[derive(Debug, Clone)]
pub struct HttpSessionVerifier {
    client: Client,
    introspection_url: Url,
}

impl HttpSessionVerifier {
    pub fn new(introspection_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let introspection_url = Url::parse(introspection_url.as_ref())
            .map_err(|e| Error::Validation(format!("Invalid introspection URL: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            introspection_url,
        })
    }
}

#[async_trait]
impl SessionVerifier for HttpSessionVerifier {
    async fn verify(&self, token: &str) -> Result<UserIdentity> {
        let response = self
            .client
            .post(self.introspection_url.clone())
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| Error::Authorization(format!("Session service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Authorization(format!(
                "Session rejected with status {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| Error::Authorization(format!("Malformed session response: {e}")))?;

        let mut identity = UserIdentity::new(body.user_id, body.user_name);
        if let Some(avatar) = body.avatar_url {
            identity = identity.with_avatar(avatar);
        }
        Ok(identity)
    }
}
