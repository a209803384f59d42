use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::Result;

/// Header carrying the application's client id on every Helix call.
pub const CLIENT_ID_HEADER: &str = "Client-Id";

/// Application credentials used to authenticate Helix calls. The `access_token` is a user
/// access token; EventSub over WebSocket rejects app access tokens.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub(crate) client_id: String,
    pub(crate) access_token: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(client_id: String, access_token: String) -> Self {
        Self {
            client_id,
            access_token: SecretString::from(access_token),
        }
    }

    /// Returns the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// Builds the `Client-Id` and `Authorization: Bearer` headers for a request.
    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_str(&self.client_id)?);

        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {}", self.access_token.expose_secret()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }
}
