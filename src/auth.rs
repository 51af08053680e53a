use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Long-lived OAuth credentials exchanged for a bearer token on every run.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated request context.
///
/// Holds one `reqwest::Client` so connections are reused across page fetches.
#[derive(Clone, Debug)]
pub struct Session {
    client: reqwest::Client,
    access_token: SecretString,
}

impl Session {
    pub fn new(client: reqwest::Client, access_token: SecretString) -> Self {
        Self {
            client,
            access_token,
        }
    }

    /// Build an authenticated GET request.
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Exchange the refresh token for a short-lived access token.
///
/// Any non-200 answer is fatal for the run; there is no retry.
pub async fn establish_session(token_url: &str, credentials: &Credentials) -> Result<Session> {
    info!("Requesting access token");
    let client = http_client()?;

    let form = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.expose_secret()),
        ("refresh_token", credentials.refresh_token.expose_secret()),
        ("grant_type", "refresh_token"),
    ];
    let resp = client.post(token_url).form(&form).send().await?;

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(SyncError::Authentication {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = resp.json().await?;
    debug!("Access token obtained");
    Ok(Session::new(client, SecretString::new(token.access_token.into())))
}
