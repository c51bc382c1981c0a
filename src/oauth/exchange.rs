//! OAuth2 token endpoint client
//!
//! Handles the `authorization_code` (optionally with PKCE) and `refresh_token` grants.
//! Every call gets its own HTTP client with an empty cookie jar, so cookies set by
//! the provider during redirects never leak between exchanges. No retries happen
//! here; dropping the returned future cancels the request.

use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionData;
use crate::settings::ProviderSettings;
use crate::utils::logging::LoggingHelper;

/// Redirects followed before the exchange is abandoned
pub const MAX_REDIRECTS: usize = 50;

/// Error bodies beyond this size are truncated
const MAX_ERROR_BODY_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token endpoint response; absent fields decode as empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

impl TokenResponse {
    /// Token kept in the session's access slot: the ID token when the provider
    /// issued one, the access token otherwise
    #[must_use]
    pub fn session_token(&self) -> &str {
        if self.id_token.is_empty() {
            &self.access_token
        } else {
            &self.id_token
        }
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to exchange tokens: {0}")]
    Request(#[source] reqwest::Error),
    #[error("token endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode token response: {0}")]
    Decode(String),
    #[error("session has no refresh token")]
    MissingRefreshToken,
}

/// Client for the provider's token endpoint
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    token_url: String,
    client_id: String,
    client_secret: String,
    enable_pkce: bool,
    timeout: Duration,
}

impl TokenExchangeClient {
    #[must_use]
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        enable_pkce: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            enable_pkce,
            timeout,
        }
    }

    #[must_use]
    pub fn from_settings(provider: &ProviderSettings, timeout: Duration) -> Self {
        Self::new(
            &provider.token_endpoint,
            &provider.client_id,
            &provider.client_secret,
            provider.enable_pkce,
            timeout,
        )
    }

    #[must_use]
    pub const fn pkce_enabled(&self) -> bool {
        self.enable_pkce
    }

    /// Form body for a token request
    ///
    /// `redirect_url` and `code_verifier` only apply to the `authorization_code` grant.
    #[must_use]
    pub fn token_request_form(
        &self,
        grant: GrantType,
        code_or_token: &str,
        redirect_url: &str,
        code_verifier: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", grant.as_str().to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];

        match grant {
            GrantType::AuthorizationCode => {
                form.push(("code", code_or_token.to_string()));
                form.push(("redirect_uri", redirect_url.to_string()));
                if let Some(verifier) = code_verifier.filter(|v| !v.is_empty()) {
                    form.push(("code_verifier", verifier.to_string()));
                }
            }
            GrantType::RefreshToken => {
                form.push(("refresh_token", code_or_token.to_string()));
            }
        }
        form
    }

    fn build_client(&self) -> Result<reqwest::Client, ExchangeError> {
        // Fresh jar per call; provider cookies never reach the next exchange
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(self.timeout)
            .build()
            .map_err(ExchangeError::Client)
    }

    /// Perform one token endpoint call
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Request` on transport failure, timeout, or too many redirects
    /// - `ExchangeError::Status` if the endpoint does not answer 200
    /// - `ExchangeError::Decode` if the body is not a token response
    pub async fn exchange(
        &self,
        grant: GrantType,
        code_or_token: &str,
        redirect_url: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, ExchangeError> {
        LoggingHelper::log_token_exchange_start(grant.as_str());

        let result = self
            .send(grant, code_or_token, redirect_url, code_verifier)
            .await;
        match &result {
            Ok(tokens) => LoggingHelper::log_token_exchange_success(
                grant.as_str(),
                !tokens.refresh_token.is_empty(),
            ),
            Err(err) => LoggingHelper::log_token_exchange_failed(grant.as_str(), err),
        }
        result
    }

    async fn send(
        &self,
        grant: GrantType,
        code_or_token: &str,
        redirect_url: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, ExchangeError> {
        let form = self.token_request_form(grant, code_or_token, redirect_url, code_verifier);
        let client = self.build_client()?;

        let response = client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(ExchangeError::Request)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = read_bounded_body(response).await;
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(ExchangeError::Request)?;
        serde_json::from_slice(&bytes).map_err(|e| ExchangeError::Decode(e.to_string()))
    }

    /// Exchange a refresh token for new tokens
    ///
    /// # Errors
    ///
    /// See [`TokenExchangeClient::exchange`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ExchangeError> {
        self.exchange(GrantType::RefreshToken, refresh_token, "", None)
            .await
    }

    /// Exchange an authorization code for tokens
    ///
    /// The verifier is sent only when PKCE is enabled and the verifier is non-empty.
    ///
    /// # Errors
    ///
    /// See [`TokenExchangeClient::exchange`].
    pub async fn code_for_token(
        &self,
        code: &str,
        redirect_url: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let verifier = Some(code_verifier).filter(|v| self.enable_pkce && !v.is_empty());
        self.exchange(GrantType::AuthorizationCode, code, redirect_url, verifier)
            .await
    }

    /// Refresh the tokens stored in `session`
    ///
    /// Holds the session's refresh lock for the whole read/exchange/write sequence.
    /// The refresh token is replaced only when the provider rotates it.
    ///
    /// # Errors
    ///
    /// `ExchangeError::MissingRefreshToken` if the session holds no refresh token,
    /// otherwise see [`TokenExchangeClient::exchange`]. The session is untouched on error.
    pub async fn refresh_session(
        &self,
        session: &mut SessionData,
    ) -> Result<TokenResponse, ExchangeError> {
        let lock = session.refresh_lock();
        let _guard = lock.lock().await;

        let refresh_token = session.refresh_token();
        if refresh_token.is_empty() {
            return Err(ExchangeError::MissingRefreshToken);
        }

        let tokens = self.refresh(&refresh_token).await?;
        session.set_access_token(tokens.session_token());
        if !tokens.refresh_token.is_empty() {
            session.set_refresh_token(&tokens.refresh_token);
        }
        Ok(tokens)
    }
}

async fn read_bounded_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while body.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    body.truncate(MAX_ERROR_BODY_BYTES);
    String::from_utf8_lossy(&body).into_owned()
}
