// OAuth callback handler
use actix_web::http::header::LOCATION;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, error, warn};
use serde::Deserialize;
use std::time::Duration;

use super::callback_url;
use crate::oauth::{
    claim_str, extract_claims, ttl_from_claims, Claims, TokenCache, TokenExchangeClient,
    TokenResponse,
};
use crate::session::{SessionData, SessionError, SessionManager};
use crate::settings::OidcSettings;
use crate::utils::logging::LoggingHelper;

/// Query parameters sent back by the authorization endpoint
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Complete the authorization code flow
///
/// Validates the CSRF state, exchanges the code, checks the ID token nonce, caches its
/// claims and marks the session authenticated before returning to the stored path.
///
/// # Errors
///
/// Returns an error if the session cannot be saved.
pub async fn oauth_callback(
    query: web::Query<CallbackQuery>,
    req: HttpRequest,
    settings: web::Data<OidcSettings>,
    session_manager: web::Data<SessionManager>,
    token_client: web::Data<TokenExchangeClient>,
    token_cache: web::Data<TokenCache>,
) -> Result<HttpResponse> {
    let mut session = match session_manager.load(&req) {
        Ok(session) => session,
        Err(e @ (SessionError::Expired | SessionError::Store(_))) => {
            LoggingHelper::log_callback_rejected(&e.to_string());
            let mut response = HttpResponse::BadRequest();
            session_manager.expire_request_cookies(&req, &mut response);
            return Ok(response.body("Login session not found, please sign in again"));
        }
        Err(e) => return Err(e.into()),
    };

    let code = match validate_callback(&query, &session) {
        Ok(code) => code.to_string(),
        Err(response) => return Ok(response),
    };

    let tokens = match token_client
        .code_for_token(&code, &callback_url(&req, &settings), &session.code_verifier())
        .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Failed to exchange authorization code: {e}");
            return Ok(HttpResponse::Unauthorized().body("Authentication failed"));
        }
    };

    let claims = match verify_id_token(&tokens, &session.nonce()) {
        Ok(claims) => claims,
        Err(reason) => {
            LoggingHelper::log_callback_rejected(reason);
            return Ok(HttpResponse::Unauthorized().body("Authentication failed"));
        }
    };

    if let Some(claims) = claims {
        let email = claim_str(&claims, "email").unwrap_or_default().to_string();
        if let Some(ttl) = claims_ttl(&claims, &tokens) {
            token_cache.set(tokens.session_token(), claims, ttl);
        }
        session.set_email(&email);
    }

    let target = match session.incoming_path() {
        path if path.is_empty() => "/".to_string(),
        path => path,
    };

    establish_session(&mut session, &tokens);

    let mut response = HttpResponse::Found();
    session.save(&req, &mut response)?;
    LoggingHelper::log_session_established(&session.email());

    Ok(response.append_header((LOCATION, target)).finish())
}

/// Check provider errors and the CSRF state, returning the authorization code
fn validate_callback<'a>(
    query: &'a CallbackQuery,
    session: &SessionData,
) -> Result<&'a str, HttpResponse> {
    if let Some(err) = query.error.as_deref() {
        warn!(
            "Provider returned error '{err}': {}",
            query.error_description.as_deref().unwrap_or_default()
        );
        LoggingHelper::log_callback_rejected("provider error");
        return Err(HttpResponse::Unauthorized().body("Authentication was denied"));
    }

    let csrf = session.csrf();
    match query.state.as_deref() {
        Some(state) if !csrf.is_empty() && state == csrf => {}
        _ => {
            LoggingHelper::log_callback_rejected("state mismatch");
            return Err(HttpResponse::BadRequest().body("Invalid state parameter"));
        }
    }

    match query.code.as_deref() {
        Some(code) if !code.is_empty() => Ok(code),
        _ => {
            LoggingHelper::log_callback_rejected("missing code");
            Err(HttpResponse::BadRequest().body("Missing authorization code"))
        }
    }
}

/// Decode the ID token, if any, and match its nonce against the session
fn verify_id_token(
    tokens: &TokenResponse,
    expected_nonce: &str,
) -> Result<Option<Claims>, &'static str> {
    if tokens.id_token.is_empty() {
        debug!("Token response carried no ID token");
        return Ok(None);
    }

    let claims = extract_claims(&tokens.id_token).map_err(|e| {
        debug!("Undecodable ID token: {e}");
        "malformed id_token"
    })?;

    if !expected_nonce.is_empty() && claim_str(&claims, "nonce") != Some(expected_nonce) {
        return Err("nonce mismatch");
    }
    Ok(Some(claims))
}

/// Cache lifetime: the `exp` claim, falling back to `expires_in`
fn claims_ttl(claims: &Claims, tokens: &TokenResponse) -> Option<Duration> {
    ttl_from_claims(claims).or_else(|| {
        u64::try_from(tokens.expires_in)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    })
}

fn establish_session(session: &mut SessionData, tokens: &TokenResponse) {
    session.set_authenticated(true);
    session.set_access_token(tokens.session_token());
    if !tokens.refresh_token.is_empty() {
        session.set_refresh_token(&tokens.refresh_token);
    }
    // One-shot login values
    session.set_csrf("");
    session.set_nonce("");
    session.set_code_verifier("");
}
