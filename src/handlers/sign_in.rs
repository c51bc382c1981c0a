// Sign-in handler: starts the authorization code flow
use actix_web::http::header::LOCATION;
use actix_web::{error, web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use url::Url;

use super::{callback_url, sanitize_redirect_path};
use crate::oauth::{
    derive_code_challenge, generate_code_verifier, generate_nonce, generate_state,
    CODE_CHALLENGE_METHOD,
};
use crate::session::{SessionError, SessionManager};
use crate::settings::OidcSettings;
use crate::utils::logging::LoggingHelper;

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    /// Path to return to after login
    pub rd: Option<String>,
}

/// Redirect the browser to the provider's authorization endpoint
///
/// CSRF state, nonce, PKCE verifier and the return path are kept in the session.
///
/// # Errors
///
/// Returns an error if the authorization endpoint is not a valid URL or the session
/// cannot be saved.
pub async fn oauth_sign_in(
    query: web::Query<SignInQuery>,
    req: HttpRequest,
    settings: web::Data<OidcSettings>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let mut response = HttpResponse::Found();

    let mut session = match session_manager.load(&req) {
        Ok(session) => session,
        Err(SessionError::Expired | SessionError::Store(_)) => {
            session_manager.expire_request_cookies(&req, &mut response);
            session_manager.new_session()
        }
        Err(e) => return Err(e.into()),
    };

    let csrf = generate_state();
    let nonce = generate_nonce();
    session.set_csrf(&csrf);
    session.set_nonce(&nonce);
    session.set_incoming_path(&sanitize_redirect_path(query.rd.as_deref()));

    let code_challenge = if settings.provider.enable_pkce {
        let verifier = generate_code_verifier();
        session.set_code_verifier(&verifier);
        Some(derive_code_challenge(&verifier))
    } else {
        session.set_code_verifier("");
        None
    };

    let auth_url = build_authorization_url(
        &settings,
        &callback_url(&req, &settings),
        &csrf,
        &nonce,
        code_challenge.as_deref(),
    )
    .map_err(|e| {
        log::error!("Invalid authorization endpoint: {e}");
        error::ErrorInternalServerError("OAuth provider misconfigured")
    })?;

    session.save(&req, &mut response)?;
    LoggingHelper::log_sign_in_redirect(code_challenge.is_some());

    Ok(response.append_header((LOCATION, auth_url)).finish())
}

/// Authorization request URL for the code flow
///
/// # Errors
///
/// Returns an error if the configured authorization endpoint is not an absolute URL.
pub fn build_authorization_url(
    settings: &OidcSettings,
    redirect_uri: &str,
    state: &str,
    nonce: &str,
    code_challenge: Option<&str>,
) -> Result<String, url::ParseError> {
    let provider = &settings.provider;
    let mut url = Url::parse(&provider.authorization_endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &provider.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        if let Some(challenge) = code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
        }
    }
    Ok(url.into())
}
