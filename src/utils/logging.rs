// Centralized logging helpers; token values are never logged, only their sizes
use log::{debug, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log how a token was laid out across cookies
    pub fn log_token_stored(kind: &str, token_len: usize, chunks: usize) {
        if chunks == 0 {
            debug!("Stored {kind} token inline ({token_len} bytes)");
        } else {
            debug!("Stored {kind} token in {chunks} chunk cookies ({token_len} bytes)");
        }
    }

    pub fn log_session_expired(age_seconds: i64) {
        info!("Session expired after {age_seconds}s, clearing session state");
    }

    pub fn log_token_exchange_start(grant_type: &str) {
        info!("🔄 Exchanging {grant_type} at token endpoint");
    }

    pub fn log_token_exchange_success(grant_type: &str, refresh_token_present: bool) {
        info!(
            "Token exchange succeeded for {grant_type}: refresh_token={}",
            if refresh_token_present { "present" } else { "missing" }
        );
    }

    pub fn log_token_exchange_failed(grant_type: &str, error: &dyn std::fmt::Display) {
        warn!("Token exchange failed for {grant_type}: {error}");
    }

    pub fn log_cache_cleanup(removed: usize, remaining: usize) {
        if removed > 0 {
            debug!("Token cache sweep removed {removed} entries, {remaining} remaining");
        }
    }

    pub fn log_sign_in_redirect(pkce: bool) {
        info!("Redirecting to authorization endpoint (pkce={pkce})");
    }

    pub fn log_callback_rejected(reason: &str) {
        warn!("Rejected OAuth callback: {reason}");
    }

    pub fn log_session_established(email: &str) {
        info!("Session established for user: {email}");
    }

    pub fn log_logout_redirect(target: &str, provider_logout: bool) {
        info!("Logout complete, redirecting to {target} (provider logout: {provider_logout})");
    }

    pub fn log_server_start(bind_address: &str) {
        info!("🚀 Starting OIDC session service on {bind_address}");
    }
}
