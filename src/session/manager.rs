//! Session Manager - Stateless Encrypted Session Handling
//!
//! `SessionManager` is the entry point for reading sessions off incoming requests.
//! It owns the cookie backend and a free-list of reusable session state, so a busy
//! server does not reallocate partition and chunk maps for every request.

use actix_web::{HttpRequest, HttpResponse, ResponseError};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::session::cookie::{CookieOptions, CookieWriter, Partition, COOKIE_PREFIX};
use crate::session::data::{is_secure_request, SessionData, SessionState};
use crate::session::store::{CookieStore, EncryptedCookieStore, StoreError};
use crate::utils::crypto::ENCRYPTION_KEY_SIZE;
use crate::utils::logging::LoggingHelper;

/// Upper bound on idle session states kept for reuse
const MAX_POOLED_SESSIONS: usize = 256;

// =============================================================================
// Types and Error Handling
// =============================================================================

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(String),
    #[error("failed to load session: {0}")]
    Store(#[from] StoreError),
    #[error("session expired")]
    Expired,
    #[error("failed to save session: {0}")]
    Persist(StoreError),
}

impl ResponseError for SessionError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Expired => HttpResponse::Unauthorized().finish(),
            Self::Config(_) | Self::Store(_) | Self::Persist(_) => {
                HttpResponse::InternalServerError().finish()
            }
        }
    }
}

// =============================================================================
// Shared state
// =============================================================================

/// State shared between the manager and every session it hands out
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn CookieStore>,
    pub(crate) force_https: bool,
    pool: Mutex<Vec<SessionState>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("force_https", &self.force_https)
            .field("pooled", &self.pool.lock().len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn options_for(&self, is_secure: bool) -> CookieOptions {
        CookieOptions {
            secure: is_secure || self.force_https,
            ..CookieOptions::default()
        }
    }

    fn acquire(&self) -> SessionState {
        self.pool.lock().pop().unwrap_or_else(SessionState::new)
    }

    pub(crate) fn release(&self, mut state: SessionState) {
        state.reset();
        let mut pool = self.pool.lock();
        if pool.len() < MAX_POOLED_SESSIONS {
            pool.push(state);
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Loads sessions from requests and recycles their state
#[derive(Debug, Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager backed by encrypted cookies
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if `key` is shorter than 32 bytes.
    pub fn new(key: &[u8], force_https: bool) -> Result<Self, SessionError> {
        if key.len() < ENCRYPTION_KEY_SIZE {
            return Err(SessionError::Config(format!(
                "session secret must be at least {ENCRYPTION_KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self::with_store(
            Arc::new(EncryptedCookieStore::new(key)),
            force_https,
        ))
    }

    /// Create a manager over an arbitrary cookie backend
    #[must_use]
    pub fn with_store(store: Arc<dyn CookieStore>, force_https: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                force_https,
                pool: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cookie attributes for a request with the given security context
    #[must_use]
    pub fn options_for(&self, is_secure: bool) -> CookieOptions {
        self.shared.options_for(is_secure)
    }

    #[must_use]
    pub fn force_https(&self) -> bool {
        self.shared.force_https
    }

    /// Number of idle session states waiting for reuse
    #[must_use]
    pub fn pooled_sessions(&self) -> usize {
        self.shared.pool.lock().len()
    }

    /// Load the session carried by `req`
    ///
    /// A request without session cookies yields an empty, unauthenticated session.
    ///
    /// # Errors
    ///
    /// - `SessionError::Store` if a session cookie is present but cannot be decoded
    /// - `SessionError::Expired` if the session outlived its absolute lifetime;
    ///   its state is cleared before returning
    pub fn load(&self, req: &HttpRequest) -> Result<SessionData, SessionError> {
        let mut state = self.shared.acquire();
        let store = self.shared.store.as_ref();

        if let Err(err) = state.load_main(store, req) {
            self.shared.release(state);
            return Err(err.into());
        }

        if state.is_expired() {
            LoggingHelper::log_session_expired(state.session_age().unwrap_or_default());
            let session = SessionData::new(Arc::clone(&self.shared), state);
            // No writer yet; the caller decides what to send back
            session.clear(req, None)?;
            return Err(SessionError::Expired);
        }

        if let Err(err) = state.load_tokens(store, req) {
            self.shared.release(state);
            return Err(err.into());
        }

        Ok(SessionData::new(Arc::clone(&self.shared), state))
    }

    /// Empty session that ignores whatever the request carries
    ///
    /// Used to start over after the request's session expired or could not be decoded.
    #[must_use]
    pub fn new_session(&self) -> SessionData {
        SessionData::new(Arc::clone(&self.shared), self.shared.acquire())
    }

    /// Expire every session cookie present on `req` without decoding it
    ///
    /// Covers chunk cookies of sessions that can no longer be loaded.
    pub fn expire_request_cookies(&self, req: &HttpRequest, writer: &mut dyn CookieWriter) {
        // Resolved before borrowing the cookie jar; both live in the request extensions
        let options = self.options_for(is_secure_request(req));
        let names: Vec<String> = match req.cookies() {
            Ok(cookies) => cookies
                .iter()
                .filter(|c| c.name().starts_with(COOKIE_PREFIX))
                .map(|c| c.name().to_string())
                .collect(),
            Err(_) => return,
        };
        for name in names {
            let mut partition = Partition::new(&name);
            partition.expire();
            partition.apply_options(&options);
            writer.add_cookie(partition.build_cookie(String::new()));
        }
    }
}
