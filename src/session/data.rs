//! Per-request session state
//!
//! [`SessionData`] is the handle handlers work with. Its state is checked out of the
//! manager's pool on load and returned on [`SessionData::clear`].

use actix_web::HttpRequest;
use chrono::Utc;
use std::sync::Arc;

use crate::session::cookie::{
    CookieWriter, Partition, ABSOLUTE_SESSION_TIMEOUT_SECS, ACCESS_TOKEN_COOKIE,
    MAIN_COOKIE_NAME, REFRESH_TOKEN_COOKIE,
};
use crate::session::manager::{SessionError, Shared};
use crate::session::store::{CookieStore, StoreError};
use crate::session::token_storage::TokenSlot;
use crate::utils::crypto::generate_secure_random_hex;
use crate::utils::logging::LoggingHelper;

const AUTHENTICATED_KEY: &str = "authenticated";
const CREATED_AT_KEY: &str = "created_at";
const CSRF_KEY: &str = "csrf";
const NONCE_KEY: &str = "nonce";
const CODE_VERIFIER_KEY: &str = "code_verifier";
const EMAIL_KEY: &str = "email";
const INCOMING_PATH_KEY: &str = "incoming_path";

/// Number of random bytes in a session identifier
const SESSION_ID_BYTES: usize = 32;

/// Reusable storage behind a [`SessionData`]
#[derive(Debug)]
pub(crate) struct SessionState {
    main: Partition,
    access: TokenSlot,
    refresh: TokenSlot,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            main: Partition::new(MAIN_COOKIE_NAME),
            access: TokenSlot::new(ACCESS_TOKEN_COOKIE),
            refresh: TokenSlot::new(REFRESH_TOKEN_COOKIE),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub(crate) fn load_main(
        &mut self,
        store: &dyn CookieStore,
        req: &HttpRequest,
    ) -> Result<(), StoreError> {
        self.main = store.get(req, MAIN_COOKIE_NAME)?;
        Ok(())
    }

    pub(crate) fn load_tokens(
        &mut self,
        store: &dyn CookieStore,
        req: &HttpRequest,
    ) -> Result<(), StoreError> {
        self.access.load(store, req)?;
        self.refresh.load(store, req)
    }

    /// Seconds since `created_at`, if the main partition carries one
    pub(crate) fn session_age(&self) -> Option<i64> {
        self.main
            .get_int(CREATED_AT_KEY)
            .map(|created_at| Utc::now().timestamp() - created_at)
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.session_age()
            .is_some_and(|age| age > ABSOLUTE_SESSION_TIMEOUT_SECS)
    }

    /// Drop all values so nothing leaks into the next checkout
    pub(crate) fn reset(&mut self) {
        self.main = Partition::new(MAIN_COOKIE_NAME);
        self.access.reset();
        self.refresh.reset();
    }
}

/// Session for the current request, spread across main, access and refresh cookies
#[derive(Debug)]
pub struct SessionData {
    shared: Arc<Shared>,
    state: SessionState,
}

impl SessionData {
    pub(crate) fn new(shared: Arc<Shared>, state: SessionState) -> Self {
        Self { shared, state }
    }

    // =========================================================================
    // Authentication state
    // =========================================================================

    /// True if the authenticated flag is set and the session is within its absolute lifetime
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        if !self.state.main.get_bool(AUTHENTICATED_KEY).unwrap_or(false) {
            return false;
        }
        self.state
            .session_age()
            .is_some_and(|age| age <= ABSOLUTE_SESSION_TIMEOUT_SECS)
    }

    /// Set the authentication flag
    ///
    /// Marking the session authenticated rotates the session id and restarts the
    /// absolute lifetime. Clearing the flag leaves both untouched.
    pub fn set_authenticated(&mut self, value: bool) {
        if value {
            self.state
                .main
                .set_id(generate_secure_random_hex(SESSION_ID_BYTES));
            self.state
                .main
                .insert(CREATED_AT_KEY, Utc::now().timestamp());
        }
        self.state.main.insert(AUTHENTICATED_KEY, value);
    }

    /// Identifier of the main partition, rotated on every successful authentication
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.state.main.id()
    }

    /// Unix timestamp of the last authentication
    #[must_use]
    pub fn created_at(&self) -> Option<i64> {
        self.state.main.get_int(CREATED_AT_KEY)
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn set_created_at(&mut self, timestamp: i64) {
        self.state.main.insert(CREATED_AT_KEY, timestamp);
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    #[must_use]
    pub fn access_token(&self) -> String {
        self.state.access.token()
    }

    /// Store the access token, inline or chunked depending on its compressed size
    pub fn set_access_token(&mut self, token: &str) {
        let chunks = self.state.access.set_token(token);
        LoggingHelper::log_token_stored("access", token.len(), chunks);
    }

    #[must_use]
    pub fn refresh_token(&self) -> String {
        self.state.refresh.token()
    }

    /// Store the refresh token, inline or chunked depending on its compressed size
    pub fn set_refresh_token(&mut self, token: &str) {
        let chunks = self.state.refresh.set_token(token);
        LoggingHelper::log_token_stored("refresh", token.len(), chunks);
    }

    /// Number of live chunk cookies for the access token
    #[must_use]
    pub fn access_token_chunks(&self) -> usize {
        self.state.access.chunk_len()
    }

    /// Number of live chunk cookies for the refresh token
    #[must_use]
    pub fn refresh_token_chunks(&self) -> usize {
        self.state.refresh.chunk_len()
    }

    /// Lock serializing refresh read/modify/write sequences on this session
    #[must_use]
    pub fn refresh_lock(&self) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.state.refresh_lock)
    }

    // =========================================================================
    // Login flow values
    // =========================================================================

    fn main_str(&self, key: &str) -> String {
        self.state
            .main
            .get_str(key)
            .map(str::to_string)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn csrf(&self) -> String {
        self.main_str(CSRF_KEY)
    }

    pub fn set_csrf(&mut self, token: &str) {
        self.state.main.insert(CSRF_KEY, token);
    }

    #[must_use]
    pub fn nonce(&self) -> String {
        self.main_str(NONCE_KEY)
    }

    pub fn set_nonce(&mut self, nonce: &str) {
        self.state.main.insert(NONCE_KEY, nonce);
    }

    #[must_use]
    pub fn code_verifier(&self) -> String {
        self.main_str(CODE_VERIFIER_KEY)
    }

    pub fn set_code_verifier(&mut self, verifier: &str) {
        self.state.main.insert(CODE_VERIFIER_KEY, verifier);
    }

    #[must_use]
    pub fn email(&self) -> String {
        self.main_str(EMAIL_KEY)
    }

    pub fn set_email(&mut self, email: &str) {
        self.state.main.insert(EMAIL_KEY, email);
    }

    #[must_use]
    pub fn incoming_path(&self) -> String {
        self.main_str(INCOMING_PATH_KEY)
    }

    pub fn set_incoming_path(&mut self, path: &str) {
        self.state.main.insert(INCOMING_PATH_KEY, path);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every partition to `writer`
    ///
    /// Order: main, access, refresh, access chunks, refresh chunks. Stops at the
    /// first failing partition; cookies already written stay written.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persist` if a partition cannot be encoded.
    pub fn save(
        &mut self,
        req: &HttpRequest,
        writer: &mut dyn CookieWriter,
    ) -> Result<(), SessionError> {
        let options = self.shared.options_for(is_secure_request(req));
        let store = self.shared.store.as_ref();
        let state = &mut self.state;

        state.main.apply_options(&options);
        store
            .save(&state.main, writer)
            .map_err(SessionError::Persist)?;
        state
            .access
            .save_partition(store, writer, &options)
            .map_err(SessionError::Persist)?;
        state
            .refresh
            .save_partition(store, writer, &options)
            .map_err(SessionError::Persist)?;
        state
            .access
            .save_chunks(store, writer, &options)
            .map_err(SessionError::Persist)?;
        state
            .refresh
            .save_chunks(store, writer, &options)
            .map_err(SessionError::Persist)
    }

    /// Expire every partition and return the state to the pool
    ///
    /// With a writer, the expiring cookies are flushed through [`SessionData::save`].
    /// The state is released even when that save fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persist` if flushing the expired cookies fails.
    pub fn clear(
        mut self,
        req: &HttpRequest,
        writer: Option<&mut dyn CookieWriter>,
    ) -> Result<(), SessionError> {
        self.state.main.expire();
        self.state.access.clear();
        self.state.refresh.clear();

        let result = match writer {
            Some(writer) => self.save(req, writer),
            None => Ok(()),
        };

        let Self { shared, state } = self;
        shared.release(state);
        result
    }
}

/// True if the request arrived over HTTPS, honouring `Forwarded` / `X-Forwarded-Proto`
#[must_use]
pub fn is_secure_request(req: &HttpRequest) -> bool {
    req.connection_info().scheme() == "https"
}

#[cfg(test)]
mod tests {
    use crate::session::cookie::{chunk_cookie_name, ACCESS_TOKEN_COOKIE, MAX_COOKIE_SIZE};
    use crate::session::token_storage::compress_token;
    use crate::testing::{RequestBuilder, TestFixtures};
    use actix_web::cookie::Cookie;
    use chrono::Utc;

    fn reload(
        manager: &crate::session::SessionManager,
        cookies: Vec<Cookie<'static>>,
    ) -> super::SessionData {
        let req = RequestBuilder::new().with_cookies(cookies).build();
        manager.load(&req).unwrap()
    }

    #[test]
    fn test_small_token_round_trip_has_no_chunks() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        let token = TestFixtures::jwt_like_token(300);
        session.set_access_token(&token);
        assert_eq!(session.access_token_chunks(), 0);
        assert_eq!(session.access_token(), token);

        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();
        assert!(!cookies
            .iter()
            .any(|c| c.name() == chunk_cookie_name(ACCESS_TOKEN_COOKIE, 0)));

        let reloaded = reload(&manager, cookies);
        assert_eq!(reloaded.access_token(), token);
        assert_eq!(reloaded.access_token_chunks(), 0);
    }

    #[test]
    fn test_large_token_is_chunked_and_reassembled() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        let token = TestFixtures::incompressible_token(7000);
        let expected_chunks = compress_token(&token).len().div_ceil(MAX_COOKIE_SIZE);
        session.set_access_token(&token);
        assert_eq!(session.access_token_chunks(), expected_chunks);

        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();
        for index in 0..expected_chunks {
            let name = chunk_cookie_name(ACCESS_TOKEN_COOKIE, index);
            assert!(cookies.iter().any(|c| c.name() == name), "missing {name}");
        }

        let reloaded = reload(&manager, cookies);
        assert_eq!(reloaded.access_token_chunks(), expected_chunks);
        assert_eq!(reloaded.access_token(), token);
    }

    #[test]
    fn test_replacing_chunked_token_expires_old_chunks() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        session.set_refresh_token(&TestFixtures::incompressible_token(7000));
        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();

        let mut reloaded = reload(&manager, cookies);
        assert!(reloaded.refresh_token_chunks() > 1);

        reloaded.set_refresh_token("short-refresh-token");
        assert_eq!(reloaded.refresh_token_chunks(), 0);
        assert_eq!(reloaded.refresh_token(), "short-refresh-token");

        let mut second = Vec::new();
        reloaded.save(&req, &mut second).unwrap();
        let expired_chunks: Vec<_> = second
            .iter()
            .filter(|c| c.name().starts_with("_oidc_raczylo_r_"))
            .collect();
        assert!(!expired_chunks.is_empty());
        assert!(expired_chunks
            .iter()
            .all(|c| c.value().is_empty() && c.max_age().unwrap().is_negative()));

        // Browser drops the expired chunk cookies and keeps the rest
        let kept: Vec<_> = second
            .into_iter()
            .filter(|c| !c.max_age().unwrap().is_negative())
            .collect();
        let final_session = reload(&manager, kept);
        assert_eq!(final_session.refresh_token(), "short-refresh-token");
        assert_eq!(final_session.refresh_token_chunks(), 0);
    }

    #[test]
    fn test_set_authenticated_rotates_id_and_timestamp() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        session.set_authenticated(true);
        let first_id = session.session_id().to_string();
        assert_eq!(first_id.len(), 64);
        assert!(session.is_authenticated());

        session.set_created_at(1_000);
        session.set_authenticated(true);
        assert_ne!(session.session_id(), first_id);
        assert!(session.created_at().unwrap() > 1_000);
    }

    #[test]
    fn test_set_authenticated_false_keeps_id_and_timestamp() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        session.set_authenticated(true);
        let id = session.session_id().to_string();
        let created_at = session.created_at();

        session.set_authenticated(false);
        assert!(!session.is_authenticated());
        assert_eq!(session.session_id(), id);
        assert_eq!(session.created_at(), created_at);
    }

    #[test]
    fn test_authentication_lapses_after_absolute_timeout() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        session.set_authenticated(true);
        session.set_created_at(Utc::now().timestamp() - 24 * 60 * 60 - 1);
        assert!(!session.is_authenticated());

        session.set_created_at(Utc::now().timestamp() - 60);
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_flag_without_timestamp_is_not_authenticated() {
        let manager = TestFixtures::session_manager();
        let mut partition = crate::session::Partition::new(crate::session::MAIN_COOKIE_NAME);
        partition.insert("authenticated", true);

        let store = TestFixtures::cookie_store();
        let req = RequestBuilder::new()
            .with_cookie(Cookie::new(
                crate::session::MAIN_COOKIE_NAME,
                store.encode(&partition).unwrap(),
            ))
            .build();
        let session = manager.load(&req).unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_login_flow_values() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();

        session.set_csrf("csrf-value");
        session.set_nonce("nonce-value");
        session.set_code_verifier("verifier-value");
        session.set_email("user@example.com");
        session.set_incoming_path("/dashboard?tab=1");

        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();
        let reloaded = reload(&manager, cookies);

        assert_eq!(reloaded.csrf(), "csrf-value");
        assert_eq!(reloaded.nonce(), "nonce-value");
        assert_eq!(reloaded.code_verifier(), "verifier-value");
        assert_eq!(reloaded.email(), "user@example.com");
        assert_eq!(reloaded.incoming_path(), "/dashboard?tab=1");

        let fresh = manager.load(&RequestBuilder::new().build()).unwrap();
        assert_eq!(fresh.csrf(), "");
        assert_eq!(fresh.code_verifier(), "");
    }

    #[test]
    fn test_save_writes_partitions_in_order() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();
        session.set_access_token(&TestFixtures::incompressible_token(5000));
        session.set_refresh_token(&TestFixtures::incompressible_token(5000));

        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();
        let names: Vec<&str> = cookies.iter().map(Cookie::name).collect();

        assert_eq!(&names[..3], &["_oidc_raczylo_m", "_oidc_raczylo_a", "_oidc_raczylo_r"]);
        let first_refresh_chunk = names.iter().position(|n| *n == "_oidc_raczylo_r_0").unwrap();
        let last_access_chunk = names
            .iter()
            .rposition(|n| n.starts_with("_oidc_raczylo_a_"))
            .unwrap();
        assert!(last_access_chunk < first_refresh_chunk);
    }

    #[test]
    fn test_save_uses_request_scheme_for_secure_flag() {
        let manager = TestFixtures::session_manager();
        let plain = RequestBuilder::new().build();
        let mut session = manager.load(&plain).unwrap();
        session.set_csrf("x");

        let mut cookies = Vec::new();
        session.save(&plain, &mut cookies).unwrap();
        assert!(cookies.iter().all(|c| c.secure() == Some(false)));

        let https = RequestBuilder::new().https().build();
        let mut cookies = Vec::new();
        session.save(&https, &mut cookies).unwrap();
        assert!(cookies.iter().all(|c| c.secure() == Some(true)));
    }

    #[test]
    fn test_clear_expires_all_cookies_and_empties_token() {
        let manager = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();
        let mut session = manager.load(&req).unwrap();
        session.set_authenticated(true);
        session.set_access_token(&TestFixtures::incompressible_token(5000));

        let mut cookies = Vec::new();
        session.save(&req, &mut cookies).unwrap();

        let loaded = reload(&manager, cookies.clone());
        let mut expired = Vec::new();
        loaded.clear(&req, Some(&mut expired)).unwrap();

        assert_eq!(expired.len(), cookies.len());
        assert!(expired
            .iter()
            .all(|c| c.value().is_empty() && c.max_age().unwrap().is_negative()));

        // Reacquire pooled state for the same browser after it dropped the cookies
        let after = manager.load(&RequestBuilder::new().build()).unwrap();
        assert_eq!(after.access_token(), "");
        assert!(!after.is_authenticated());
    }
}
