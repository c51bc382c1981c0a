//! Cookie partitions and cookie attribute handling
//!
//! A session is spread over several independently encrypted cookies. Each one is
//! represented by a [`Partition`]: a small map of primitive values plus the cookie
//! attributes it will be written with.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpResponseBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shared prefix of every session cookie
pub const COOKIE_PREFIX: &str = "_oidc_raczylo_";

/// Main session cookie (authentication state, CSRF, nonce, PKCE verifier, ...)
pub const MAIN_COOKIE_NAME: &str = "_oidc_raczylo_m";
/// Access token cookie; chunks are named `_oidc_raczylo_a_<n>`
pub const ACCESS_TOKEN_COOKIE: &str = "_oidc_raczylo_a";
/// Refresh token cookie; chunks are named `_oidc_raczylo_r_<n>`
pub const REFRESH_TOKEN_COOKIE: &str = "_oidc_raczylo_r";

/// Maximum size of a single stored token fragment
pub const MAX_COOKIE_SIZE: usize = 2000;

/// Absolute session lifetime in seconds (24 hours)
pub const ABSOLUTE_SESSION_TIMEOUT_SECS: i64 = 24 * 60 * 60;

/// Name of the `index`-th chunk cookie for a token cookie
#[must_use]
pub fn chunk_cookie_name(base: &str, index: usize) -> String {
    format!("{base}_{index}")
}

/// Options for cookie creation
#[derive(Debug, Clone, PartialEq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: Duration::seconds(ABSOLUTE_SESSION_TIMEOUT_SECS),
        }
    }
}

impl CookieOptions {
    /// Whether these options expire the cookie immediately
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        self.max_age.is_negative()
    }
}

/// A primitive value stored inside a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SessionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Serialized form of a partition, as encrypted into the cookie value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub values: HashMap<String, SessionValue>,
}

/// One cookie worth of session state
#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    id: String,
    values: HashMap<String, SessionValue>,
    options: CookieOptions,
    is_new: bool,
}

impl Partition {
    /// Create an empty partition that was not present on the request
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: String::new(),
            values: HashMap::new(),
            options: CookieOptions::default(),
            is_new: true,
        }
    }

    /// Rebuild a partition decoded from a request cookie
    #[must_use]
    pub fn from_payload(name: &str, payload: PartitionPayload) -> Self {
        Self {
            name: name.to_string(),
            id: payload.id,
            values: payload.values,
            options: CookieOptions::default(),
            is_new: false,
        }
    }

    /// Payload to be encrypted into the cookie value
    #[must_use]
    pub fn to_payload(&self) -> PartitionPayload {
        PartitionPayload {
            id: self.id.clone(),
            values: self.values.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// True if the partition was not found on the incoming request
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub const fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Apply uniform cookie attributes, keeping an already scheduled expiry
    pub fn apply_options(&mut self, options: &CookieOptions) {
        let expiring = self.options.is_expiring();
        self.options = options.clone();
        if expiring {
            self.options.max_age = Duration::seconds(-1);
        }
    }

    /// Drop every value and schedule the cookie for deletion
    pub fn expire(&mut self) {
        self.values.clear();
        self.options.max_age = Duration::seconds(-1);
    }

    pub fn insert(&mut self, key: &str, value: impl Into<SessionValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.values.get(key)
    }

    /// String value for `key`; `None` when absent or of another type
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(SessionValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(SessionValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(SessionValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the outgoing cookie carrying `value` with this partition's attributes
    #[must_use]
    pub fn build_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build(self.name.clone(), value)
            .http_only(self.options.http_only)
            .secure(self.options.secure)
            .same_site(self.options.same_site)
            .path(self.options.path.clone())
            .max_age(self.options.max_age)
            .finish()
    }
}

/// Sink for outgoing `Set-Cookie` headers
pub trait CookieWriter {
    fn add_cookie(&mut self, cookie: Cookie<'static>);
}

impl CookieWriter for Vec<Cookie<'static>> {
    fn add_cookie(&mut self, cookie: Cookie<'static>) {
        self.push(cookie);
    }
}

impl CookieWriter for HttpResponseBuilder {
    fn add_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookie(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_cookie_name() {
        assert_eq!(chunk_cookie_name(ACCESS_TOKEN_COOKIE, 0), "_oidc_raczylo_a_0");
        assert_eq!(chunk_cookie_name(REFRESH_TOKEN_COOKIE, 12), "_oidc_raczylo_r_12");
    }

    #[test]
    fn test_typed_getters() {
        let mut partition = Partition::new(MAIN_COOKIE_NAME);
        partition.insert("authenticated", true);
        partition.insert("created_at", 1_700_000_000_i64);
        partition.insert("csrf", "token");

        assert_eq!(partition.get_bool("authenticated"), Some(true));
        assert_eq!(partition.get_int("created_at"), Some(1_700_000_000));
        assert_eq!(partition.get_str("csrf"), Some("token"));
        // Wrong type reads as absent
        assert_eq!(partition.get_str("authenticated"), None);
        assert_eq!(partition.get_bool("missing"), None);
    }

    #[test]
    fn test_payload_json_keeps_value_types() {
        let mut partition = Partition::new(MAIN_COOKIE_NAME);
        partition.set_id("abc".to_string());
        partition.insert("authenticated", true);
        partition.insert("created_at", 42_i64);
        partition.insert("email", "user@example.com");

        let json = serde_json::to_string(&partition.to_payload()).unwrap();
        let payload: PartitionPayload = serde_json::from_str(&json).unwrap();
        let restored = Partition::from_payload(MAIN_COOKIE_NAME, payload);

        assert!(!restored.is_new());
        assert_eq!(restored.id(), "abc");
        assert_eq!(restored.get_bool("authenticated"), Some(true));
        assert_eq!(restored.get_int("created_at"), Some(42));
        assert_eq!(restored.get_str("email"), Some("user@example.com"));
    }

    #[test]
    fn test_expire_survives_apply_options() {
        let mut partition = Partition::new(ACCESS_TOKEN_COOKIE);
        partition.insert("token", "abc");
        partition.expire();
        assert!(partition.is_empty());

        partition.apply_options(&CookieOptions {
            secure: false,
            ..CookieOptions::default()
        });
        assert!(partition.options().is_expiring());
        assert!(!partition.options().secure);
    }

    #[test]
    fn test_build_cookie_attributes() {
        let partition = Partition::new(MAIN_COOKIE_NAME);
        let cookie = partition.build_cookie("value".to_string());

        assert_eq!(cookie.name(), MAIN_COOKIE_NAME);
        assert_eq!(cookie.value(), "value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(86_400)));
    }
}
