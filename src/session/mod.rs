//! Session Management Module
//!
//! A session lives entirely in encrypted cookies: a main partition for login state,
//! and one partition per token kind whose payload spills into numbered chunk cookies
//! when the compressed token is too large for one cookie.
//!
//! # Modules
//!
//! - [`manager`] - Loads sessions from requests and pools their state
//! - [`data`] - Per-request session accessors, save and clear
//! - [`cookie`] - Partitions, cookie names and attributes
//! - [`store`] - Pluggable cookie backend (AES-256-GCM by default)
//! - [`token_storage`] - Token compression and chunk layout

pub mod cookie;
pub mod data;
pub mod manager;
pub mod store;
pub mod token_storage;

pub use cookie::{
    chunk_cookie_name, CookieOptions, CookieWriter, Partition, PartitionPayload, SessionValue,
    ABSOLUTE_SESSION_TIMEOUT_SECS, ACCESS_TOKEN_COOKIE, MAIN_COOKIE_NAME, MAX_COOKIE_SIZE,
    REFRESH_TOKEN_COOKIE,
};
pub use data::{is_secure_request, SessionData};
pub use manager::{SessionError, SessionManager};
pub use store::{CookieStore, EncryptedCookieStore, StoreError};
pub use token_storage::{compress_token, decompress_token, split_into_chunks, StoredToken};
