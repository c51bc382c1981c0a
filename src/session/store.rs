//! Cookie storage backends
//!
//! [`CookieStore`] hides how a partition is turned into a cookie value and back.
//! The production backend encrypts each partition with AES-256-GCM; tests can
//! substitute an in-memory store without touching session logic.

use actix_web::HttpRequest;
use thiserror::Error;

use crate::session::cookie::{CookieWriter, Partition, PartitionPayload};
use crate::utils::crypto::{decrypt_data, derive_encryption_key, encrypt_data, ENCRYPTION_KEY_SIZE};

/// Browsers reject cookies larger than this
const BROWSER_COOKIE_LIMIT: usize = 4096;

/// Errors raised by a cookie backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to decode cookie '{name}': {reason}")]
    Decode { name: String, reason: String },
    #[error("failed to encode cookie '{name}': {reason}")]
    Encode { name: String, reason: String },
}

/// Capability interface over the session cookie backend
pub trait CookieStore: Send + Sync {
    /// Load partition `name` from the request
    ///
    /// Returns a new, empty partition when the request carries no such cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie is present but cannot be decoded.
    fn get(&self, req: &HttpRequest, name: &str) -> Result<Partition, StoreError>;

    /// Write `partition` to the response
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be encoded.
    fn save(&self, partition: &Partition, writer: &mut dyn CookieWriter) -> Result<(), StoreError>;
}

/// Stateless backend storing AES-256-GCM encrypted partitions in the cookies themselves
#[derive(Clone)]
pub struct EncryptedCookieStore {
    encryption_key: [u8; ENCRYPTION_KEY_SIZE],
}

impl EncryptedCookieStore {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encryption_key: derive_encryption_key(secret),
        }
    }

    /// Encrypted cookie value for a partition
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn encode(&self, partition: &Partition) -> Result<String, StoreError> {
        encrypt_data(&partition.to_payload(), &self.encryption_key).map_err(|e| {
            StoreError::Encode {
                name: partition.name().to_string(),
                reason: e.to_string(),
            }
        })
    }
}

impl CookieStore for EncryptedCookieStore {
    fn get(&self, req: &HttpRequest, name: &str) -> Result<Partition, StoreError> {
        let Some(cookie) = req.cookie(name) else {
            return Ok(Partition::new(name));
        };
        if cookie.value().is_empty() {
            return Ok(Partition::new(name));
        }

        let payload = decrypt_data::<PartitionPayload>(cookie.value(), &self.encryption_key)
            .map_err(|e| StoreError::Decode {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Partition::from_payload(name, payload))
    }

    fn save(&self, partition: &Partition, writer: &mut dyn CookieWriter) -> Result<(), StoreError> {
        if partition.options().is_expiring() {
            writer.add_cookie(partition.build_cookie(String::new()));
            return Ok(());
        }

        let value = self.encode(partition)?;
        if value.len() > BROWSER_COOKIE_LIMIT {
            log::warn!(
                "Cookie '{}' is {} bytes and may be rejected by browsers",
                partition.name(),
                value.len()
            );
        }
        writer.add_cookie(partition.build_cookie(value));
        Ok(())
    }
}
