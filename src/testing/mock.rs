//! Mock objects and fake implementations for testing

use actix_web::HttpRequest;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::session::cookie::{CookieWriter, Partition, PartitionPayload};
use crate::session::store::{CookieStore, StoreError};
use crate::utils::crypto::generate_secure_random_hex;

/// Cookie backend that keeps partition payloads in memory
///
/// The cookie value is an opaque handle into the map, so tests can inspect what
/// was stored and in which order without decrypting anything.
#[derive(Default)]
pub struct MemoryCookieStore {
    entries: Mutex<HashMap<String, PartitionPayload>>,
    saved: Mutex<Vec<String>>,
}

impl MemoryCookieStore {
    /// Partition names in the order they were saved
    #[must_use]
    pub fn saved_names(&self) -> Vec<String> {
        self.saved.lock().clone()
    }

    /// Number of payloads currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, req: &HttpRequest, name: &str) -> Result<Partition, StoreError> {
        let Some(cookie) = req.cookie(name) else {
            return Ok(Partition::new(name));
        };
        if cookie.value().is_empty() {
            return Ok(Partition::new(name));
        }

        self.entries
            .lock()
            .get(cookie.value())
            .cloned()
            .map(|payload| Partition::from_payload(name, payload))
            .ok_or_else(|| StoreError::Decode {
                name: name.to_string(),
                reason: "unknown session handle".to_string(),
            })
    }

    fn save(&self, partition: &Partition, writer: &mut dyn CookieWriter) -> Result<(), StoreError> {
        self.saved.lock().push(partition.name().to_string());

        if partition.options().is_expiring() {
            writer.add_cookie(partition.build_cookie(String::new()));
            return Ok(());
        }

        let handle = generate_secure_random_hex(16);
        self.entries
            .lock()
            .insert(handle.clone(), partition.to_payload());
        writer.add_cookie(partition.build_cookie(handle));
        Ok(())
    }
}
