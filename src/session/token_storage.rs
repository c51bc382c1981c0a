//! Token compression and chunked cookie storage
//!
//! Tokens are gzip-compressed and base64 encoded. A compressed token that fits in
//! [`MAX_COOKIE_SIZE`] is stored inline in the token cookie; larger ones are split
//! into ordered fragments, each living in its own `<base>_<index>` cookie.

use actix_web::HttpRequest;
use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::session::cookie::{
    chunk_cookie_name, CookieOptions, CookieWriter, Partition, MAX_COOKIE_SIZE,
};
use crate::session::store::{CookieStore, StoreError};

const TOKEN_KEY: &str = "token";
const COMPRESSED_KEY: &str = "compressed";
const TOKEN_CHUNK_KEY: &str = "token_chunk";

/// Gzip-compress `token` and encode it with standard base64
///
/// Falls back to the original token if compression fails.
#[must_use]
pub fn compress_token(token: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(token.as_bytes()).is_err() {
        return token.to_string();
    }
    match encoder.finish() {
        Ok(bytes) => general_purpose::STANDARD.encode(bytes),
        Err(_) => token.to_string(),
    }
}

/// Reverse of [`compress_token`]
///
/// Input that is not base64, not gzip, or not UTF-8 is returned unchanged.
#[must_use]
pub fn decompress_token(compressed: &str) -> String {
    let Ok(data) = general_purpose::STANDARD.decode(compressed) else {
        return compressed.to_string();
    };

    let mut decoded = String::new();
    match GzDecoder::new(data.as_slice()).read_to_string(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => compressed.to_string(),
    }
}

/// Split `s` into fragments of at most `chunk_size` bytes
///
/// Fragments never cut through a UTF-8 character.
#[must_use]
pub fn split_into_chunks(s: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        if rest.len() <= chunk_size {
            chunks.push(rest.to_string());
            break;
        }
        let mut end = chunk_size.max(1);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

/// How a token is laid out across cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredToken {
    Empty,
    Inline(String),
    Chunked(Vec<String>),
}

impl StoredToken {
    /// Compress `token` and pick the inline or chunked layout
    #[must_use]
    pub fn encode(token: &str) -> Self {
        let compressed = compress_token(token);
        if compressed.len() <= MAX_COOKIE_SIZE {
            Self::Inline(compressed)
        } else {
            Self::Chunked(split_into_chunks(&compressed, MAX_COOKIE_SIZE))
        }
    }

    /// Reassemble the original token
    #[must_use]
    pub fn decode(&self, compressed: bool) -> String {
        let raw = match self {
            Self::Empty => return String::new(),
            Self::Inline(value) => value.clone(),
            Self::Chunked(fragments) => fragments.concat(),
        };
        if compressed {
            decompress_token(&raw)
        } else {
            raw
        }
    }

    /// Number of chunk cookies this layout occupies
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Chunked(fragments) => fragments.len(),
            Self::Empty | Self::Inline(_) => 0,
        }
    }
}

/// Token cookie plus its chunk cookies for one token kind (access or refresh)
#[derive(Debug)]
pub(crate) struct TokenSlot {
    base_name: &'static str,
    partition: Partition,
    chunks: BTreeMap<usize, Partition>,
    // Chunks from a replaced token, written out as expired cookies on save
    stale_chunks: Vec<Partition>,
}

impl TokenSlot {
    pub(crate) fn new(base_name: &'static str) -> Self {
        Self {
            base_name,
            partition: Partition::new(base_name),
            chunks: BTreeMap::new(),
            stale_chunks: Vec::new(),
        }
    }

    /// Load the token cookie and probe `<base>_0, <base>_1, ...` until one is missing
    pub(crate) fn load(
        &mut self,
        store: &dyn CookieStore,
        req: &HttpRequest,
    ) -> Result<(), StoreError> {
        self.partition = store.get(req, self.base_name)?;
        self.chunks.clear();
        self.stale_chunks.clear();

        for index in 0.. {
            match store.get(req, &chunk_cookie_name(self.base_name, index)) {
                Ok(chunk) if !chunk.is_new() => {
                    self.chunks.insert(index, chunk);
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Reset to an empty slot without dropping allocated storage
    pub(crate) fn reset(&mut self) {
        self.partition = Partition::new(self.base_name);
        self.chunks.clear();
        self.stale_chunks.clear();
    }

    /// Current layout, derived from the cookies
    pub(crate) fn stored(&self) -> StoredToken {
        if let Some(inline) = self.partition.get_str(TOKEN_KEY).filter(|t| !t.is_empty()) {
            return StoredToken::Inline(inline.to_string());
        }

        let mut fragments = Vec::new();
        for index in 0.. {
            match self
                .chunks
                .get(&index)
                .and_then(|chunk| chunk.get_str(TOKEN_CHUNK_KEY))
            {
                Some(fragment) => fragments.push(fragment.to_string()),
                None => break,
            }
        }

        if fragments.is_empty() {
            StoredToken::Empty
        } else {
            StoredToken::Chunked(fragments)
        }
    }

    pub(crate) fn token(&self) -> String {
        let compressed = self.partition.get_bool(COMPRESSED_KEY).unwrap_or(false);
        self.stored().decode(compressed)
    }

    /// Replace the stored token, expiring any previous chunk set
    pub(crate) fn set_token(&mut self, token: &str) -> usize {
        self.expire_chunks();

        let stored = StoredToken::encode(token);
        let chunk_count = stored.chunk_count();
        self.partition.insert(COMPRESSED_KEY, true);

        match stored {
            StoredToken::Inline(value) => self.partition.insert(TOKEN_KEY, value),
            StoredToken::Chunked(fragments) => {
                self.partition.insert(TOKEN_KEY, "");
                for (index, fragment) in fragments.into_iter().enumerate() {
                    let mut chunk = Partition::new(&chunk_cookie_name(self.base_name, index));
                    chunk.insert(TOKEN_CHUNK_KEY, fragment);
                    self.chunks.insert(index, chunk);
                }
            }
            StoredToken::Empty => self.partition.insert(TOKEN_KEY, ""),
        }
        chunk_count
    }

    fn expire_chunks(&mut self) {
        for (_, mut chunk) in std::mem::take(&mut self.chunks) {
            chunk.expire();
            self.stale_chunks.push(chunk);
        }
    }

    /// Expire the token cookie and every chunk cookie
    pub(crate) fn clear(&mut self) {
        self.partition.expire();
        for chunk in self.chunks.values_mut() {
            chunk.expire();
        }
    }

    pub(crate) fn save_partition(
        &mut self,
        store: &dyn CookieStore,
        writer: &mut dyn CookieWriter,
        options: &CookieOptions,
    ) -> Result<(), StoreError> {
        self.partition.apply_options(options);
        store.save(&self.partition, writer)
    }

    /// Write live chunks in index order, then expirations for orphaned ones
    pub(crate) fn save_chunks(
        &mut self,
        store: &dyn CookieStore,
        writer: &mut dyn CookieWriter,
        options: &CookieOptions,
    ) -> Result<(), StoreError> {
        for chunk in self.chunks.values_mut() {
            chunk.apply_options(options);
            store.save(chunk, writer)?;
        }

        let live_names: Vec<&str> = self.chunks.values().map(Partition::name).collect();
        for stale in &mut self.stale_chunks {
            if live_names.contains(&stale.name()) {
                continue;
            }
            stale.apply_options(options);
            store.save(stale, writer)?;
        }
        Ok(())
    }

    pub(crate) fn chunk_len(&self) -> usize {
        self.chunks.len()
    }
}
