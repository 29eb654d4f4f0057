//! Content-addressed cache keys

use crate::event::Field;
use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Hex SHA-256 over everything that can change an extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

/// Inputs to a [`CacheKey`].
#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
    pub normalized_text: &'a str,
    /// Set when a secondary fragment was supplied but not merged.
    pub secondary_note: Option<&'a str>,
    pub reference_time: DateTime<FixedOffset>,
    pub bucket_secs: i64,
    pub timezone: &'a str,
    pub locale: &'a str,
    pub fields: &'a [Field],
}

impl CacheKey {
    pub fn new(parts: KeyParts<'_>) -> Self {
        let bucket_secs = parts.bucket_secs.max(1);
        let bucket = parts.reference_time.timestamp().div_euclid(bucket_secs);
        let offset = parts.reference_time.offset().local_minus_utc();
        let fields: BTreeSet<Field> = parts.fields.iter().copied().collect();
        let fields = fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let bucket = bucket.to_string();
        let offset = offset.to_string();
        let locale = parts.locale.to_ascii_lowercase();

        let mut hasher = Sha256::new();
        for part in [
            parts.normalized_text,
            parts.secondary_note.unwrap_or(""),
            bucket.as_str(),
            offset.as_str(),
            parts.timezone,
            locale.as_str(),
            fields.as_str(),
        ] {
            // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }

        let digest = hasher.finalize();
        CacheKey(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
