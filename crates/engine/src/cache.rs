//! Cross-request option cache carried in a caller-managed token.
//!
//! The cache has three parts keyed by field id: the last submitted value, the
//! serialized `(options, info)` pair the resolver produced for it, and opaque
//! provider data. The token is the JSON form of [`CacheEntry`], zlib
//! compressed and encoded with URL-safe base64. Decoding is best effort: a
//! missing, truncated, or foreign token yields an empty cache.

use std::io::{Read, Write};

use base64::{Engine, engine::general_purpose::URL_SAFE};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use toolform_types::WidgetSpec;
use tracing::{debug, warn};

/// Upper bound on the decompressed size of a cache token.
const MAX_DECODED_TOKEN_BYTES: u64 = 16 * 1024 * 1024;

/// Error raised while encoding a cache token.
#[derive(Debug, Error)]
pub enum CacheEncodeError {
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache compression error: {0}")]
    Compression(#[from] std::io::Error),
}

/// Decoded three-part cache plus the evaluation order it was built under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Field ids in the evaluation order of the scan that wrote the entries.
    #[serde(default)]
    pub order: Vec<String>,
    /// Last submitted raw value per field.
    #[serde(default)]
    pub last_values: IndexMap<String, Value>,
    /// Serialized [`ResolvedOptions`] per field.
    #[serde(default)]
    pub resolved: IndexMap<String, String>,
    /// Provider-owned data per field, serialized by the provider's DTO type.
    #[serde(default)]
    pub extra: IndexMap<String, String>,
}

impl CacheEntry {
    pub fn is_empty(&self) -> bool {
        self.last_values.is_empty() && self.resolved.is_empty() && self.extra.is_empty()
    }
}

/// Options produced by a resolver together with the optional info text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOptions {
    pub options: WidgetSpec,
    #[serde(default)]
    pub info: Option<String>,
}

/// Result of looking up a field's cached options.
#[derive(Debug)]
pub enum CachedOptions {
    /// No entry for the field, or no recorded last value.
    Missing,
    /// Entry decoded successfully.
    Hit {
        resolved: ResolvedOptions,
        last_value: Value,
    },
    /// Entry present but undecodable.
    Corrupt(serde_json::Error),
}

/// Mutable view over a request's [`CacheEntry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionCache {
    entry: CacheEntry,
}

impl OptionCache {
    pub fn new(entry: CacheEntry) -> Self {
        Self { entry }
    }

    /// Decodes a token. Any failure yields the empty cache.
    pub fn decode(token: Option<&str>) -> Self {
        let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
            return Self::default();
        };
        match decode_token(token) {
            Ok(entry) => {
                debug!(
                    fields = entry.resolved.len(),
                    extra = entry.extra.len(),
                    "decoded option cache token"
                );
                Self { entry }
            }
            Err(reason) => {
                warn!(reason = %reason, "discarding undecodable option cache token");
                Self::default()
            }
        }
    }

    /// Encodes the cache into a token accepted by [`decode`](Self::decode).
    pub fn encode(&self, compression_level: u32) -> Result<String, CacheEncodeError> {
        let json = serde_json::to_vec(&self.entry)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(compression_level.min(9)));
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        Ok(URL_SAFE.encode(compressed))
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    pub fn into_entry(self) -> CacheEntry {
        self.entry
    }

    pub fn order(&self) -> &[String] {
        &self.entry.order
    }

    /// Ties the cache to an evaluation order. Entries written under a
    /// different order are discarded; returns whether that happened.
    pub fn bind_order(&mut self, order: Vec<String>) -> bool {
        let stale = !self.entry.is_empty() && self.entry.order != order;
        if stale {
            self.entry = CacheEntry::default();
        }
        self.entry.order = order;
        stale
    }

    pub fn last_value(&self, field_id: &str) -> Option<&Value> {
        self.entry.last_values.get(field_id)
    }

    /// Looks up the cached options of a field.
    pub fn cached_options(&self, field_id: &str) -> CachedOptions {
        let (Some(blob), Some(last_value)) = (self.entry.resolved.get(field_id), self.entry.last_values.get(field_id)) else {
            return CachedOptions::Missing;
        };
        match serde_json::from_str::<ResolvedOptions>(blob) {
            Ok(resolved) => CachedOptions::Hit {
                resolved,
                last_value: last_value.clone(),
            },
            Err(error) => CachedOptions::Corrupt(error),
        }
    }

    /// Records the submitted value and the options resolved for it.
    pub fn store(&mut self, field_id: &str, value: &Value, resolved: &ResolvedOptions) {
        self.entry.last_values.insert(field_id.to_string(), value.clone());
        match serde_json::to_string(resolved) {
            Ok(blob) => {
                self.entry.resolved.insert(field_id.to_string(), blob);
            }
            Err(error) => {
                warn!(field = %field_id, error = %error, "failed to serialize resolved options; entry dropped");
                self.entry.resolved.shift_remove(field_id);
            }
        }
    }

    /// Reads provider data for a field. An undecodable entry reads as absent.
    pub fn extra<T: DeserializeOwned>(&self, field_id: &str) -> Option<T> {
        let blob = self.entry.extra.get(field_id)?;
        match serde_json::from_str(blob) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(field = %field_id, error = %error, "ignoring undecodable provider cache entry");
                None
            }
        }
    }

    /// Stores provider data for a field.
    pub fn put_extra<T: Serialize>(&mut self, field_id: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(blob) => {
                self.entry.extra.insert(field_id.to_string(), blob);
            }
            Err(error) => warn!(field = %field_id, error = %error, "failed to serialize provider cache entry"),
        }
    }
}

fn decode_token(token: &str) -> Result<CacheEntry, String> {
    let compressed = URL_SAFE.decode(token).map_err(|error| format!("base64: {}", error))?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_TOKEN_BYTES)
        .read_to_end(&mut json)
        .map_err(|error| format!("zlib: {}", error))?;
    serde_json::from_slice(&json).map_err(|error| format!("json: {}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use serde_json::json;

    fn sample_cache() -> OptionCache {
        let mut cache = OptionCache::default();
        cache.store(
            "first",
            &json!("a"),
            &ResolvedOptions {
                options: WidgetSpec::Select {
                    options: vec!["a".into(), "b".into()],
                },
                info: Some("pick one".into()),
            },
        );
        cache.put_extra("genomes", &indexmap! {"hg19".to_string() => true});
        cache
    }

    #[test]
    fn token_round_trips() {
        let cache = sample_cache();
        let token = cache.encode(6).unwrap();
        assert!(!token.contains('+') && !token.contains('/'));
        assert_eq!(OptionCache::decode(Some(&token)), cache);
    }

    #[test]
    fn empty_cache_round_trips() {
        let token = OptionCache::default().encode(0).unwrap();
        assert!(OptionCache::decode(Some(&token)).entry().is_empty());
    }

    #[test]
    fn garbage_tokens_decode_to_empty_cache() {
        for token in [None, Some(""), Some("   "), Some("not base64 at all!"), Some("eJzLSM3JyQcABiwCFQ=="), Some("AAAA")] {
            assert!(OptionCache::decode(token).entry().is_empty(), "token {:?}", token);
        }
        let token = sample_cache().encode(6).unwrap();
        let truncated = &token[..token.len() / 2];
        assert!(OptionCache::decode(Some(truncated)).entry().is_empty());
    }

    #[test]
    fn cached_options_distinguishes_missing_hit_and_corrupt() {
        let mut cache = sample_cache();
        assert!(matches!(cache.cached_options("second"), CachedOptions::Missing));
        match cache.cached_options("first") {
            CachedOptions::Hit { resolved, last_value } => {
                assert_eq!(last_value, json!("a"));
                assert_eq!(resolved.info.as_deref(), Some("pick one"));
            }
            other => panic!("expected hit, got {:?}", other),
        }

        let mut entry = cache.entry().clone();
        entry.resolved.insert("first".into(), "{broken".into());
        cache = OptionCache::new(entry);
        assert!(matches!(cache.cached_options("first"), CachedOptions::Corrupt(_)));
    }

    #[test]
    fn reordered_fields_discard_the_cache() {
        let mut cache = sample_cache();
        assert!(!cache.bind_order(vec!["first".into(), "genomes".into()]));
        let token = cache.encode(6).unwrap();

        let mut same = OptionCache::decode(Some(&token));
        assert!(!same.bind_order(vec!["first".into(), "genomes".into()]));
        assert!(matches!(same.cached_options("first"), CachedOptions::Hit { .. }));

        let mut reordered = OptionCache::decode(Some(&token));
        assert!(reordered.bind_order(vec!["genomes".into(), "first".into()]));
        assert!(reordered.entry().is_empty());
        assert_eq!(reordered.order(), &["genomes".to_string(), "first".to_string()]);
        assert!(matches!(reordered.cached_options("first"), CachedOptions::Missing));
    }

    #[test]
    fn corrupt_extra_entry_reads_as_absent() {
        let mut entry = sample_cache().into_entry();
        entry.extra.insert("tracks".into(), "][".into());
        let cache = OptionCache::new(entry);
        assert_eq!(cache.extra::<Vec<String>>("tracks"), None);
        assert_eq!(cache.extra::<IndexMap<String, bool>>("genomes").map(|map| map.len()), Some(1));
    }
}
