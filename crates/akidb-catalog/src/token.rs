//! Opaque, versioned pagination tokens.
//!
//! Tokens are JSON documents tagged with a version, wrapped in URL-safe
//! base64. They carry the full resumption state; nothing is kept
//! server-side between calls.
//!
//! - v1 (offset): `{offset, fingerprint}`, produced by the simple strategy.
//! - v2 (cursor): per repository, the backing cursor of the current batch,
//!   the sort key last emitted from it and the ids already emitted at that
//!   key, plus a running global offset. Its size grows with the number of
//!   repositories, not with how far into a batch the sequence is.
//!
//! The codec never issues a token it would refuse to decode.
//!
//! A token is honored only when its fingerprint matches the current
//! request's filter and sort. Anything else (garbage input, oversized input,
//! a different filter) restarts pagination from the beginning; decoding
//! never fails loudly.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use akidb_core::{CollectionId, CollectionStatus, FilterSpec, RepositoryId, SortKey, SortSpec};

use crate::error::{CatalogError, CatalogResult};
use crate::metrics::TOKEN_RESETS;

/// Resume state for the offset (bounded) strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetToken {
    #[serde(rename = "o")]
    pub offset: usize,
    #[serde(rename = "fp")]
    pub fingerprint: String,
}

/// Position reached in one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCursor {
    /// Backing cursor the next batch is fetched from; `None` is the start.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(rename = "x", default)]
    pub exhausted: bool,
    /// Sort key of the last collection emitted from the batch at `cursor`.
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub after: Option<SortKey>,
    /// Consecutive calls on which this repository could not be read.
    #[serde(rename = "f", default, skip_serializing_if = "is_zero")]
    pub failures: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Resume state for the cursor-merge (unbounded) strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorToken {
    #[serde(rename = "rc")]
    pub repository_cursors: BTreeMap<RepositoryId, RepositoryCursor>,
    /// Ids emitted at exactly `after`; the only ones the key cannot rule out.
    #[serde(rename = "s", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seen_collection_ids: BTreeMap<RepositoryId, Vec<CollectionId>>,
    #[serde(rename = "g")]
    pub global_offset: u64,
    #[serde(rename = "fp")]
    pub fingerprint: String,
}

/// Any supported token version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "v")]
pub enum PageToken {
    #[serde(rename = "1")]
    Offset(OffsetToken),
    #[serde(rename = "2")]
    Cursor(CursorToken),
}

impl PageToken {
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Offset(t) => &t.fingerprint,
            Self::Cursor(t) => &t.fingerprint,
        }
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Self::Offset(_) => 1,
            Self::Cursor(_) => 2,
        }
    }
}

/// Stable hash of the parameters that define a result ordering.
///
/// Filter text is normalized the same way matching is, so `"Foo"` and
/// `"foo"` share a fingerprint.
#[must_use]
pub fn fingerprint(filter: &FilterSpec, sort: SortSpec, status: Option<CollectionStatus>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"filter:");
    hasher.update(filter.text().unwrap_or("").as_bytes());
    hasher.update([0x1f]);
    hasher.update(sort.field.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(sort.order.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(status.map_or("*", |s| s.as_str()).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A token applies only to the filter/sort it was issued for.
#[must_use]
pub fn validate(token: &PageToken, current_fingerprint: &str) -> bool {
    token.fingerprint() == current_fingerprint
}

/// Encoder/decoder for the opaque token wire format.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    max_token_bytes: usize,
}

impl TokenCodec {
    pub fn new(max_token_bytes: usize) -> Self {
        Self { max_token_bytes }
    }

    /// Serializes a token into its opaque string form.
    ///
    /// # Errors
    ///
    /// `CatalogError::Internal` when the encoded token would exceed
    /// `max_token_bytes`; handing it out would silently restart the sequence
    /// on the next call.
    pub fn encode(&self, token: &PageToken) -> CatalogResult<String> {
        let json = serde_json::to_vec(token)
            .map_err(|e| CatalogError::Internal(format!("failed to encode page token: {e}")))?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        if encoded.len() > self.max_token_bytes {
            return Err(CatalogError::Internal(format!(
                "page token of {} bytes exceeds max_token_bytes ({})",
                encoded.len(),
                self.max_token_bytes
            )));
        }
        Ok(encoded)
    }

    /// Parses a token; `None` means "start fresh".
    pub fn decode(&self, raw: &str) -> Option<PageToken> {
        if raw.len() > self.max_token_bytes {
            debug!(len = raw.len(), "page token exceeds size limit, starting fresh");
            TOKEN_RESETS.with_label_values(&["oversized"]).inc();
            return None;
        }

        let bytes = match URL_SAFE_NO_PAD.decode(raw.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "page token is not valid base64, starting fresh");
                TOKEN_RESETS.with_label_values(&["malformed"]).inc();
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(token) => Some(token),
            Err(e) => {
                debug!(error = %e, "page token payload is unreadable, starting fresh");
                TOKEN_RESETS.with_label_values(&["malformed"]).inc();
                None
            }
        }
    }

    /// Decodes an optional caller token and checks it against the request fingerprint.
    pub fn resume(&self, raw: Option<&str>, current_fingerprint: &str) -> Option<PageToken> {
        let token = self.decode(raw.filter(|r| !r.trim().is_empty())?)?;
        if validate(&token, current_fingerprint) {
            Some(token)
        } else {
            debug!(
                version = token.version(),
                "page token was issued for a different filter or sort, starting fresh"
            );
            TOKEN_RESETS.with_label_values(&["fingerprint_mismatch"]).inc();
            None
        }
    }
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(akidb_core::PaginationConfig::default().max_token_bytes)
    }
}
