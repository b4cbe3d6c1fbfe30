//! API key credential store
//!
//! Keys are opaque `<PREFIX>_<UUID>` strings compared by exact match. They are
//! never logged: everything outside this module refers to a key through its
//! [`key_prefix`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Number of leading characters used for log correlation and rate limit
/// keying when a key has no `<PREFIX>_` part.
pub const API_KEY_PREFIX_LEN: usize = 12;

/// Characters of the random part kept after the `<PREFIX>_` part.
pub const KEY_RANDOM_PREFIX_LEN: usize = 8;

/// Default prefix for newly generated keys.
pub const DEFAULT_KEY_PREFIX: &str = "dsk";

/// A configured API key, optionally with lifecycle metadata.
#[derive(Clone, Deserialize, PartialEq)]
pub struct ApiKeyRecord {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            expires_at: None,
            revoked_at: None,
        }
    }

    pub fn prefix(&self) -> String {
        key_prefix(&self.key)
    }
}

impl fmt::Debug for ApiKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyRecord")
            .field("prefix", &self.prefix())
            .field("label", &self.label)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish()
    }
}

/// Result of looking a presented token up in the store.
#[derive(Debug, PartialEq)]
pub enum CredentialCheck<'a> {
    Valid(&'a ApiKeyRecord),
    Expired,
    Revoked,
    Unknown,
}

/// Read-only set of valid API keys, loaded once at startup.
#[derive(Default)]
pub struct CredentialStore {
    records: HashMap<String, ApiKeyRecord>,
}

impl CredentialStore {
    pub fn new(records: impl IntoIterator<Item = ApiKeyRecord>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| !r.key.trim().is_empty())
            .map(|r| (r.key.clone(), r))
            .collect();
        Self { records }
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(keys.into_iter().map(ApiKeyRecord::new))
    }

    pub fn check(&self, token: &str, now: DateTime<Utc>) -> CredentialCheck<'_> {
        let Some(record) = self.records.get(token) else {
            return CredentialCheck::Unknown;
        };
        if record.revoked_at.is_some_and(|at| at <= now) {
            return CredentialCheck::Revoked;
        }
        if record.expires_at.is_some_and(|at| at <= now) {
            return CredentialCheck::Expired;
        }
        CredentialCheck::Valid(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("keys", &self.records.len())
            .finish()
    }
}

/// Leading slice of a key, safe to log.
///
/// For `<PREFIX>_<random>` keys this is the whole `<PREFIX>_` part plus the
/// first [`KEY_RANDOM_PREFIX_LEN`] random characters, so keys sharing a long
/// prefix still get distinct slices. Other keys keep their first
/// [`API_KEY_PREFIX_LEN`] characters. The slice never covers more than half
/// of the random part, or of the key.
pub fn key_prefix(key: &str) -> String {
    if let Some(idx) = key.rfind('_') {
        let random = &key[idx + 1..];
        if random.chars().count() >= 2 * KEY_RANDOM_PREFIX_LEN {
            let head = &key[..=idx];
            let tail: String = random.chars().take(KEY_RANDOM_PREFIX_LEN).collect();
            return format!("{}{}", head, tail);
        }
    }
    let keep = API_KEY_PREFIX_LEN.min(key.chars().count() / 2);
    key.chars().take(keep).collect()
}

/// Prefixes shared by more than one key. Such keys share a rate limit
/// bucket and a log identity.
pub fn shared_prefixes<'a>(records: impl IntoIterator<Item = &'a ApiKeyRecord>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.prefix()).or_default() += 1;
    }
    let mut shared: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(prefix, _)| prefix)
        .collect();
    shared.sort();
    shared
}

/// Generates a fresh `<prefix>_<uuid-v4>` key.
pub fn generate_key(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}
