//! Rendering parameter sets and the ids they collapse to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Parameter Set
// =============================================================================

/// A non-default rendering parameterization (e.g. a custom style).
///
/// Entries are kept sorted by key so equal sets always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as a `k=v&k=v` query string, keys in sorted order.
    pub fn to_kvp(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    /// Decode a `k=v&k=v` query string. A leading `?` is ignored.
    pub fn from_kvp(kvp: &str) -> Self {
        let kvp = kvp.strip_prefix('?').unwrap_or(kvp);
        url::form_urlencoded::parse(kvp.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for ParameterSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

// =============================================================================
// Parameter Hashing
// =============================================================================

/// Collapses a parameter set into a fixed-length opaque id.
///
/// Ids are never inverted; the store persists the id-to-parameters mapping
/// on the side instead.
pub trait ParameterHasher: Send + Sync {
    /// Compute the id for a parameter set.
    fn id_for(&self, parameters: &ParameterSet) -> String;

    /// Length of every id this hasher produces.
    fn id_len(&self) -> usize;
}

/// Hex-encoded SHA-256 of the parameter query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ParameterHasher;

impl ParameterHasher for Sha256ParameterHasher {
    fn id_for(&self, parameters: &ParameterSet) -> String {
        let digest = Sha256::digest(parameters.to_kvp().as_bytes());
        hex::encode(digest)
    }

    fn id_len(&self) -> usize {
        64
    }
}
