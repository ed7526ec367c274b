//! Parameter sets and RFC 3986 percent-encoding.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::{OAuthError, OAuthResult};

/// Everything except the RFC 3986 unreserved set: ALPHA / DIGIT / "-" / "." / "_" / "~"
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string according to RFC 3986.
///
/// Escapes use uppercase hex digits, as OAuth 1.0a requires.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Reverse [`percent_encode`].
///
/// # Errors
/// Returns [`OAuthError::EncodingFailure`] if the decoded bytes are not UTF-8.
pub fn percent_decode(s: &str) -> OAuthResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| OAuthError::EncodingFailure(format!("percent-decoded value is not UTF-8: {e}")))
}

/// A map of unique parameter names to values.
///
/// Input order carries no meaning; signing imposes its own order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    /// Create an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a parameter, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Insert a parameter given as raw bytes.
    ///
    /// # Errors
    /// Returns [`OAuthError::EncodingFailure`] if either side is not valid UTF-8.
    pub fn try_insert_bytes(&mut self, name: &[u8], value: &[u8]) -> OAuthResult<Option<String>> {
        let name = std::str::from_utf8(name)
            .map_err(|e| OAuthError::EncodingFailure(format!("parameter name: {e}")))?;
        let value = std::str::from_utf8(value)
            .map_err(|e| OAuthError::EncodingFailure(format!("value of {name}: {e}")))?;
        Ok(self.insert(name, value))
    }

    /// Look up a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether the set defines `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode every pair as `pct(name)=pct(value)` and sort by byte value.
    #[must_use]
    pub fn encoded_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for ParameterSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Serialize a parameter set as an `application/x-www-form-urlencoded` body.
///
/// Uses the same RFC 3986 encoding as the signature so the transmitted body
/// and the signed parameters cannot drift apart.
#[must_use]
pub fn form_urlencode(params: &ParameterSet) -> String {
    params.encoded_pairs().join("&")
}
