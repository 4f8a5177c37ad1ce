//! Request contexts.
//!
//! The same variable may be used under different request contexts (auth
//! scope, headers). Each context gets its own cell; leaf cells sharing a uid
//! stay synchronized.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Request metadata attached to every backend call made for a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RequestExtras {
    headers: BTreeMap<String, String>,
}

impl RequestExtras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Canonical key; headers are ordered so equal contexts share a key.
    ///
    /// Names and values are JSON-quoted, so separators inside a header value
    /// (cookies carry both `;` and `=`) cannot make two contexts collide.
    pub fn key(&self) -> ExtrasKey {
        if self.headers.is_empty() {
            return ExtrasKey::default();
        }
        let encoded = serde_json::to_string(&self.headers).unwrap_or_else(|error| {
            log::warn!("could not encode request extras: {error}");
            format!("{:?}", self.headers)
        });
        ExtrasKey(encoded.into())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtrasKey(Arc<str>);

impl fmt::Display for ExtrasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Identity of one value cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellKey {
    /// Instance uid: the loop instance uid for loop-scoped copies.
    pub uid: Arc<str>,
    pub extras: ExtrasKey,
}

impl CellKey {
    pub fn new(uid: &str, extras: &RequestExtras) -> Self {
        Self {
            uid: uid.into(),
            extras: extras.key(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uid, self.extras)
    }
}
