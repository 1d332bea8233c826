//! Splitting URLs into trie keys.
//!
//! A URL maps to an ordered list of segment keys: the hostname first, then
//! each non-empty path segment. `https://example.com//docs/rust/` becomes
//! `["example.com", "docs", "rust"]`. Query strings and fragments are ignored.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Reasons a URL cannot be turned into path keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathKeyError {
    /// The input was the empty string.
    #[error("empty url")]
    Empty,

    /// The input is not a well-formed absolute URL.
    #[error("unparseable url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL parsed but has neither a host nor path segments.
    #[error("no path keys in url {0:?}")]
    NoKeys(String),
}

/// Non-empty sequence of segment keys for one URL.
///
/// The first key is the hostname when the URL has one; for host-less URLs
/// (`file:///...`) the first path segment takes its place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKeys {
    root: String,
    rest: Vec<String>,
}

impl PathKeys {
    /// Parses `url` into path keys.
    pub fn parse(url: &str) -> Result<Self, PathKeyError> {
        if url.is_empty() {
            return Err(PathKeyError::Empty);
        }

        let parsed = Url::parse(url).map_err(|source| PathKeyError::Parse {
            url: url.to_string(),
            source,
        })?;

        let host = parsed.host_str().filter(|h| !h.is_empty());
        let mut keys = host.into_iter().map(ToString::to_string).chain(
            parsed
                .path_segments()
                .into_iter()
                .flatten()
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string),
        );

        let root = keys
            .next()
            .ok_or_else(|| PathKeyError::NoKeys(url.to_string()))?;
        Ok(Self {
            root,
            rest: keys.collect(),
        })
    }

    /// Builds keys from already-split segments. Returns `None` if `keys` is empty.
    pub fn from_segments<I, K>(keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys = keys.into_iter().map(Into::into);
        let root = keys.next()?;
        Some(Self {
            root,
            rest: keys.collect(),
        })
    }

    /// The top-level key (usually the hostname).
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Keys below the root, in order.
    pub fn rest(&self) -> &[String] {
        &self.rest
    }

    /// Iterates over all keys, root first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.as_str()).chain(self.rest.iter().map(String::as_str))
    }

    /// Number of keys, always at least one.
    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for PathKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for key in &self.rest {
            write!(f, "/{key}")?;
        }
        Ok(())
    }
}

/// Returns the segment keys of `url`, or `None` when the URL is malformed.
pub fn extract_parts(url: &str) -> Option<Vec<String>> {
    PathKeys::parse(url)
        .ok()
        .map(|keys| keys.iter().map(ToString::to_string).collect())
}
