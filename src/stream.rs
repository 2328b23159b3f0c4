use std::fmt;

use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

/// Name of the stream being watched. Fixed for the lifetime of a viewer session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Single-stream deployments serve their only stream under an empty name.
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// `base` extended by `prefix` and then the stream name, each as one
    /// percent-encoded path segment. The default stream ends in a slash.
    pub fn url_under(&self, base: &Url, prefix: &[&str]) -> Result<Url, ParseError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(prefix)
            .push(&self.0);
        Ok(url)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-defined quality label, e.g. `source`, `720p` or `360p`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityTier(String);

impl QualityTier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self("source".to_string())
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualityTier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&str> for StreamId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
