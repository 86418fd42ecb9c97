use std::fmt;

/// A URL found during collection, tagged with the source that reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUrl {
    pub url: String,
    pub source: String,
}

impl DiscoveredUrl {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for DiscoveredUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionProgress {
    pub current: usize,
    pub total: usize,
}

/// Aggregated output of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionResult {
    pub content: String,
    pub urls: Vec<DiscoveredUrl>,
}
