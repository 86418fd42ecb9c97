//! External evidence sources walked by a collection run.
mod vulndb;
mod web_search;

pub use vulndb::{VulnDbSource, DEFAULT_VULNDB_BASE};
pub use web_search::{WebSearchSource, DEFAULT_SEARCH_BASE, MAX_SEARCH_RESULTS};

use pocforge_core::{CveId, DiscoveredUrl};

use crate::collect::EventSink;
use crate::session::BrowserSession;
use crate::CollectionEvent;

/// What a source hands to a fetch: the run's session and its event sink.
pub struct SourceContext<'a> {
    pub session: &'a BrowserSession,
    pub sink: &'a dyn EventSink,
}

impl SourceContext<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled()
    }

    /// Reports a discovered URL to the run as soon as it is found.
    pub fn report(&self, url: impl Into<String>, source: &str) -> DiscoveredUrl {
        let url = DiscoveredUrl::new(url, source);
        self.sink.emit(CollectionEvent::UrlFound(url.clone()));
        url
    }
}

/// URLs and free text gathered by one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOutput {
    pub urls: Vec<DiscoveredUrl>,
    pub content: String,
}

impl SourceOutput {
    /// Reports `url` and appends it to this source's list.
    pub fn record(&mut self, ctx: &SourceContext<'_>, url: impl Into<String>, source: &str) {
        self.urls.push(ctx.report(url, source));
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.iter().any(|known| known.url == url)
    }

    pub fn note(&mut self, line: impl AsRef<str>) {
        self.content.push_str(line.as_ref());
        self.content.push('\n');
    }
}

/// A source gave up. `partial` holds whatever it gathered first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SourceFetchError {
    pub message: String,
    pub partial: SourceOutput,
}

impl SourceFetchError {
    pub fn new(message: impl Into<String>, partial: SourceOutput) -> Self {
        Self {
            message: message.into(),
            partial,
        }
    }
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Short label attached to discovered URLs and log lines.
    fn name(&self) -> &str;

    /// Section heading for this source's content.
    fn heading(&self) -> &str;

    async fn fetch(
        &self,
        cve: &CveId,
        ctx: &SourceContext<'_>,
    ) -> Result<SourceOutput, SourceFetchError>;
}
