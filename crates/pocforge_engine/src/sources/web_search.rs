use url::Url;

use forge_logging::forge_debug;
use pocforge_core::CveId;

use super::{SourceContext, SourceFetchError, SourceFetcher, SourceOutput};
use crate::page::{PageElement, PageQuery, Query};
use crate::session::{LoadedPage, NavigateError};

pub const DEFAULT_SEARCH_BASE: &str = "https://www.bing.com";
pub const MAX_SEARCH_RESULTS: usize = 5;

const LABEL: &str = "web-search";

/// General web search for public exploit write-ups.
#[derive(Debug, Clone)]
pub struct WebSearchSource {
    base: String,
}

impl Default for WebSearchSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_BASE)
    }
}

impl WebSearchSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, cve: &CveId) -> Result<String, String> {
        let mut url = Url::parse(&format!("{}/search", self.base)).map_err(|err| err.to_string())?;
        url.query_pairs_mut()
            .append_pair("q", &format!("{cve} POC exploit"));
        Ok(url.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchResult {
    title: String,
    url: String,
}

fn search_results(page: &LoadedPage) -> Vec<SearchResult> {
    let html = page.parse();
    let entries = html
        .first_match(&[Query::css("li.b_algo"), Query::css("div.b_title")])
        .unwrap_or_default();
    entries
        .iter()
        .take(MAX_SEARCH_RESULTS)
        .filter_map(read_entry)
        .collect()
}

/// Heading anchor first, then the first anchor anywhere in the entry.
fn read_entry(entry: &PageElement<'_>) -> Option<SearchResult> {
    let anchor = entry.find_first(&[Query::css("h2 a"), Query::css("a")])?;
    let url = anchor.link()?;
    let title = entry
        .find_first(&[Query::css("h2")])
        .map(|h2| h2.text())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| anchor.text());
    Some(SearchResult { title, url })
}

fn is_github(url: &str) -> bool {
    url.to_ascii_lowercase().contains("github.com")
}

#[async_trait::async_trait]
impl SourceFetcher for WebSearchSource {
    fn name(&self) -> &str {
        LABEL
    }

    fn heading(&self) -> &str {
        "Web search results"
    }

    async fn fetch(
        &self,
        cve: &CveId,
        ctx: &SourceContext<'_>,
    ) -> Result<SourceOutput, SourceFetchError> {
        let mut out = SourceOutput::default();
        if ctx.is_cancelled() {
            return Ok(out);
        }
        let search_url = self
            .search_url(cve)
            .map_err(|err| SourceFetchError::new(format!("bad base url: {err}"), SourceOutput::default()))?;

        let page = match ctx.session.navigate(&search_url).await {
            Ok(page) => page,
            Err(NavigateError::Cancelled) => return Ok(out),
            Err(err) => return Err(SourceFetchError::new(err.to_string(), out)),
        };

        let results = search_results(&page);
        forge_debug!("web search returned {} usable results", results.len());
        if results.is_empty() {
            out.note("No related search results found");
            return Ok(out);
        }
        out.note(format!("Found {} search results:\n", results.len()));

        let mut github = Vec::new();
        let mut others = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }
            let url = ctx.report(result.url.as_str(), LABEL);
            out.note(format!("{}. {}\n   Link: {}\n", i + 1, result.title, result.url));
            if is_github(&result.url) {
                github.push(url);
            } else {
                others.push(url);
            }
        }
        out.urls.extend(github);
        out.urls.extend(others);
        Ok(out)
    }
}
