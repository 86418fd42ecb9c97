use url::Url;

use forge_logging::{forge_debug, forge_info, forge_warn};
use pocforge_core::CveId;

use super::{SourceContext, SourceFetchError, SourceFetcher, SourceOutput};
use crate::page::{PageQuery, Query};
use crate::session::{LoadedPage, NavigateError};

pub const DEFAULT_VULNDB_BASE: &str = "https://avd.aliyun.com";

const SEARCH_LABEL: &str = "vulndb-search";
const DETAIL_LABEL: &str = "vulndb";
const REFERENCE_LABEL: &str = "vulndb-reference";

/// Vulnerability database: search page, then one detail page.
#[derive(Debug, Clone)]
pub struct VulnDbSource {
    base: String,
}

impl Default for VulnDbSource {
    fn default() -> Self {
        Self::new(DEFAULT_VULNDB_BASE)
    }
}

impl VulnDbSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, cve: &CveId) -> Result<String, String> {
        let mut url = Url::parse(&format!("{}/search", self.base)).map_err(|err| err.to_string())?;
        url.query_pairs_mut().append_pair("q", cve.as_str());
        Ok(url.into())
    }
}

/// Result containers, most specific first.
fn result_cascade(cve: &CveId) -> Vec<Query> {
    vec![
        Query::css("div[class*='vuln-list-item']"),
        Query::css("div[class*='table-responsive'] tr"),
        Query::css("table tr").containing(cve.as_str()),
        Query::css("a").owning(cve.as_str()),
        Query::css("div").owning(cve.as_str()),
    ]
}

fn description_cascade() -> [Query; 3] {
    [
        Query::css("div[class*='content-item']"),
        Query::css("div[class*='detail-content']"),
        Query::css("div[class*='description']"),
    ]
}

fn reference_cascade() -> [Query; 3] {
    [
        Query::css("div[class*='reference-list'] a"),
        Query::css("div[class*='references'] a"),
        Query::css("a[href*='http']"),
    ]
}

/// One element of the winning result selector.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchHit {
    text: String,
    /// Links whose text names the CVE, resolved to absolute URLs.
    links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Detail {
    title: Option<String>,
    descriptions: Vec<String>,
    references: Vec<String>,
}

fn search_hits(page: &LoadedPage, cve: &CveId) -> Vec<SearchHit> {
    let html = page.parse();
    let Some(elements) = html.first_match(&result_cascade(cve)) else {
        return Vec::new();
    };
    let needle = cve.as_str().to_lowercase();
    elements
        .iter()
        .map(|element| {
            // An anchor hit is its own link.
            let anchors = if element.name() == "a" {
                vec![*element]
            } else {
                element.find_all(&Query::css("a"))
            };
            SearchHit {
                text: element.text(),
                links: anchors
                    .iter()
                    .filter(|a| a.text().to_lowercase().contains(&needle))
                    .filter_map(|a| a.link())
                    .collect(),
            }
        })
        .collect()
}

fn read_detail(page: &LoadedPage) -> Detail {
    let html = page.parse();
    let title = html
        .find_first(&[Query::css("h1")])
        .map(|h1| h1.text())
        .filter(|t| !t.is_empty());
    let descriptions = html
        .first_match(&description_cascade())
        .unwrap_or_default()
        .iter()
        .map(|element| element.text())
        .filter(|t| !t.is_empty())
        .collect();
    let references = html
        .first_match(&reference_cascade())
        .unwrap_or_default()
        .iter()
        .filter_map(|a| a.link())
        .collect();
    Detail {
        title,
        descriptions,
        references,
    }
}

#[async_trait::async_trait]
impl SourceFetcher for VulnDbSource {
    fn name(&self) -> &str {
        "vulndb"
    }

    fn heading(&self) -> &str {
        "Vulnerability database"
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
        out.record(ctx, search_url.as_str(), SEARCH_LABEL);

        let page = match ctx.session.navigate(&search_url).await {
            Ok(page) => page,
            Err(NavigateError::Cancelled) => return Ok(out),
            Err(err) => return Err(SourceFetchError::new(err.to_string(), out)),
        };
        out.note(format!("Search URL: {search_url}\n"));

        let hits = search_hits(&page, cve);
        if !hits.is_empty() {
            out.note(format!("Found {} matching results", hits.len()));
        }

        let mut resolved = false;
        'hits: for hit in hits {
            if ctx.is_cancelled() {
                return Ok(out);
            }
            out.note(format!("Result: {}", hit.text));

            for link in hit.links {
                if out.contains_url(&link) {
                    continue;
                }
                out.record(ctx, link.as_str(), DETAIL_LABEL);
                out.note(format!("Found link: {link}"));

                let detail = match ctx.session.navigate(&link).await {
                    Ok(detail) => detail,
                    Err(NavigateError::Cancelled) => return Ok(out),
                    Err(err) => {
                        forge_warn!("vulndb detail page failed: {err}");
                        out.note(format!("Failed to read detail page: {err}"));
                        continue;
                    }
                };
                let detail = read_detail(&detail);
                forge_debug!(
                    "vulndb detail: {} descriptions, {} references",
                    detail.descriptions.len(),
                    detail.references.len()
                );

                if let Some(title) = detail.title {
                    out.note(format!("Title: {title}\n"));
                }
                for description in detail.descriptions {
                    if ctx.is_cancelled() {
                        return Ok(out);
                    }
                    out.note(format!("{description}\n"));
                }
                if !detail.references.is_empty() {
                    out.note("References:");
                    for reference in detail.references {
                        if ctx.is_cancelled() {
                            return Ok(out);
                        }
                        out.note(format!("- {reference}"));
                        if !out.contains_url(&reference) {
                            out.record(ctx, reference.as_str(), REFERENCE_LABEL);
                        }
                    }
                }
                resolved = true;
                break 'hits;
            }
        }

        if !resolved {
            forge_info!("no vulndb entry linked for {cve}");
            out.note(format!("No direct link for {cve} in the vulnerability database"));
            out.note(format!("Page source length: {} characters", page.html.chars().count()));
        }
        Ok(out)
    }
}
