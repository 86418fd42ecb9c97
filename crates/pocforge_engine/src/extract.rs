use std::sync::LazyLock;

use regex::Regex;

use forge_logging::forge_debug;

use crate::page::{HtmlPage, PageQuery, Query};
use crate::session::{BrowserSession, NavigateError};

static BLOCK_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)poc|exploit|vuln|payload|attack").expect("valid keyword pattern"));

static TEXT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:poc|exploit|payload|vulnerability|attack).{0,100}")
        .expect("valid snippet pattern")
});

/// Pulls proof-of-concept text out of a referenced page.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Best effort; failures come back as a note in the returned text.
    async fn extract_poc_text(&self, session: &BrowserSession, url: &str) -> String;
}

/// Code blocks that look like exploit material, else keyword windows from the main text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PocTextExtractor;

#[async_trait::async_trait]
impl ContentExtractor for PocTextExtractor {
    async fn extract_poc_text(&self, session: &BrowserSession, url: &str) -> String {
        match session.navigate(url).await {
            Ok(page) => poc_text_from_html(&page.html, &page.url),
            Err(NavigateError::Cancelled) => String::new(),
            Err(err) => {
                forge_debug!("extraction skipped for {url}: {err}");
                format!("Failed to extract POC content from {url}: {err}\n")
            }
        }
    }
}

/// Extraction over already loaded HTML.
pub fn poc_text_from_html(html: &str, url: &str) -> String {
    let page = HtmlPage::parse(html, url);

    let blocks = page
        .first_match(&[Query::css("pre"), Query::css("code")])
        .unwrap_or_default();
    let mut out = String::new();
    for block in &blocks {
        let text = block.raw_text();
        if BLOCK_KEYWORDS.is_match(&text) || text.to_lowercase().contains("http") {
            out.push_str(&text);
            out.push_str("\n\n");
        }
    }
    if !out.is_empty() {
        return out;
    }

    let Some(main) = page.find_first(&[Query::css("main"), Query::css("article"), Query::css("body")])
    else {
        return out;
    };
    let text = main.text();
    for snippet in TEXT_SNIPPET.find_iter(&text) {
        out.push_str(snippet.as_str());
        out.push_str("...\n\n");
    }
    out
}
