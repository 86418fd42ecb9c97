//! Parsed pages and the selector-cascade queries the sources run against them.
//!
//! `scraper::Html` is not `Send`, so pages are parsed, queried and dropped
//! inside synchronous helpers; only owned strings cross an `.await`.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use forge_logging::forge_warn;

/// Text condition applied to elements a selector matched. Comparisons ignore case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Any,
    /// The element's full text contains the needle.
    Contains(String),
    /// The element's own text nodes, excluding descendants, contain the needle.
    OwnContains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub selector: String,
    pub text: TextMatch,
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: TextMatch::Any,
        }
    }

    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.text = TextMatch::Contains(needle.into().to_lowercase());
        self
    }

    pub fn owning(mut self, needle: impl Into<String>) -> Self {
        self.text = TextMatch::OwnContains(needle.into().to_lowercase());
        self
    }

    fn parse_selector(&self) -> Option<Selector> {
        match Selector::parse(&self.selector) {
            Ok(selector) => Some(selector),
            Err(err) => {
                forge_warn!("invalid selector {:?}: {err}", self.selector);
                None
            }
        }
    }

    fn accepts(&self, element: &PageElement<'_>) -> bool {
        match &self.text {
            TextMatch::Any => true,
            TextMatch::Contains(needle) => element.text().to_lowercase().contains(needle),
            TextMatch::OwnContains(needle) => element.own_text().to_lowercase().contains(needle),
        }
    }
}

/// Selector lookups over a page or a subtree of it.
pub trait PageQuery {
    fn find_all(&self, query: &Query) -> Vec<PageElement<'_>>;

    /// Every match of the first query in `cascade` that matches anything.
    fn first_match(&self, cascade: &[Query]) -> Option<Vec<PageElement<'_>>> {
        cascade
            .iter()
            .map(|query| self.find_all(query))
            .find(|found| !found.is_empty())
    }

    /// The first element matched by the first query in `cascade` that matches anything.
    fn find_first(&self, cascade: &[Query]) -> Option<PageElement<'_>> {
        self.first_match(cascade)
            .and_then(|found| found.into_iter().next())
    }
}

pub struct HtmlPage {
    document: Html,
    url: Option<Url>,
}

impl HtmlPage {
    pub fn parse(html: &str, url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            url: Url::parse(url).ok(),
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn root(&self) -> PageElement<'_> {
        PageElement {
            element: self.document.root_element(),
            base: self.url.as_ref(),
        }
    }
}

impl PageQuery for HtmlPage {
    fn find_all(&self, query: &Query) -> Vec<PageElement<'_>> {
        let Some(selector) = query.parse_selector() else {
            return Vec::new();
        };
        let base = self.url.as_ref();
        self.document
            .select(&selector)
            .map(|element| PageElement { element, base })
            .filter(|element| query.accepts(element))
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct PageElement<'a> {
    element: ElementRef<'a>,
    base: Option<&'a Url>,
}

impl<'a> PageElement<'a> {
    pub fn name(&self) -> &'a str {
        self.element.value().name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Visible text with block structure kept as line breaks.
    pub fn text(&self) -> String {
        let mut builder = TextBuilder::default();
        for child in self.element.children() {
            visit_node(child, &mut builder);
        }
        builder.finish()
    }

    /// Every descendant text node verbatim; used for `pre` and `code`.
    pub fn raw_text(&self) -> String {
        self.element.text().collect()
    }

    /// Text nodes directly under this element.
    pub fn own_text(&self) -> String {
        let mut own = String::new();
        for child in self.element.children() {
            if let Some(text) = child.value().as_text() {
                own.push_str(text);
            }
        }
        own.trim().to_string()
    }

    /// The `href` resolved against the page URL.
    pub fn link(&self) -> Option<String> {
        let href = self.attr("href")?;
        resolve_url(href, self.base).map(String::from)
    }
}

impl PageQuery for PageElement<'_> {
    fn find_all(&self, query: &Query) -> Vec<PageElement<'_>> {
        let Some(selector) = query.parse_selector() else {
            return Vec::new();
        };
        self.element
            .select(&selector)
            .map(|element| PageElement {
                element,
                base: self.base,
            })
            .filter(|element| query.accepts(element))
            .collect()
    }
}

pub(crate) fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("mailto:") {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url);
    }
    base.and_then(|base| base.join(trimmed).ok())
}

fn visit_node(node: NodeRef<'_, Node>, builder: &mut TextBuilder) {
    match node.value() {
        Node::Text(text) => builder.push_text(text),
        Node::Element(element) => match element.name() {
            "script" | "style" | "noscript" | "template" | "iframe" => {}
            "br" => builder.newline(),
            name if is_block(name) => {
                builder.newline();
                for child in node.children() {
                    visit_node(child, builder);
                }
                builder.newline();
            }
            _ => {
                for child in node.children() {
                    visit_node(child, builder);
                }
            }
        },
        _ => {
            for child in node.children() {
                visit_node(child, builder);
            }
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "main"
            | "header"
            | "footer"
            | "nav"
            | "aside"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "tr"
            | "pre"
            | "blockquote"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "dt"
            | "dd"
    )
}

/// Collapses whitespace runs and keeps at most one line break between blocks.
#[derive(Default)]
struct TextBuilder {
    out: String,
}

impl TextBuilder {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if matches!(self.out.chars().last(), None | Some(' ') | Some('\n')) {
                    continue;
                }
                self.out.push(' ');
            } else {
                self.out.push(ch);
            }
        }
    }

    fn newline(&mut self) {
        while self.out.ends_with(' ') {
            self.out.pop();
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        self.out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r#"<html><head><title>t</title><style>p{}</style></head><body>
        <div class="results">
          <div class="row">Intro <a href="/detail?id=1">CVE-2024-0001 detail</a></div>
          <div class="row">CVE-2024-0001 mentioned <span>inline</span></div>
        </div>
        <script>var x = "CVE-2024-0001";</script>
        <p>First   paragraph<br>second line</p>
    </body></html>"#;

    fn page() -> HtmlPage {
        HtmlPage::parse(FIXTURE, "https://db.example/search?q=x")
    }

    #[test]
    fn cascade_stops_at_first_query_with_matches() {
        let page = page();
        let cascade = [
            Query::css("div.missing"),
            Query::css("div.row"),
            Query::css("div"),
        ];
        let found = page.first_match(&cascade).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(page.find_first(&cascade).unwrap().name(), "div");
    }

    #[test]
    fn cascade_with_no_matches_is_none() {
        let page = page();
        assert!(page
            .first_match(&[Query::css("table tr"), Query::css("ul > li")])
            .is_none());
    }

    #[test]
    fn own_text_ignores_descendants() {
        let page = page();
        let owning = page.find_all(&Query::css("div").owning("cve-2024-0001"));
        assert_eq!(owning.len(), 1);
        assert_eq!(owning[0].own_text(), "CVE-2024-0001 mentioned");

        let containing = page.find_all(&Query::css("div.row").containing("CVE-2024-0001"));
        assert_eq!(containing.len(), 2);
    }

    #[test]
    fn links_resolve_against_page_url() {
        let page = page();
        let row = page.find_first(&[Query::css("div.row")]).unwrap();
        let link = row.find_first(&[Query::css("a")]).unwrap();
        assert_eq!(
            link.link().as_deref(),
            Some("https://db.example/detail?id=1")
        );
    }

    #[test]
    fn text_skips_scripts_and_keeps_blocks() {
        let page = page();
        let body = page.find_first(&[Query::css("body")]).unwrap();
        let text = body.text();
        assert!(!text.contains("var x"));
        assert!(text.contains("First paragraph\nsecond line"));
        assert!(text.starts_with("Intro CVE-2024-0001 detail\nCVE-2024-0001 mentioned inline"));
    }

    #[test]
    fn invalid_selector_matches_nothing() {
        let page = page();
        assert!(page.find_all(&Query::css("div[")).is_empty());
    }
}
