//! Deterministic rendering of [`TemplateFields`] into a verification template.
//!
//! The document is built from fixed textual skeletons in a fixed field order:
//! `id`, `info{name, author, severity, description, reference, tags, metadata}`,
//! then the `http` request block. Sanitization is narrow: double-quoted scalars
//! escape `\`, `"` and line breaks, the single-quoted FOFA query doubles `'`,
//! descriptions are re-indented, and every other header value is flattened to
//! one line so [`REQUEST_ANCHOR`] stays unique.

use std::fmt;

use chrono::NaiveDate;

use crate::fields::TemplateFields;

pub const AUTHOR: &str = "pocforge";
pub const DEFAULT_TAG: &str = "pocforge";
pub const DEFAULT_REFERENCE: &str = "https://github.com/projectdiscovery/nuclei-templates";
pub const DESCRIPTION_PLACEHOLDER: &str = "No description";
pub const KEYWORD_PLACEHOLDER: &str = "example";

/// Anchor the FOFA query is spliced in front of. Must occur exactly once.
pub const REQUEST_ANCHOR: &str = "\nhttp:\n";

const BLOCK_INDENT: &str = "    ";
const MATCHER_ITEM_INDENT: &str = "          ";

/// Rendered template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument(String);

impl TemplateDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TemplateDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn render_template(fields: &TemplateFields, created_at: NaiveDate) -> TemplateDocument {
    let header = format!(
        "id: {id}\n\
         info:\n  \
           name: {name}\n  \
           author: {AUTHOR}\n  \
           severity: {severity}\n  \
           description: |\n\
         {description}\n  \
           reference:\n\
         {references}\n  \
           tags: {tags}\n  \
           metadata:\n    \
             generated-by: {AUTHOR}\n    \
             created-at: {created_at}\n",
        id = single_line(&fields.id),
        name = single_line(&fields.name),
        severity = fields.severity,
        description = indent_block(&fields.description),
        references = format_references(&fields.references),
        tags = format_tags(&fields.tags),
        created_at = created_at.format("%Y-%m-%d"),
    );

    let document = format!("{header}{}", render_request(fields));
    let document = match fields.fofa_query.as_deref() {
        Some(query) => splice_before_request(&document, &fofa_line(query)),
        None => document,
    };
    TemplateDocument(document)
}

fn render_request(fields: &TemplateFields) -> String {
    let mut request = format!(
        "\nhttp:\n  \
           - method: {method}\n    \
             path:\n      \
               - \"{{{{BaseURL}}}}{path}\"\n\n    \
             matchers-condition: or\n    \
             matchers:\n      \
               - type: word\n        \
                 part: body\n        \
                 words:\n\
         {keywords}\n        \
                 condition: or\n      \
               - type: status\n        \
                 status:\n          \
                   - {status}\n",
        method = fields.method,
        path = escape_double_quoted(fields.first_path()),
        keywords = format_quoted_items(&fields.matchers.keywords),
        status = fields.matchers.status_code,
    );

    if !fields.matchers.regexes.is_empty() {
        request.push_str(&format!(
            "      - type: regex\n        \
                 part: body\n        \
                 regex:\n\
             {regexes}\n        \
                 condition: or\n",
            regexes = format_quoted_items(&fields.matchers.regexes),
        ));
    }
    request
}

fn fofa_line(query: &str) -> String {
    let query = query.replace(['\r', '\n'], " ").replace('\'', "''");
    format!("{BLOCK_INDENT}fofa-query: '{query}'\n")
}

/// Textual splice: everything before the anchor, the insert, then the anchor and the rest.
fn splice_before_request(document: &str, insert: &str) -> String {
    match document.split_once(REQUEST_ANCHOR) {
        Some((head, tail)) => format!("{head}{insert}{REQUEST_ANCHOR}{tail}"),
        None => document.to_string(),
    }
}

fn indent_block(text: &str) -> String {
    let text = text.trim();
    let text = if text.is_empty() {
        DESCRIPTION_PLACEHOLDER.to_string()
    } else {
        text.replace("\r\n", "\n").replace('\r', "\n")
    };
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{BLOCK_INDENT}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_references(references: &[String]) -> String {
    let refs: Vec<String> = references
        .iter()
        .map(|r| single_line(r))
        .filter(|r| !r.is_empty())
        .collect();
    let refs = if refs.is_empty() {
        vec![DEFAULT_REFERENCE.to_string()]
    } else {
        refs
    };
    refs.iter()
        .map(|r| format!("{BLOCK_INDENT}- {r}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_tags(tags: &[String]) -> String {
    let cleaned: Vec<String> = tags
        .iter()
        .map(|t| crate::fields::sanitize_tag(t.trim()))
        .filter(|t| !t.is_empty())
        .collect();
    if cleaned.is_empty() {
        format!("[{DEFAULT_TAG}]")
    } else {
        format!("[{}]", cleaned.join(", "))
    }
}

fn format_quoted_items(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(|i| format!("{MATCHER_ITEM_INDENT}- \"{}\"", escape_double_quoted(i)))
        .collect();
    if quoted.is_empty() {
        format!("{MATCHER_ITEM_INDENT}- \"{KEYWORD_PLACEHOLDER}\"")
    } else {
        quoted.join("\n")
    }
}

pub fn escape_double_quoted(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn single_line(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
