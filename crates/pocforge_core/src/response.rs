//! Extraction of templates and template fields from free-form model output.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::ExtractionError;
use crate::fields::{generated_id, Severity};
use crate::template::TemplateDocument;

pub const UNNAMED: &str = "Unnamed POC";

static FENCED_TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?i:ya?ml)\s*(.*?)```").expect("valid fence pattern"));

/// Pulls the template document out of a model response.
///
/// A fenced `yaml` block wins and is passed through verbatim (trimmed). Without
/// one, everything from the first line starting with `id:` is taken. The raw
/// text travels inside the error when neither is present.
pub fn parse_template(raw: &str) -> Result<TemplateDocument, ExtractionError> {
    if let Some(body) = fenced_block(raw) {
        return Ok(TemplateDocument::new(body));
    }
    if let Some(suffix) = suffix_from_id_line(raw) {
        return Ok(TemplateDocument::new(suffix));
    }
    Err(ExtractionError {
        raw: raw.to_string(),
    })
}

fn fenced_block(raw: &str) -> Option<&str> {
    FENCED_TEMPLATE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
}

fn suffix_from_id_line(raw: &str) -> Option<&str> {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if line.trim().starts_with("id:") {
            return Some(&raw[offset..]);
        }
        offset += line.len();
    }
    None
}

/// Catalog-facing fields re-derived from a template or raw model text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub references: Vec<String>,
}

/// Each field degrades to its own default; extraction itself never fails.
///
/// Keys are looked up structurally: text inside `|`/`>` block scalars is never
/// read as a key, and `info` fields are taken from the direct children of the
/// `info:` mapping when one exists.
pub fn extract_fields(text: &str, now: NaiveDateTime) -> ExtractedFields {
    let outline = Outline::new(text);

    let id = outline
        .top_scalar("id")
        .map(|v| strip_comment(&v).to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| generated_id(now));
    let name = outline
        .info_scalar("name")
        .unwrap_or_else(|| UNNAMED.to_string());
    let severity = outline
        .info_scalar("severity")
        .map(|v| Severity::parse_lenient(strip_comment(&v)))
        .unwrap_or_default();

    ExtractedFields {
        id,
        name,
        description: outline.description().unwrap_or_default(),
        severity,
        tags: outline.tags(),
        references: outline.references(),
    }
}

struct KeyLine<'a> {
    index: usize,
    indent: usize,
    value: &'a str,
}

/// Line view of a YAML-ish document with block scalar bodies masked out.
struct Outline<'a> {
    lines: Vec<&'a str>,
    hidden: Vec<bool>,
    /// Line range and child indent of the `info:` mapping.
    info: Option<(Range<usize>, usize)>,
}

impl<'a> Outline<'a> {
    fn new(text: &'a str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let hidden = block_scalar_bodies(&lines);
        let mut outline = Self {
            lines,
            hidden,
            info: None,
        };
        outline.info = outline.info_section();
        outline
    }

    fn info_section(&self) -> Option<(Range<usize>, usize)> {
        let info = self.find(0..self.lines.len(), "info", None)?;
        if !info.value.is_empty() {
            return None;
        }
        let body = nested_lines(&self.lines, &info);
        let child_indent = body
            .iter()
            .find(|line| !line.trim().is_empty())
            .map(|line| indent_of(line))?;
        let start = info.index + 1;
        Some((start..start + body.len(), child_indent))
    }

    fn find(
        &self,
        mut range: Range<usize>,
        key: &str,
        indent: Option<usize>,
    ) -> Option<KeyLine<'a>> {
        range.find_map(|index| {
            if self.hidden[index] {
                return None;
            }
            let line = self.lines[index];
            let trimmed = line.trim_start();
            let line_indent = line.len() - trimmed.len();
            if indent.is_some_and(|wanted| wanted != line_indent) {
                return None;
            }
            let value = trimmed.strip_prefix(key)?.strip_prefix(':')?;
            Some(KeyLine {
                index,
                indent: line_indent,
                value: value.trim(),
            })
        })
    }

    fn top_key(&self, key: &str) -> Option<KeyLine<'a>> {
        self.find(0..self.lines.len(), key, None)
    }

    /// A direct child of `info:`, or the first visible match without an `info:` mapping.
    fn info_key(&self, key: &str) -> Option<KeyLine<'a>> {
        match &self.info {
            Some((range, indent)) => self.find(range.clone(), key, Some(*indent)),
            None => self.top_key(key),
        }
    }

    fn top_scalar(&self, key: &str) -> Option<String> {
        non_empty_scalar(self.top_key(key)?)
    }

    fn info_scalar(&self, key: &str) -> Option<String> {
        non_empty_scalar(self.info_key(key)?)
    }

    fn description(&self) -> Option<String> {
        let found = self.info_key("description")?;
        if !is_block_indicator(found.value) {
            return non_empty_scalar(found);
        }

        let body = nested_lines(&self.lines, &found);
        let indent = body
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| indent_of(l))
            .min()
            .unwrap_or(0);
        let text = body
            .iter()
            .map(|l| l.get(indent..).unwrap_or("").trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    fn tags(&self) -> Vec<String> {
        let Some(found) = self.info_key("tags") else {
            return Vec::new();
        };
        let items: Vec<String> = if found.value.is_empty() {
            list_items(&nested_lines(&self.lines, &found))
        } else {
            found
                .value
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|t| unquote(t.trim()).to_string())
                .collect()
        };
        items.into_iter().filter(|t| !t.is_empty()).collect()
    }

    fn references(&self) -> Vec<String> {
        let found = self
            .info_key("reference")
            .or_else(|| self.info_key("references"));
        let Some(found) = found else {
            return Vec::new();
        };
        if !found.value.is_empty() {
            return vec![unquote(found.value).to_string()];
        }
        list_items(&nested_lines(&self.lines, &found))
    }
}

fn non_empty_scalar(found: KeyLine<'_>) -> Option<String> {
    let value = unquote(found.value);
    (!value.is_empty()).then(|| value.to_string())
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// `|`, `>` and their chomping/indentation variants such as `|-` or `>2`.
fn is_block_indicator(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some('|' | '>'))
        && chars.all(|c| matches!(c, '+' | '-') || c.is_ascii_digit())
}

/// Marks every line that belongs to the body of a block scalar.
fn block_scalar_bodies(lines: &[&str]) -> Vec<bool> {
    let mut hidden = vec![false; lines.len()];
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        let value = line.split_once(':').map(|(_, value)| value.trim());
        if value.is_some_and(is_block_indicator) {
            let key = KeyLine {
                index,
                indent: indent_of(line),
                value: "",
            };
            let body = nested_lines(lines, &key).len();
            hidden[index + 1..index + 1 + body].fill(true);
            index += body;
        }
        index += 1;
    }
    hidden
}

/// Drops a trailing ` # comment`.
fn strip_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(at) => value[..at].trim_end(),
        None => value,
    }
}

/// Lines indented deeper than the key line, stopping at the first shallower one.
fn nested_lines<'a>(lines: &[&'a str], key: &KeyLine<'_>) -> Vec<&'a str> {
    let body: Vec<&str> = lines[key.index + 1..]
        .iter()
        .take_while(|line| line.trim().is_empty() || indent_of(line) > key.indent)
        .copied()
        .collect();
    let trailing_blank = body.iter().rev().take_while(|l| l.trim().is_empty()).count();
    body[..body.len() - trailing_blank].to_vec()
}

fn list_items(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.trim().strip_prefix('-'))
        .map(|item| unquote(item.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
    }

    #[test]
    fn empty_fence_falls_through_to_id_line() {
        let raw = "```yaml\n```\nid: x\n";
        assert_eq!(parse_template(raw).unwrap().as_str(), "id: x\n");
    }

    #[test]
    fn yml_label_and_upper_case_are_accepted() {
        let raw = "```YML\nid: a\n```";
        assert_eq!(parse_template(raw).unwrap().as_str(), "id: a");
    }

    #[test]
    fn description_block_is_dedented() {
        let text = "id: a\ninfo:\n  description: |\n    line one\n\n    line two\n  tags: x\n";
        let fields = extract_fields(text, now());
        assert_eq!(fields.description, "line one\n\nline two");
    }

    #[test]
    fn inline_description_and_quoted_scalars() {
        let text = "id: 'quoted-id'\ninfo:\n  name: \"Quoted\"\n  description: short one\n";
        let fields = extract_fields(text, now());
        assert_eq!(fields.id, "quoted-id");
        assert_eq!(fields.name, "Quoted");
        assert_eq!(fields.description, "short one");
    }

    #[test]
    fn tags_in_block_list_form() {
        let text = "info:\n  tags:\n    - cve\n    - 'lfi'\n  metadata:\n    x: y\n";
        assert_eq!(extract_fields(text, now()).tags, vec!["cve", "lfi"]);
    }

    #[test]
    fn keys_inside_block_scalars_are_ignored() {
        let text = "id: a\ninfo:\n  description: |\n    severity: low\n    tags: evil\n  severity: high\n  tags: [cve]\n";
        let fields = extract_fields(text, now());
        assert_eq!(fields.severity, Severity::High);
        assert_eq!(fields.tags, vec!["cve"]);
        assert_eq!(fields.description, "severity: low\ntags: evil");
    }

    #[test]
    fn info_fields_come_from_direct_children_only() {
        let text = "id: a\ninfo:\n  metadata:\n    name: nested\n  name: Real\nhttp:\n  - name: request\n";
        assert_eq!(extract_fields(text, now()).name, "Real");
    }

    #[test]
    fn id_keeps_inner_spaces_and_drops_comments() {
        assert_eq!(extract_fields("id: a b\n", now()).id, "a b");
        assert_eq!(extract_fields("id: cve-x # generated\n", now()).id, "cve-x");
    }

    #[test]
    fn defaults_when_nothing_matches() {
        let fields = extract_fields("nothing useful here", now());
        assert_eq!(fields.id, "generic-20250630235958");
        assert_eq!(fields.name, UNNAMED);
        assert_eq!(fields.description, "");
        assert_eq!(fields.severity, Severity::Medium);
        assert!(fields.tags.is_empty());
        assert!(fields.references.is_empty());
    }
}
