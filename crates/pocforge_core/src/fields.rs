use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// Closed five-level urgency classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Level recorded in the catalog, which files `info` as `low`.
    pub fn catalog_level(self) -> Self {
        match self {
            Severity::Info => Severity::Low,
            other => other,
        }
    }

    /// Parses case-insensitively, falling back to `medium` for anything unknown.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity {0:?}")]
pub struct UnknownSeverity(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Unknown or blank methods become `GET`.
    pub fn parse_lenient(raw: &str) -> Self {
        let wanted = raw.trim();
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(wanted))
            .unwrap_or_default()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchers {
    pub status_code: u16,
    pub keywords: Vec<String>,
    pub regexes: Vec<String>,
}

impl Default for Matchers {
    fn default() -> Self {
        Self {
            status_code: DEFAULT_STATUS_CODE,
            keywords: Vec::new(),
            regexes: Vec::new(),
        }
    }
}

/// Fully resolved template fields, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFields {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub references: Vec<String>,
    pub method: HttpMethod,
    pub paths: Vec<String>,
    pub matchers: Matchers,
    pub fofa_query: Option<String>,
}

impl TemplateFields {
    /// Only the first path is rendered into the request block.
    pub fn first_path(&self) -> &str {
        self.paths.first().map(String::as_str).unwrap_or(DEFAULT_PATH)
    }
}

/// A value that may arrive either as a single string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Single strings are split on commas; list items are taken as-is.
    fn into_comma_list(self) -> Vec<String> {
        match self {
            OneOrMany::One(raw) => raw.split(',').map(str::to_string).collect(),
            OneOrMany::Many(items) => items,
        }
    }

    fn into_list(self) -> Vec<String> {
        match self {
            OneOrMany::One(raw) => vec![raw],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MatchersInput {
    #[serde(alias = "status", alias = "statusCode")]
    pub status_code: Option<u16>,
    pub keywords: Option<OneOrMany>,
    #[serde(alias = "regex")]
    pub regexes: Option<OneOrMany>,
}

/// Raw, partially specified template fields as supplied by a caller.
///
/// Absence (`None`) and emptiness are distinct: `id`, `name`, `paths` and
/// `matchers` must be present, but may be empty and are then defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub tags: Option<OneOrMany>,
    pub references: Option<OneOrMany>,
    pub method: Option<String>,
    pub paths: Option<OneOrMany>,
    pub matchers: Option<MatchersInput>,
    #[serde(alias = "fofaQuery")]
    pub fofa_query: Option<String>,
}

impl TemplateInput {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn resolve(self, now: NaiveDateTime) -> Result<TemplateFields, ValidationError> {
        let mut missing = Vec::new();
        if self.id.is_none() {
            missing.push("id");
        }
        if self.name.is_none() {
            missing.push("name");
        }
        if self.paths.is_none() {
            missing.push("paths");
        }
        if self.matchers.is_none() {
            missing.push("matchers");
        }
        let (Some(id), Some(name), Some(paths), Some(matchers)) =
            (self.id, self.name, self.paths, self.matchers)
        else {
            return Err(ValidationError { missing });
        };

        let id = non_blank(&id).unwrap_or_else(|| generated_id(now));
        let name = non_blank(&name).unwrap_or_else(|| generated_name(now));

        let mut paths = clean_list(paths.into_list());
        if paths.is_empty() {
            paths.push(DEFAULT_PATH.to_string());
        }

        let tags = self
            .tags
            .map(OneOrMany::into_comma_list)
            .unwrap_or_default()
            .iter()
            .map(|tag| sanitize_tag(tag))
            .filter(|tag| !tag.is_empty())
            .collect();

        Ok(TemplateFields {
            id,
            name,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
            severity: self
                .severity
                .as_deref()
                .map(Severity::parse_lenient)
                .unwrap_or_default(),
            tags,
            references: clean_list(
                self.references
                    .map(OneOrMany::into_comma_list)
                    .unwrap_or_default(),
            ),
            method: self
                .method
                .as_deref()
                .map(HttpMethod::parse_lenient)
                .unwrap_or_default(),
            paths,
            matchers: Matchers {
                status_code: matchers.status_code.unwrap_or(DEFAULT_STATUS_CODE),
                keywords: clean_list(matchers.keywords.map(OneOrMany::into_list).unwrap_or_default()),
                regexes: clean_list(matchers.regexes.map(OneOrMany::into_list).unwrap_or_default()),
            },
            fofa_query: self.fofa_query.as_deref().and_then(non_blank),
        })
    }
}

/// Generated id for templates that arrive without one: `generic-YYYYMMDDHHMMSS`.
pub fn generated_id(now: NaiveDateTime) -> String {
    format!("generic-{}", timestamp(now))
}

pub fn generated_name(now: NaiveDateTime) -> String {
    format!("Unnamed POC-{}", timestamp(now))
}

/// Keeps only `[A-Za-z0-9_-]`.
pub fn sanitize_tag(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn timestamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items.iter().filter_map(|item| non_blank(item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap()
    }

    #[test]
    fn severity_parsing_is_case_insensitive_with_medium_fallback() {
        assert_eq!(Severity::parse_lenient(" HIGH "), Severity::High);
        assert_eq!(Severity::parse_lenient("info"), Severity::Info);
        assert_eq!(Severity::parse_lenient("severe"), Severity::Medium);
        assert_eq!(Severity::parse_lenient(""), Severity::Medium);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn method_falls_back_to_get() {
        assert_eq!(HttpMethod::parse_lenient("post"), HttpMethod::Post);
        assert_eq!(HttpMethod::parse_lenient("TRACE"), HttpMethod::Get);
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let err = TemplateInput {
            name: Some("x".into()),
            ..TemplateInput::default()
        }
        .resolve(now())
        .unwrap_err();
        assert_eq!(err.missing, vec!["id", "paths", "matchers"]);
    }

    #[test]
    fn blank_values_are_defaulted() {
        let fields = TemplateInput {
            id: Some("  ".into()),
            name: Some(String::new()),
            paths: Some(OneOrMany::Many(vec![" ".into()])),
            matchers: Some(MatchersInput::default()),
            severity: Some("extreme".into()),
            fofa_query: Some("   ".into()),
            ..TemplateInput::default()
        }
        .resolve(now())
        .unwrap();

        assert_eq!(fields.id, "generic-20240309070501");
        assert_eq!(fields.name, "Unnamed POC-20240309070501");
        assert_eq!(fields.paths, vec!["/"]);
        assert_eq!(fields.severity, Severity::Medium);
        assert_eq!(fields.matchers.status_code, 200);
        assert_eq!(fields.fofa_query, None);
    }

    #[test]
    fn comma_strings_split_and_tags_are_sanitized() {
        let input = TemplateInput::from_json(
            r#"{
                "id": "CVE-2024-0001",
                "name": "Demo",
                "tags": "cve, rce!, ,path traversal",
                "references": "https://a, https://b",
                "paths": "/x,y",
                "matchers": {"status": 302, "keywords": "ok", "regex": ["v\\d+"]}
            }"#,
        )
        .unwrap();
        let fields = input.resolve(now()).unwrap();

        assert_eq!(fields.tags, vec!["cve", "rce", "pathtraversal"]);
        assert_eq!(fields.references, vec!["https://a", "https://b"]);
        assert_eq!(fields.paths, vec!["/x,y"]);
        assert_eq!(fields.matchers.status_code, 302);
        assert_eq!(fields.matchers.keywords, vec!["ok"]);
        assert_eq!(fields.matchers.regexes, vec![r"v\d+"]);
    }
}
