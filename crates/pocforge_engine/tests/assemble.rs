use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use pocforge_core::{extract_fields, Severity, TemplateInput};
use pocforge_engine::{AssembleError, TemplateStore};
use tempfile::TempDir;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(14, 5, 6)
        .unwrap()
}

#[test]
fn assembled_template_is_written_and_reads_back() {
    let temp = TempDir::new().unwrap();
    let store = TemplateStore::new(temp.path().join("pocs"));
    let input = TemplateInput::from_json(
        r#"{
            "id": "CVE-2023-46604",
            "name": "ActiveMQ OpenWire RCE",
            "severity": "critical",
            "description": "Class instantiation over OpenWire.",
            "tags": "cve,activemq",
            "method": "POST",
            "paths": ["/api/jolokia"],
            "matchers": {"status": 200, "keywords": ["ProcessBuilder"]}
        }"#,
    )
    .unwrap();

    let assembled = store.assemble(input, now()).unwrap();
    assert_eq!(assembled.path, temp.path().join("pocs").join("CVE-2023-46604.yaml"));

    let written = fs::read_to_string(&assembled.path).unwrap();
    assert_eq!(written, assembled.document.as_str());

    let fields = extract_fields(&written, now());
    assert_eq!(fields.id, "CVE-2023-46604");
    assert_eq!(fields.name, "ActiveMQ OpenWire RCE");
    assert_eq!(fields.severity, Severity::Critical);
    assert_eq!(fields.tags, ["cve", "activemq"]);
}

#[test]
fn regenerating_replaces_the_file() {
    let temp = TempDir::new().unwrap();
    let store = TemplateStore::new(temp.path());
    let first = TemplateInput::from_json(
        r#"{"id": "CVE-2024-1", "name": "First", "paths": ["/a"], "matchers": {"status": 200}}"#,
    )
    .unwrap();
    let second = TemplateInput::from_json(
        r#"{"id": "CVE-2024-1", "name": "Second", "paths": ["/b"], "matchers": {"status": 302}}"#,
    )
    .unwrap();

    let path = store.assemble(first, now()).unwrap().path;
    store.assemble(second, now()).unwrap();
    let written = fs::read_to_string(path).unwrap();
    assert!(written.contains("{{BaseURL}}/b"));
    assert!(!written.contains("{{BaseURL}}/a"));
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn missing_keys_are_reported_without_writing() {
    let temp = TempDir::new().unwrap();
    let store = TemplateStore::new(temp.path().join("pocs"));
    let input = TemplateInput::from_json(r#"{"name": "No paths"}"#).unwrap();
    let err = store.assemble(input, now()).unwrap_err();
    assert!(matches!(err, AssembleError::Validation(_)));
    assert!(!temp.path().join("pocs").exists());
}

#[test]
fn id_with_path_separator_is_refused() {
    let temp = TempDir::new().unwrap();
    let store = TemplateStore::new(temp.path());
    let input = TemplateInput::from_json(
        r#"{"id": "../escape", "name": "Escape", "paths": ["/"], "matchers": {"status": 200}}"#,
    )
    .unwrap();
    assert!(matches!(
        store.assemble(input, now()),
        Err(AssembleError::UnsafeId(_))
    ));
}
