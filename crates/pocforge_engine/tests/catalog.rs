use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use pocforge_core::Severity;
use pocforge_engine::{Catalog, CatalogError, EntryUpdate, NewEntry, SearchQuery};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn entry(id: &str, name: &str, severity: Severity, tags: &[&str]) -> NewEntry {
    NewEntry {
        id: Some(id.to_string()),
        name: name.to_string(),
        path: PathBuf::from(format!("pocs/{id}.yaml")),
        description: format!("{name} description"),
        severity,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        references: Vec::new(),
    }
}

fn open(temp: &TempDir) -> Catalog {
    Catalog::open(temp.path().join("poc_database.json")).unwrap()
}

#[test]
fn open_creates_an_empty_catalog_file() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    let text = fs::read_to_string(catalog.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json, serde_json::json!({"pocs": []}));
    assert!(catalog.list().unwrap().is_empty());
}

#[test]
fn add_then_get_round_trips_through_the_file() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    let id = catalog
        .add(entry("CVE-2024-1234", "Acme RCE", Severity::High, &["cve", "rce"]), at(9))
        .unwrap();
    assert_eq!(id, "CVE-2024-1234");

    let reopened = open(&temp);
    let stored = reopened.get("CVE-2024-1234").unwrap().expect("entry stored");
    assert_eq!(stored.name, "Acme RCE");
    assert_eq!(stored.severity, Severity::High);
    assert_eq!(stored.tags, ["cve", "rce"]);
    assert_eq!(stored.created_at, Some(at(9)));
    assert_eq!(stored.updated_at, Some(at(9)));
}

#[test]
fn missing_id_gets_a_generated_one() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    let mut new = entry("x", "Anonymous", Severity::Low, &[]);
    new.id = None;
    let id = catalog.add(new, at(1)).unwrap();
    assert_eq!(id.len(), 36);
    assert!(catalog.get(&id).unwrap().is_some());
}

#[test]
fn re_adding_an_id_replaces_it_and_keeps_creation_time() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    catalog
        .add(entry("CVE-2024-1234", "First", Severity::High, &[]), at(9))
        .unwrap();
    catalog
        .add(entry("CVE-2024-1234", "Second", Severity::Critical, &[]), at(11))
        .unwrap();

    let all = catalog.list().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Second");
    assert_eq!(all[0].created_at, Some(at(9)));
    assert_eq!(all[0].updated_at, Some(at(11)));
}

#[test]
fn info_severity_is_rejected() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    let err = catalog
        .add(entry("CVE-2024-1", "Info only", Severity::Info, &[]), at(1))
        .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid(_)));
    assert!(catalog.list().unwrap().is_empty());
}

#[test]
fn update_and_delete_report_missing_ids() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    catalog
        .add(entry("CVE-2024-1234", "Acme", Severity::Medium, &[]), at(9))
        .unwrap();

    let update = EntryUpdate {
        severity: Some(Severity::Critical),
        tags: Some(vec!["kev".to_string()]),
        ..EntryUpdate::default()
    };
    assert!(catalog.update("CVE-2024-1234", update.clone(), at(10)).unwrap());
    assert!(!catalog.update("CVE-2000-0001", update, at(10)).unwrap());

    let stored = catalog.get("CVE-2024-1234").unwrap().unwrap();
    assert_eq!(stored.severity, Severity::Critical);
    assert_eq!(stored.tags, ["kev"]);
    assert_eq!(stored.name, "Acme");
    assert_eq!(stored.updated_at, Some(at(10)));

    assert!(catalog.delete("CVE-2024-1234").unwrap());
    assert!(!catalog.delete("CVE-2024-1234").unwrap());
}

#[test]
fn search_combines_keyword_tags_and_severity() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    catalog
        .add(entry("CVE-2024-1", "Apache ActiveMQ RCE", Severity::Critical, &["rce", "apache"]), at(1))
        .unwrap();
    catalog
        .add(entry("CVE-2024-2", "Nginx leak", Severity::Medium, &["disclosure"]), at(1))
        .unwrap();
    catalog
        .add(entry("CVE-2024-3", "Apache Struts", Severity::High, &["apache"]), at(1))
        .unwrap();

    let ids = |query: SearchQuery| -> Vec<String> {
        catalog
            .search(&query)
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    };

    assert_eq!(
        ids(SearchQuery {
            keyword: Some("apache".to_string()),
            ..SearchQuery::default()
        }),
        ["CVE-2024-1", "CVE-2024-3"]
    );
    assert_eq!(
        ids(SearchQuery {
            tags: vec!["disclosure".to_string(), "rce".to_string()],
            ..SearchQuery::default()
        }),
        ["CVE-2024-1", "CVE-2024-2"]
    );
    assert_eq!(
        ids(SearchQuery {
            keyword: Some("APACHE".to_string()),
            severity: Some(Severity::High),
            ..SearchQuery::default()
        }),
        ["CVE-2024-3"]
    );
    assert_eq!(ids(SearchQuery::default()).len(), 3);
}

#[test]
fn malformed_catalog_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("poc_database.json");
    fs::write(&path, "{ not json").unwrap();
    let catalog = Catalog::open(&path).unwrap();
    assert!(matches!(catalog.list(), Err(CatalogError::Malformed { .. })));
}

#[test]
fn import_reads_fields_and_falls_back_to_file_stem() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);

    let named = temp.path().join("activemq.yaml");
    fs::write(
        &named,
        "id: CVE-2023-46604\n\ninfo:\n  name: ActiveMQ RCE\n  severity: critical\n  tags: cve,activemq\n",
    )
    .unwrap();
    let id = catalog.import_template(&named, at(8)).unwrap();
    assert_eq!(id, "CVE-2023-46604");
    let stored = catalog.get(&id).unwrap().unwrap();
    assert_eq!(stored.name, "ActiveMQ RCE");
    assert_eq!(stored.severity, Severity::Critical);
    assert_eq!(stored.path, named);

    let anonymous = temp.path().join("legacy-check.yaml");
    fs::write(&anonymous, "id: legacy-1\n").unwrap();
    let id = catalog.import_template(&anonymous, at(8)).unwrap();
    assert_eq!(catalog.get(&id).unwrap().unwrap().name, "legacy-check");
}

#[test]
fn export_copies_existing_files_and_skips_missing_ones() {
    let temp = TempDir::new().unwrap();
    let catalog = open(&temp);
    let pocs = temp.path().join("pocs");
    fs::create_dir_all(&pocs).unwrap();
    let present = pocs.join("CVE-2024-1.yaml");
    fs::write(&present, "id: CVE-2024-1\n").unwrap();

    let mut first = entry("CVE-2024-1", "Present", Severity::Low, &[]);
    first.path = present;
    catalog.add(first, at(1)).unwrap();
    let mut second = entry("CVE-2024-2", "Gone", Severity::Low, &[]);
    second.path = pocs.join("CVE-2024-2.yaml");
    catalog.add(second, at(1)).unwrap();

    let out = temp.path().join("export");
    let report = catalog.export_all(&out).unwrap();
    assert_eq!(report.exported, [out.join("CVE-2024-1.yaml")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "CVE-2024-2");
    assert_eq!(
        fs::read_to_string(out.join("CVE-2024-1.yaml")).unwrap(),
        "id: CVE-2024-1\n"
    );
}
