use std::path::PathBuf;

use crate::{Severity, TemplateDocument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartCollection { cve_id: String },
    CancelCollection,
    RequestGeneration { system: String, user: String },
    WriteTemplate { id: String, document: TemplateDocument },
    AddCatalogEntry(CatalogDraft),
}

/// Catalog fields written for a freshly generated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDraft {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub description: String,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub references: Vec<String>,
}
