//! JSON catalog of generated templates: `{ "pocs": [entry, ...] }`.
//!
//! Every operation loads the whole file, changes it in memory and writes it
//! back atomically. Concurrent writers are not supported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use forge_logging::{forge_debug, forge_info, forge_warn};
use pocforge_core::{extract_fields, CatalogDraft, Severity, UNNAMED};

use crate::persist::{write_atomic, PersistError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file {path} is not valid JSON: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("catalog entry rejected: {0}")]
    Invalid(String),
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write catalog: {0}")]
    Persist(#[from] PersistError),
    #[error("catalog could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl CatalogEntry {
    /// Catalog severities are the four actionable levels; `info` is not accepted.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::Invalid("id must not be empty".to_string()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(CatalogError::Invalid(format!("{}: path must not be empty", self.id)));
        }
        if self.severity == Severity::Info {
            return Err(CatalogError::Invalid(format!(
                "{}: severity must be one of critical, high, medium, low",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    pocs: Vec<CatalogEntry>,
}

/// Fields for a new entry. A missing id is replaced by a random UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub id: Option<String>,
    pub name: String,
    pub path: PathBuf,
    pub description: String,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub references: Vec<String>,
}

impl From<CatalogDraft> for NewEntry {
    fn from(draft: CatalogDraft) -> Self {
        Self {
            id: Some(draft.id),
            name: draft.name,
            path: draft.path,
            description: draft.description,
            severity: draft.severity,
            tags: draft.tags,
            references: draft.references,
        }
    }
}

/// Explicit field replacement; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub tags: Option<Vec<String>>,
    pub references: Option<Vec<String>>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply(self, entry: &mut CatalogEntry) {
        if let Some(name) = self.name {
            entry.name = name;
        }
        if let Some(path) = self.path {
            entry.path = path;
        }
        if let Some(description) = self.description {
            entry.description = description;
        }
        if let Some(severity) = self.severity {
            entry.severity = severity;
        }
        if let Some(tags) = self.tags {
            entry.tags = tags;
        }
        if let Some(references) = self.references {
            entry.references = references;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive substring of id, name or description.
    pub keyword: Option<String>,
    /// Entry carries at least one of these tags.
    pub tags: Vec<String>,
    pub severity: Option<Severity>,
}

impl SearchQuery {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        if let Some(keyword) = self.keyword.as_deref().map(str::to_lowercase) {
            let hit = [&entry.id, &entry.name, &entry.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|tag| entry.tags.contains(tag)) {
            return false;
        }
        self.severity.is_none_or(|severity| entry.severity == severity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: Vec<PathBuf>,
    /// Entries whose template file is gone, with the reason.
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Opens the catalog at `path`, creating an empty one when the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let catalog = Self { path: path.into() };
        if !catalog.path.exists() {
            forge_info!("creating empty catalog at {}", catalog.path.display());
            catalog.save(&CatalogFile::default())?;
        }
        Ok(catalog)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CatalogFile, CatalogError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.save(&CatalogFile::default())?;
                return Ok(CatalogFile::default());
            }
            Err(source) => {
                return Err(CatalogError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|err| CatalogError::Malformed {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn save(&self, file: &CatalogFile) -> Result<(), CatalogError> {
        for entry in &file.pocs {
            entry.validate()?;
        }
        let text = serde_json::to_string_pretty(file)?;
        write_atomic(&self.path, &text)?;
        forge_debug!("catalog saved with {} entries", file.pocs.len());
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self.load()?.pocs)
    }

    pub fn get(&self, id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.load()?.pocs.into_iter().find(|entry| entry.id == id))
    }

    /// Adds an entry and returns its id. An entry with the same id is replaced
    /// and keeps its creation time.
    pub fn add(&self, new: NewEntry, now: NaiveDateTime) -> Result<String, CatalogError> {
        let id = new
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut entry = CatalogEntry {
            id: id.clone(),
            name: new.name,
            path: new.path,
            description: new.description,
            severity: new.severity,
            tags: new.tags,
            references: new.references,
            created_at: Some(now),
            updated_at: Some(now),
        };
        entry.validate()?;

        let mut file = self.load()?;
        match file.pocs.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => {
                entry.created_at = existing.created_at.or(Some(now));
                *existing = entry;
                forge_info!("catalog entry {id} replaced");
            }
            None => {
                file.pocs.push(entry);
                forge_info!("catalog entry {id} added");
            }
        }
        self.save(&file)?;
        Ok(id)
    }

    /// Returns `false` when no entry has `id`.
    pub fn update(
        &self,
        id: &str,
        update: EntryUpdate,
        now: NaiveDateTime,
    ) -> Result<bool, CatalogError> {
        let mut file = self.load()?;
        let Some(entry) = file.pocs.iter_mut().find(|entry| entry.id == id) else {
            return Ok(false);
        };
        update.apply(entry);
        entry.updated_at = Some(now);
        self.save(&file)?;
        Ok(true)
    }

    /// Removes the record only; the template file stays on disk.
    pub fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        let mut file = self.load()?;
        let before = file.pocs.len();
        file.pocs.retain(|entry| entry.id != id);
        if file.pocs.len() == before {
            return Ok(false);
        }
        self.save(&file)?;
        Ok(true)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self
            .load()?
            .pocs
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect())
    }

    /// Records an existing template file, reading its fields from the text.
    pub fn import_template(&self, path: &Path, now: NaiveDateTime) -> Result<String, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fields = extract_fields(&text, now);
        let name = if fields.name == UNNAMED {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or(fields.name)
        } else {
            fields.name
        };
        self.add(
            NewEntry {
                id: Some(fields.id),
                name,
                path: path.to_path_buf(),
                description: fields.description,
                severity: fields.severity.catalog_level(),
                tags: fields.tags,
                references: fields.references,
            },
            now,
        )
    }

    /// Copies every entry's template file into `dir` under its own file name.
    pub fn export_all(&self, dir: &Path) -> Result<ExportReport, CatalogError> {
        crate::persist::ensure_output_dir(dir)?;
        let mut report = ExportReport::default();
        for entry in self.load()?.pocs {
            let Some(file_name) = entry.path.file_name() else {
                report.skipped.push((entry.id, "path has no file name".to_string()));
                continue;
            };
            let target = dir.join(file_name);
            match fs::read_to_string(&entry.path) {
                Ok(text) => {
                    write_atomic(&target, &text)?;
                    report.exported.push(target);
                }
                Err(err) => {
                    forge_warn!("skipping export of {}: {err}", entry.id);
                    report.skipped.push((entry.id, err.to_string()));
                }
            }
        }
        Ok(report)
    }
}
