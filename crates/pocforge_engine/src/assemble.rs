use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use forge_logging::forge_info;
use pocforge_core::{render_template, TemplateDocument, TemplateFields, TemplateInput, ValidationError};

use crate::persist::{AtomicFileWriter, PersistError};

pub const TEMPLATE_EXTENSION: &str = "yaml";

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("template input is not valid JSON: {0}")]
    Input(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("template id {0:?} cannot be used as a file name")]
    UnsafeId(String),
    #[error("could not write template: {0}")]
    Persist(#[from] PersistError),
}

/// A rendered template and where it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTemplate {
    pub fields: TemplateFields,
    pub document: TemplateDocument,
    pub path: PathBuf,
}

/// The POC directory: one `<id>.yaml` per template, replaced on regeneration.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    writer: AtomicFileWriter,
}

impl TemplateStore {
    pub fn new(poc_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(poc_dir),
        }
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, AssembleError> {
        Ok(self.dir().join(file_name(id)?))
    }

    /// Writes a finished document, creating the directory when needed.
    pub fn save_document(
        &self,
        id: &str,
        document: &TemplateDocument,
    ) -> Result<PathBuf, AssembleError> {
        let path = self.writer.write(&file_name(id)?, document.as_str())?;
        forge_info!("template written to {}", path.display());
        Ok(path)
    }

    /// Resolves defaults, renders and writes a template from structured fields.
    pub fn assemble(
        &self,
        input: TemplateInput,
        now: NaiveDateTime,
    ) -> Result<AssembledTemplate, AssembleError> {
        let fields = input.resolve(now)?;
        let document = render_template(&fields, now.date());
        let path = self.save_document(&fields.id, &document)?;
        Ok(AssembledTemplate {
            fields,
            document,
            path,
        })
    }
}

fn file_name(id: &str) -> Result<String, AssembleError> {
    let unsafe_id = id.trim().is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if unsafe_id {
        return Err(AssembleError::UnsafeId(id.to_string()));
    }
    Ok(format!("{id}.{TEMPLATE_EXTENSION}"))
}
