use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::{CollectionProgress, CollectionResult, DiscoveredUrl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User submitted a CVE id. `generate` continues into template generation
    /// once collection completes.
    CveSubmitted { cve_id: String, generate: bool },
    /// User replaced the generation prompt.
    PromptEdited(String),
    /// User chose whether the generated template is recorded in the catalog.
    SaveToCatalog(bool),
    /// User asked to stop the running collection.
    CancelRequested,
    /// User asked to generate from already collected data.
    GenerateRequested,
    /// Collection progress before each source.
    CollectionProgress(CollectionProgress),
    /// A source reported a URL.
    UrlDiscovered(DiscoveredUrl),
    CollectionCompleted(CollectionResult),
    /// Collection stopped after a cancel request.
    CollectionCancelled,
    CollectionFailed {
        message: String,
        partial: Option<CollectionResult>,
    },
    /// Raw text returned by the generative model.
    ModelResponded {
        raw: String,
        received_at: NaiveDateTime,
    },
    ModelFailed(String),
    TemplateWritten { path: PathBuf },
    TemplateWriteFailed(String),
    CatalogSaved { id: String },
    CatalogSaveFailed(String),
    /// Render tick.
    Tick,
    NoOp,
}
