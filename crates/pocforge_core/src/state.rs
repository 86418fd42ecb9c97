use std::path::PathBuf;

use crate::prompt::DEFAULT_PROMPT;
use crate::response::ExtractedFields;
use crate::view_model::AppViewModel;
use crate::{CollectionProgress, CollectionResult, DiscoveredUrl, TemplateDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Collecting,
    Collected,
    Generating,
    Saving,
    Generated,
    Cancelled,
    Failed,
}

/// A terminal pipeline error. `raw` carries model output or partial data that
/// the operator needs to recover by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    pub message: String,
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    phase: Phase,
    cve_id: Option<String>,
    generate_after_collection: bool,
    save_to_catalog: bool,
    cancel_requested: bool,
    prompt: String,
    progress: Option<CollectionProgress>,
    discovered: Vec<DiscoveredUrl>,
    collected: Option<CollectionResult>,
    document: Option<TemplateDocument>,
    fields: Option<ExtractedFields>,
    template_path: Option<PathBuf>,
    catalog_id: Option<String>,
    catalog_warning: Option<String>,
    last_error: Option<PipelineError>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            cve_id: None,
            generate_after_collection: false,
            save_to_catalog: false,
            cancel_requested: false,
            prompt: DEFAULT_PROMPT.to_string(),
            progress: None,
            discovered: Vec::new(),
            collected: None,
            document: None,
            fields: None,
            template_path: None,
            catalog_id: None,
            catalog_warning: None,
            last_error: None,
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            phase: self.phase,
            cve_id: self.cve_id.clone(),
            progress: self.progress,
            discovered: self.discovered.clone(),
            template_path: self.template_path.clone(),
            template_id: self.fields.as_ref().map(|f| f.id.clone()),
            catalog_id: self.catalog_id.clone(),
            catalog_warning: self.catalog_warning.clone(),
            last_error: self.last_error.clone(),
            finished: self.is_finished(),
            dirty: self.dirty,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn collected(&self) -> Option<&CollectionResult> {
        self.collected.as_ref()
    }

    pub fn document(&self) -> Option<&TemplateDocument> {
        self.document.as_ref()
    }

    /// No further messages will move the pipeline forward on their own.
    pub fn is_finished(&self) -> bool {
        match self.phase {
            Phase::Idle | Phase::Collecting | Phase::Generating | Phase::Saving => false,
            Phase::Collected => !self.generate_after_collection,
            Phase::Generated | Phase::Cancelled | Phase::Failed => true,
        }
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.mark_dirty();
        }
    }

    pub(crate) fn start_run(&mut self, cve_id: String, generate: bool) {
        let prompt = std::mem::take(&mut self.prompt);
        let save_to_catalog = self.save_to_catalog;
        *self = Self {
            phase: Phase::Collecting,
            cve_id: Some(cve_id),
            generate_after_collection: generate,
            save_to_catalog,
            prompt,
            ..Self::default()
        };
        self.mark_dirty();
    }

    pub(crate) fn generate_after_collection(&self) -> bool {
        self.generate_after_collection
    }

    pub(crate) fn save_to_catalog(&self) -> bool {
        self.save_to_catalog
    }

    pub(crate) fn set_save_to_catalog(&mut self, save: bool) {
        self.save_to_catalog = save;
    }

    pub(crate) fn set_prompt(&mut self, prompt: String) {
        self.prompt = prompt;
        self.mark_dirty();
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
        self.mark_dirty();
    }

    /// Progress never moves backwards within a run.
    pub(crate) fn apply_progress(&mut self, progress: CollectionProgress) {
        let advances = self
            .progress
            .is_none_or(|current| progress.current >= current.current);
        if advances {
            self.progress = Some(progress);
            self.mark_dirty();
        }
    }

    pub(crate) fn push_discovered(&mut self, url: DiscoveredUrl) {
        self.discovered.push(url);
        self.mark_dirty();
    }

    pub(crate) fn set_collected(&mut self, result: CollectionResult) {
        self.collected = Some(result);
        self.mark_dirty();
    }

    pub(crate) fn set_generated(&mut self, document: TemplateDocument, fields: ExtractedFields) {
        self.document = Some(document);
        self.fields = Some(fields);
        self.mark_dirty();
    }

    pub(crate) fn fields(&self) -> Option<&ExtractedFields> {
        self.fields.as_ref()
    }

    pub(crate) fn set_template_path(&mut self, path: PathBuf) {
        self.template_path = Some(path);
        self.mark_dirty();
    }

    pub(crate) fn template_path(&self) -> Option<&PathBuf> {
        self.template_path.as_ref()
    }

    pub(crate) fn set_catalog_id(&mut self, id: String) {
        self.catalog_id = Some(id);
        self.mark_dirty();
    }

    pub(crate) fn set_catalog_warning(&mut self, message: String) {
        self.catalog_warning = Some(message);
        self.mark_dirty();
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>, raw: Option<String>) {
        self.last_error = Some(PipelineError {
            message: message.into(),
            raw,
        });
        self.set_phase(Phase::Failed);
        self.mark_dirty();
    }
}
