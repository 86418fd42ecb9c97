//! PocForge core: template model, synthesis, response parsing and the pure
//! pipeline state machine.
mod collection;
mod cve;
mod effect;
mod error;
mod fields;
mod msg;
pub mod prompt;
mod response;
mod state;
mod template;
mod update;
mod view_model;

pub use collection::{CollectionProgress, CollectionResult, DiscoveredUrl};
pub use cve::{is_valid_cve_id, CveId};
pub use effect::{CatalogDraft, Effect};
pub use error::{ExtractionError, InvalidIdentifier, ValidationError};
pub use fields::{
    generated_id, generated_name, sanitize_tag, HttpMethod, Matchers, MatchersInput, OneOrMany,
    Severity, TemplateFields, TemplateInput, UnknownSeverity, DEFAULT_PATH, DEFAULT_STATUS_CODE,
};
pub use msg::Msg;
pub use response::{extract_fields, parse_template, ExtractedFields, UNNAMED};
pub use state::{AppState, Phase, PipelineError};
pub use template::{
    escape_double_quoted, render_template, TemplateDocument, AUTHOR, DEFAULT_REFERENCE,
    DEFAULT_TAG, DESCRIPTION_PLACEHOLDER, KEYWORD_PLACEHOLDER, REQUEST_ANCHOR,
};
pub use update::update;
pub use view_model::AppViewModel;
