use thiserror::Error;

/// The identifier does not look like `CVE-YYYY-NNNN`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid CVE identifier: {0}")]
pub struct InvalidIdentifier(pub String);

/// The model output contained no recognizable template.
///
/// The raw text is kept so the operator can recover the template by hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no template found in model output")]
pub struct ExtractionError {
    pub raw: String,
}

/// A required template field was absent from the assembly input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template input is missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
}
