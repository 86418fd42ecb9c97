use std::path::PathBuf;

use crate::{CollectionProgress, DiscoveredUrl, Phase, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub phase: Phase,
    pub cve_id: Option<String>,
    pub progress: Option<CollectionProgress>,
    pub discovered: Vec<DiscoveredUrl>,
    pub template_path: Option<PathBuf>,
    pub template_id: Option<String>,
    pub catalog_id: Option<String>,
    /// Why the catalog entry was not recorded, when the template itself was written.
    pub catalog_warning: Option<String>,
    pub last_error: Option<PipelineError>,
    pub finished: bool,
    pub dirty: bool,
}

impl AppViewModel {
    /// Collection progress as a 0..=100 percentage.
    pub fn percent(&self) -> u8 {
        match self.progress {
            Some(p) if p.total > 0 => ((p.current.min(p.total) * 100) / p.total) as u8,
            _ => 0,
        }
    }
}
