use pocforge_core::{AppViewModel, Phase};

/// Turns successive view models into terminal lines, printing each change once.
#[derive(Debug, Default)]
pub struct Renderer {
    shown_urls: usize,
    last_status: Option<String>,
}

impl Renderer {
    pub fn render(&mut self, view: &AppViewModel) -> Vec<String> {
        let mut lines = Vec::new();

        for found in view.discovered.iter().skip(self.shown_urls) {
            lines.push(format!("  [{}] {}", found.source, found.url));
        }
        self.shown_urls = view.discovered.len();

        let status = status_line(view);
        if self.last_status.as_deref() != Some(status.as_str()) {
            lines.push(status.clone());
            self.last_status = Some(status);
        }
        lines
    }
}

fn status_line(view: &AppViewModel) -> String {
    let cve = view.cve_id.as_deref().unwrap_or("-");
    match view.phase {
        Phase::Idle => "Idle".to_string(),
        Phase::Collecting => match view.progress {
            Some(progress) => format!(
                "Collecting {cve}: source {}/{} ({}%)",
                progress.current.min(progress.total),
                progress.total,
                view.percent()
            ),
            None => format!("Collecting {cve}"),
        },
        Phase::Collected => format!("Collected {cve}: {} urls", view.discovered.len()),
        Phase::Generating => format!("Generating template for {cve}"),
        Phase::Saving => format!("Saving template for {cve}"),
        Phase::Generated => {
            let path = view
                .template_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match (&view.catalog_id, &view.catalog_warning) {
                (Some(id), _) => format!("Template written to {path} (catalog id {id})"),
                (None, Some(warning)) => {
                    format!("Template written to {path} (catalog entry not saved: {warning})")
                }
                (None, None) => format!("Template written to {path}"),
            }
        }
        Phase::Cancelled => "Cancelled".to_string(),
        Phase::Failed => match &view.last_error {
            Some(err) => format!("Failed: {}", err.message),
            None => "Failed".to_string(),
        },
    }
}
