use crate::cve::CveId;
use crate::prompt::{compose_user_content, with_reference_urls, SYSTEM_INSTRUCTION};
use crate::response::{extract_fields, parse_template};
use crate::{AppState, CatalogDraft, CollectionResult, Effect, Msg, Phase};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::CveSubmitted { cve_id, generate } => {
            if !accepts_new_run(state.phase()) {
                return (state, Vec::new());
            }
            let cve_id = cve_id.trim().to_string();
            match CveId::parse(&cve_id) {
                Ok(id) => {
                    state.start_run(id.to_string(), generate);
                    vec![Effect::StartCollection {
                        cve_id: id.to_string(),
                    }]
                }
                Err(err) => {
                    state.fail(err.to_string(), None);
                    Vec::new()
                }
            }
        }
        Msg::PromptEdited(prompt) => {
            state.set_prompt(prompt);
            Vec::new()
        }
        Msg::SaveToCatalog(save) => {
            state.set_save_to_catalog(save);
            Vec::new()
        }
        Msg::CancelRequested => match state.phase() {
            Phase::Collecting if !state.cancel_requested() => {
                state.request_cancel();
                vec![Effect::CancelCollection]
            }
            // The model round trip cannot be interrupted; its answer is ignored.
            Phase::Generating => {
                state.set_phase(Phase::Cancelled);
                Vec::new()
            }
            _ => Vec::new(),
        },
        Msg::CollectionProgress(progress) => {
            if state.phase() == Phase::Collecting {
                state.apply_progress(progress);
            }
            Vec::new()
        }
        Msg::UrlDiscovered(url) => {
            if state.phase() == Phase::Collecting {
                state.push_discovered(url);
            }
            Vec::new()
        }
        Msg::CollectionCompleted(result) => {
            if state.phase() != Phase::Collecting {
                return (state, Vec::new());
            }
            state.set_collected(result);
            if state.cancel_requested() {
                state.set_phase(Phase::Cancelled);
                return (state, Vec::new());
            }
            state.set_phase(Phase::Collected);
            if state.generate_after_collection() {
                request_generation(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::CollectionCancelled => {
            if state.phase() == Phase::Collecting {
                state.set_phase(Phase::Cancelled);
            }
            Vec::new()
        }
        Msg::CollectionFailed { message, partial } => {
            if state.phase() == Phase::Collecting {
                let raw = partial.as_ref().map(|p| p.content.clone());
                if let Some(partial) = partial {
                    state.set_collected(partial);
                }
                state.fail(message, raw);
            }
            Vec::new()
        }
        Msg::GenerateRequested => match state.phase() {
            Phase::Collected | Phase::Failed | Phase::Generated if state.collected().is_some() => {
                request_generation(&mut state)
            }
            _ => Vec::new(),
        },
        Msg::ModelResponded { raw, received_at } => {
            if state.phase() != Phase::Generating {
                return (state, Vec::new());
            }
            match parse_template(&raw) {
                Ok(document) => {
                    let fields = extract_fields(document.as_str(), received_at);
                    let id = fields.id.clone();
                    state.set_generated(document.clone(), fields);
                    state.set_phase(Phase::Saving);
                    vec![Effect::WriteTemplate { id, document }]
                }
                Err(err) => {
                    state.fail(err.to_string(), Some(err.raw));
                    Vec::new()
                }
            }
        }
        Msg::ModelFailed(message) => {
            if state.phase() == Phase::Generating {
                state.fail(message, None);
            }
            Vec::new()
        }
        Msg::TemplateWritten { path } => {
            if state.phase() != Phase::Saving {
                return (state, Vec::new());
            }
            state.set_template_path(path);
            match catalog_draft(&state) {
                Some(draft) if state.save_to_catalog() => vec![Effect::AddCatalogEntry(draft)],
                _ => {
                    state.set_phase(Phase::Generated);
                    Vec::new()
                }
            }
        }
        Msg::TemplateWriteFailed(message) => {
            if state.phase() == Phase::Saving {
                let raw = state.document().map(|d| d.as_str().to_string());
                state.fail(message, raw);
            }
            Vec::new()
        }
        Msg::CatalogSaved { id } => {
            if state.phase() == Phase::Saving {
                state.set_catalog_id(id);
                state.set_phase(Phase::Generated);
            }
            Vec::new()
        }
        // The template is already on disk; the run still counts as generated.
        Msg::CatalogSaveFailed(message) => {
            if state.phase() == Phase::Saving {
                state.set_catalog_warning(message);
                state.set_phase(Phase::Generated);
            }
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn accepts_new_run(phase: Phase) -> bool {
    !matches!(phase, Phase::Collecting | Phase::Generating | Phase::Saving)
}

fn request_generation(state: &mut AppState) -> Vec<Effect> {
    let Some(CollectionResult { content, urls }) = state.collected().cloned() else {
        return Vec::new();
    };
    let prompt = with_reference_urls(state.prompt(), &urls);
    let user = compose_user_content(&prompt, &content);
    state.set_prompt(prompt);
    state.set_phase(Phase::Generating);
    vec![Effect::RequestGeneration {
        system: SYSTEM_INSTRUCTION.to_string(),
        user,
    }]
}

fn catalog_draft(state: &AppState) -> Option<CatalogDraft> {
    let fields = state.fields()?;
    let path = state.template_path()?;
    Some(CatalogDraft {
        id: fields.id.clone(),
        name: fields.name.clone(),
        path: path.clone(),
        description: fields.description.clone(),
        severity: fields.severity.catalog_level(),
        tags: fields.tags.clone(),
        references: fields.references.clone(),
    })
}
