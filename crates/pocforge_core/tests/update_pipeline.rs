use std::path::PathBuf;
use std::sync::Once;

use chrono::{NaiveDate, NaiveDateTime};
use pocforge_core::prompt::{SYSTEM_INSTRUCTION, URL_SECTION_HEADER};
use pocforge_core::{
    update, AppState, CollectionProgress, CollectionResult, DiscoveredUrl, Effect, Msg, Phase,
    Severity,
};
use pretty_assertions::assert_eq;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(forge_logging::initialize_for_tests);
}

fn received_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn submit(state: AppState, cve: &str, generate: bool) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::CveSubmitted {
            cve_id: cve.to_string(),
            generate,
        },
    )
}

fn collected() -> CollectionResult {
    CollectionResult {
        content: "## vulndb\n\nSome details\n".to_string(),
        urls: vec![DiscoveredUrl::new(
            "https://github.com/acme/CVE-2024-1234",
            "web-search",
        )],
    }
}

const MODEL_OUTPUT: &str = "Here you go:\n```yaml\nid: CVE-2024-1234\ninfo:\n  name: Acme RCE\n  severity: high\n  tags: [cve, acme]\n```\n";

#[test]
fn valid_submission_starts_collection() {
    init_logging();
    let (mut state, effects) = submit(AppState::new(), "  CVE-2024-1234 ", false);

    assert_eq!(
        effects,
        vec![Effect::StartCollection {
            cve_id: "CVE-2024-1234".to_string()
        }]
    );
    assert_eq!(state.phase(), Phase::Collecting);
    assert_eq!(state.view().cve_id.as_deref(), Some("CVE-2024-1234"));
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn invalid_submission_fails_without_effects() {
    let (state, effects) = submit(AppState::new(), "CVE-24-1", true);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Failed);
    let error = state.view().last_error.unwrap();
    assert_eq!(error.message, "invalid CVE identifier: CVE-24-1");
}

#[test]
fn submission_is_ignored_while_collecting() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", false);
    let (state, effects) = submit(state, "CVE-2024-9999", false);
    assert!(effects.is_empty());
    assert_eq!(state.view().cve_id.as_deref(), Some("CVE-2024-1234"));
}

#[test]
fn progress_never_moves_backwards() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", false);
    let (state, _) = update(
        state,
        Msg::CollectionProgress(CollectionProgress {
            current: 1,
            total: 2,
        }),
    );
    let (state, _) = update(
        state,
        Msg::CollectionProgress(CollectionProgress {
            current: 0,
            total: 2,
        }),
    );
    let view = state.view();
    assert_eq!(view.progress.map(|p| p.current), Some(1));
    assert_eq!(view.percent(), 50);
}

#[test]
fn duplicate_urls_are_kept_in_arrival_order() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", false);
    let url = DiscoveredUrl::new("https://a.example/x", "vulndb");
    let (state, _) = update(state, Msg::UrlDiscovered(url.clone()));
    let (state, _) = update(state, Msg::UrlDiscovered(url.clone()));
    assert_eq!(state.view().discovered, vec![url.clone(), url]);
}

#[test]
fn collect_only_run_finishes_after_completion() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", false);
    let (state, effects) = update(state, Msg::CollectionCompleted(collected()));
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Collected);
    assert!(state.is_finished());
    assert_eq!(state.collected(), Some(&collected()));
}

#[test]
fn cancel_is_forwarded_once() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", true);
    let (state, effects) = update(state, Msg::CancelRequested);
    assert_eq!(effects, vec![Effect::CancelCollection]);
    let (state, effects) = update(state, Msg::CancelRequested);
    assert!(effects.is_empty());

    let (state, _) = update(state, Msg::CollectionCancelled);
    assert_eq!(state.phase(), Phase::Cancelled);
    assert!(state.is_finished());
}

#[test]
fn completion_racing_a_cancel_does_not_start_generation() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", true);
    let (state, _) = update(state, Msg::CancelRequested);
    let (state, effects) = update(state, Msg::CollectionCompleted(collected()));

    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Cancelled);
    assert_eq!(state.collected(), Some(&collected()));
}

#[test]
fn collection_failure_keeps_partial_content() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", true);
    let (state, effects) = update(
        state,
        Msg::CollectionFailed {
            message: "browser session could not start".to_string(),
            partial: Some(collected()),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Failed);
    let error = state.view().last_error.unwrap();
    assert_eq!(error.raw.as_deref(), Some(collected().content.as_str()));
}

#[test]
fn generate_run_requests_model_with_reference_urls() {
    let (state, _) = submit(AppState::new(), "CVE-2024-1234", true);
    let (state, effects) = update(state, Msg::CollectionCompleted(collected()));

    assert_eq!(state.phase(), Phase::Generating);
    let [Effect::RequestGeneration { system, user }] = effects.as_slice() else {
        panic!("expected a single generation request, got {effects:?}");
    };
    assert_eq!(system, SYSTEM_INSTRUCTION);
    assert!(user.contains(URL_SECTION_HEADER));
    assert!(user.contains("1. https://github.com/acme/CVE-2024-1234"));
    assert!(user.ends_with("Collected information:\n\n## vulndb\n\nSome details\n"));
    assert!(state.prompt().contains(URL_SECTION_HEADER));
}

fn generating_state(save: bool) -> AppState {
    let (state, _) = update(AppState::new(), Msg::SaveToCatalog(save));
    let (state, _) = submit(state, "CVE-2024-1234", true);
    let (state, _) = update(state, Msg::CollectionCompleted(collected()));
    state
}

#[test]
fn model_response_is_written_then_cataloged() {
    init_logging();
    let state = generating_state(true);
    let (state, effects) = update(
        state,
        Msg::ModelResponded {
            raw: MODEL_OUTPUT.to_string(),
            received_at: received_at(),
        },
    );
    assert_eq!(state.phase(), Phase::Saving);
    let [Effect::WriteTemplate { id, document }] = effects.as_slice() else {
        panic!("expected a template write, got {effects:?}");
    };
    assert_eq!(id, "CVE-2024-1234");
    assert!(document.as_str().starts_with("id: CVE-2024-1234\n"));

    let path = PathBuf::from("poc/CVE-2024-1234.yaml");
    let (state, effects) = update(state, Msg::TemplateWritten { path: path.clone() });
    let [Effect::AddCatalogEntry(draft)] = effects.as_slice() else {
        panic!("expected a catalog entry, got {effects:?}");
    };
    assert_eq!(draft.name, "Acme RCE");
    assert_eq!(draft.severity, Severity::High);
    assert_eq!(draft.tags, vec!["cve", "acme"]);
    assert_eq!(draft.path, path);

    let (state, _) = update(
        state,
        Msg::CatalogSaved {
            id: "CVE-2024-1234".to_string(),
        },
    );
    let view = state.view();
    assert_eq!(view.phase, Phase::Generated);
    assert_eq!(view.template_path, Some(path));
    assert_eq!(view.catalog_id.as_deref(), Some("CVE-2024-1234"));
    assert!(view.finished);
}

#[test]
fn info_template_is_cataloged_as_low() {
    let state = generating_state(true);
    let raw = MODEL_OUTPUT.replace("severity: high", "severity: info");
    let (state, _) = update(
        state,
        Msg::ModelResponded {
            raw,
            received_at: received_at(),
        },
    );
    let (_, effects) = update(
        state,
        Msg::TemplateWritten {
            path: PathBuf::from("poc/CVE-2024-1234.yaml"),
        },
    );
    let [Effect::AddCatalogEntry(draft)] = effects.as_slice() else {
        panic!("expected a catalog entry, got {effects:?}");
    };
    assert_eq!(draft.severity, Severity::Low);
}

#[test]
fn failed_catalog_save_keeps_the_written_template() {
    let state = generating_state(true);
    let (state, _) = update(
        state,
        Msg::ModelResponded {
            raw: MODEL_OUTPUT.to_string(),
            received_at: received_at(),
        },
    );
    let path = PathBuf::from("poc/CVE-2024-1234.yaml");
    let (state, _) = update(state, Msg::TemplateWritten { path: path.clone() });
    let (state, effects) = update(
        state,
        Msg::CatalogSaveFailed("catalog is read-only".to_string()),
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.phase, Phase::Generated);
    assert_eq!(view.template_path, Some(path));
    assert_eq!(view.catalog_id, None);
    assert_eq!(view.catalog_warning.as_deref(), Some("catalog is read-only"));
    assert_eq!(view.last_error, None);
    assert!(view.finished);
}

#[test]
fn without_catalog_the_run_ends_after_writing() {
    let state = generating_state(false);
    let (state, _) = update(
        state,
        Msg::ModelResponded {
            raw: MODEL_OUTPUT.to_string(),
            received_at: received_at(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::TemplateWritten {
            path: PathBuf::from("poc/CVE-2024-1234.yaml"),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Generated);
}

#[test]
fn unusable_model_output_fails_with_raw_text() {
    let state = generating_state(false);
    let (state, effects) = update(
        state,
        Msg::ModelResponded {
            raw: "I am unable to help.".to_string(),
            received_at: received_at(),
        },
    );
    assert!(effects.is_empty());
    let error = state.view().last_error.unwrap();
    assert_eq!(error.message, "no template found in model output");
    assert_eq!(error.raw.as_deref(), Some("I am unable to help."));
}

#[test]
fn late_model_answer_after_cancel_is_ignored() {
    let state = generating_state(false);
    let (state, _) = update(state, Msg::CancelRequested);
    assert_eq!(state.phase(), Phase::Cancelled);
    let (state, effects) = update(
        state,
        Msg::ModelResponded {
            raw: MODEL_OUTPUT.to_string(),
            received_at: received_at(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Cancelled);
}

#[test]
fn regeneration_is_allowed_after_failure() {
    let state = generating_state(false);
    let (state, _) = update(state, Msg::ModelFailed("timeout".to_string()));
    assert_eq!(state.phase(), Phase::Failed);
    let (state, effects) = update(state, Msg::GenerateRequested);
    assert_eq!(state.phase(), Phase::Generating);
    assert_eq!(effects.len(), 1);
    // The reference section is only added once.
    let Effect::RequestGeneration { user, .. } = &effects[0] else {
        panic!("expected a generation request");
    };
    assert_eq!(user.matches(URL_SECTION_HEADER).count(), 1);
}

#[test]
fn noop_and_tick_change_nothing() {
    let state = AppState::new();
    let before = state.clone();
    let (state, effects) = update(state, Msg::Tick);
    let (state, more) = update(state, Msg::NoOp);
    assert!(effects.is_empty() && more.is_empty());
    assert_eq!(state, before);
}
