use std::sync::mpsc;
use std::thread;

use chrono::Local;
use forge_logging::{forge_error, forge_info, forge_warn};
use pocforge_core::{CatalogDraft, Effect, Msg};
use pocforge_engine::{
    Catalog, CollectError, CollectionEvent, Collector, GenerationEvent, Generator, TemplateStore,
};
use tokio_util::sync::CancellationToken;

/// Engine handles the pipeline effects are carried out with.
pub struct EngineParts {
    pub collector: Collector,
    pub generator: Generator,
    pub store: TemplateStore,
    /// `None` when the run does not record templates.
    pub catalog: Option<Catalog>,
}

/// Turns effects into engine work and engine events back into messages.
pub struct EffectRunner {
    parts: EngineParts,
    msg_tx: mpsc::Sender<Msg>,
    collection: Option<CancellationToken>,
    workers: Vec<thread::JoinHandle<()>>,
    /// Model requests cannot be interrupted; these are detached on cancel.
    generation: Vec<thread::JoinHandle<()>>,
}

impl EffectRunner {
    pub fn new(parts: EngineParts, msg_tx: mpsc::Sender<Msg>) -> Self {
        Self {
            parts,
            msg_tx,
            collection: None,
            workers: Vec::new(),
            generation: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartCollection { cve_id } => self.start_collection(&cve_id),
                Effect::CancelCollection => {
                    if let Some(token) = &self.collection {
                        forge_info!("cancelling collection");
                        token.cancel();
                    }
                }
                Effect::RequestGeneration { system, user } => {
                    let handle = self.parts.generator.request(system, user);
                    let tx = self.msg_tx.clone();
                    if let Some(worker) = spawn_thread("generate-events", move || {
                        let _ = tx.send(map_generation_event(handle.wait()));
                    }) {
                        self.generation.push(worker);
                    }
                }
                Effect::WriteTemplate { id, document } => {
                    let msg = match self.parts.store.save_document(&id, &document) {
                        Ok(path) => Msg::TemplateWritten { path },
                        Err(err) => {
                            forge_error!("template {id} not written: {err}");
                            Msg::TemplateWriteFailed(err.to_string())
                        }
                    };
                    let _ = self.msg_tx.send(msg);
                }
                Effect::AddCatalogEntry(draft) => {
                    let msg = self.add_to_catalog(draft);
                    let _ = self.msg_tx.send(msg);
                }
            }
        }
    }

    fn start_collection(&mut self, cve_id: &str) {
        let run = match self.parts.collector.collect(cve_id) {
            Ok(run) => run,
            Err(err) => {
                let _ = self.msg_tx.send(Msg::CollectionFailed {
                    message: err.to_string(),
                    partial: None,
                });
                return;
            }
        };
        self.collection = Some(run.cancel_token());
        let tx = self.msg_tx.clone();
        self.spawn_forwarder("collect-events", move || {
            let mut finished = false;
            while let Some(event) = run.recv() {
                finished = matches!(
                    event,
                    CollectionEvent::Completed(_) | CollectionEvent::Error(_)
                );
                if tx.send(map_collection_event(event)).is_err() || finished {
                    break;
                }
            }
            if !finished {
                forge_error!("collection worker stopped without a result");
                let _ = tx.send(Msg::CollectionFailed {
                    message: "collection worker stopped without a result".to_string(),
                    partial: None,
                });
            }
            run.wait();
        });
    }

    fn add_to_catalog(&self, draft: CatalogDraft) -> Msg {
        let Some(catalog) = &self.parts.catalog else {
            return Msg::CatalogSaveFailed("no catalog configured".to_string());
        };
        match catalog.add(draft.into(), Local::now().naive_local()) {
            Ok(id) => Msg::CatalogSaved { id },
            Err(err) => {
                forge_warn!("catalog save failed: {err}");
                Msg::CatalogSaveFailed(err.to_string())
            }
        }
    }

    fn spawn_forwarder(&mut self, name: &str, work: impl FnOnce() + Send + 'static) {
        if let Some(handle) = spawn_thread(name, work) {
            self.workers.push(handle);
        }
    }

    /// Stops tracking model requests whose answers are no longer wanted.
    pub fn detach_generation(&mut self) {
        if !self.generation.is_empty() {
            forge_info!("leaving {} model request(s) unanswered", self.generation.len());
        }
        self.generation.clear();
    }

    /// Waits for forwarding threads that are still draining.
    pub fn join(&mut self) {
        for worker in self.workers.drain(..).chain(self.generation.drain(..)) {
            let _ = worker.join();
        }
    }
}

fn spawn_thread(name: &str, work: impl FnOnce() + Send + 'static) -> Option<thread::JoinHandle<()>> {
    match thread::Builder::new().name(name.to_string()).spawn(work) {
        Ok(handle) => Some(handle),
        Err(err) => {
            forge_error!("could not spawn {name}: {err}");
            None
        }
    }
}

pub fn map_collection_event(event: CollectionEvent) -> Msg {
    match event {
        CollectionEvent::Progress(progress) => Msg::CollectionProgress(progress),
        CollectionEvent::UrlFound(url) => Msg::UrlDiscovered(url),
        CollectionEvent::Completed(result) => Msg::CollectionCompleted(result),
        CollectionEvent::Error(CollectError::Cancelled { .. }) => Msg::CollectionCancelled,
        CollectionEvent::Error(err) => Msg::CollectionFailed {
            message: err.to_string(),
            partial: err.partial().cloned(),
        },
    }
}

pub fn map_generation_event(event: GenerationEvent) -> Msg {
    match event {
        GenerationEvent::Responded { raw, received_at } => Msg::ModelResponded { raw, received_at },
        GenerationEvent::Failed(err) => Msg::ModelFailed(err.to_string()),
    }
}
