use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use forge_logging::{forge_error, forge_info, forge_warn, RunScope};
use pocforge_core::{CollectionProgress, CollectionResult, CveId, InvalidIdentifier};

use crate::extract::{ContentExtractor, PocTextExtractor};
use crate::fetch::FetchSettings;
use crate::session::{BrowserSession, ReqwestSessionFactory, SessionFactory};
use crate::sources::{SourceContext, SourceFetcher, VulnDbSource, WebSearchSource};
use crate::{CollectError, CollectionEvent};

pub const EXTRACTED_HEADING: &str = "Extracted POC content";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: CollectionEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<CollectionEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<CollectionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: CollectionEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Wait after each navigation so late content can arrive.
    pub settle: Duration,
    /// How many aggregated URLs the content extractor visits.
    pub extract_limit: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            extract_limit: 3,
        }
    }
}

/// Everything one run needs. Cheap to clone into a worker.
#[derive(Clone)]
pub struct CollectionPlan {
    pub sessions: Arc<dyn SessionFactory>,
    pub sources: Vec<Arc<dyn SourceFetcher>>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub settings: CollectorSettings,
}

impl CollectionPlan {
    /// Vulnerability database then web search, over plain HTTP fetches.
    pub fn standard(fetch: FetchSettings, settings: CollectorSettings) -> Self {
        Self {
            sessions: Arc::new(ReqwestSessionFactory::new(fetch)),
            sources: vec![
                Arc::new(VulnDbSource::default()),
                Arc::new(WebSearchSource::default()),
            ],
            extractor: Arc::new(PocTextExtractor),
            settings,
        }
    }
}

/// Starts collection runs, each on its own worker thread.
#[derive(Clone)]
pub struct Collector {
    plan: CollectionPlan,
}

impl Collector {
    pub fn new(plan: CollectionPlan) -> Self {
        Self { plan }
    }

    /// Validates `cve_id` and starts a run. Nothing is dispatched for an invalid id.
    pub fn collect(&self, cve_id: &str) -> Result<CollectionRun, InvalidIdentifier> {
        let cve = CveId::parse(cve_id.trim())?;
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let plan = self.plan.clone();
        let worker_cancel = cancel.clone();
        let spawn_failed = ChannelEventSink::new(tx.clone());

        let worker = thread::Builder::new()
            .name(format!("collect-{cve}"))
            .spawn(move || {
                let _scope = RunScope::enter(cve.as_str());
                let sink = ChannelEventSink::new(tx);
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        forge_error!("could not start collection runtime: {err}");
                        sink.emit(CollectionEvent::Error(CollectError::Pipeline {
                            message: err.to_string(),
                            partial: CollectionResult::default(),
                        }));
                        return;
                    }
                };
                runtime.block_on(run_collection(&plan, &cve, &worker_cancel, &sink));
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                forge_error!("could not spawn collection worker: {err}");
                spawn_failed.emit(CollectionEvent::Error(CollectError::Pipeline {
                    message: err.to_string(),
                    partial: CollectionResult::default(),
                }));
                None
            }
        };

        Ok(CollectionRun {
            events: rx,
            cancel,
            worker,
        })
    }
}

/// Handle to a running collection.
pub struct CollectionRun {
    events: mpsc::Receiver<CollectionEvent>,
    cancel: CancellationToken,
    worker: Option<thread::JoinHandle<()>>,
}

impl CollectionRun {
    /// Asks the run to stop at its next safe point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn try_recv(&self) -> Option<CollectionEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks for the next event. `None` once the worker has finished and every
    /// event was received.
    pub fn recv(&self) -> Option<CollectionEvent> {
        self.events.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<CollectionEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Collects every remaining event and joins the worker.
    pub fn wait(mut self) -> Vec<CollectionEvent> {
        let events: Vec<_> = self.events.iter().collect();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                forge_error!("collection worker panicked");
            }
        }
        events
    }
}

/// Drives one run to its terminal event. The session is closed exactly once,
/// whatever the outcome, including a panic anywhere in the run.
pub async fn run_collection(
    plan: &CollectionPlan,
    cve: &CveId,
    cancel: &CancellationToken,
    sink: &dyn EventSink,
) {
    let fetcher = match AssertUnwindSafe(plan.sessions.open()).catch_unwind().await {
        Ok(Ok(fetcher)) => fetcher,
        Ok(Err(err)) => {
            forge_error!("{err}");
            sink.emit(CollectionEvent::Error(CollectError::Session(err.to_string())));
            return;
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            forge_error!("session factory panicked: {message}");
            sink.emit(CollectionEvent::Error(CollectError::Session(message)));
            return;
        }
    };
    let session = BrowserSession::new(fetcher, plan.settings.settle, cancel.clone());

    let mut result = CollectionResult::default();
    let outcome = AssertUnwindSafe(collect_sources(plan, cve, &session, sink, &mut result))
        .catch_unwind()
        .await;
    session.close();

    match outcome {
        Ok(Ok(())) => {
            forge_info!(
                "collection finished: {} urls, {} chars",
                result.urls.len(),
                result.content.len()
            );
            sink.emit(CollectionEvent::Completed(result));
        }
        Ok(Err(Cancelled)) => {
            forge_warn!("collection cancelled");
            sink.emit(CollectionEvent::Error(CollectError::Cancelled { partial: result }));
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            forge_error!("collection panicked: {message}");
            sink.emit(CollectionEvent::Error(CollectError::Pipeline {
                message,
                partial: result,
            }));
        }
    }
}

struct Cancelled;

async fn collect_sources(
    plan: &CollectionPlan,
    cve: &CveId,
    session: &BrowserSession,
    sink: &dyn EventSink,
    result: &mut CollectionResult,
) -> Result<(), Cancelled> {
    let total = plan.sources.len();

    for (index, source) in plan.sources.iter().enumerate() {
        if session.is_cancelled() {
            return Err(Cancelled);
        }
        sink.emit(CollectionEvent::Progress(CollectionProgress {
            current: index,
            total,
        }));
        forge_info!("source {} of {}: {}", index + 1, total, source.name());

        let ctx = SourceContext { session, sink };
        let fetched = AssertUnwindSafe(source.fetch(cve, &ctx)).catch_unwind().await;
        let body = match fetched {
            Ok(Ok(output)) => {
                result.urls.extend(output.urls);
                output.content
            }
            Ok(Err(err)) => {
                forge_warn!("source {} failed: {}", source.name(), err.message);
                result.urls.extend(err.partial.urls);
                format!("{}[{} failed: {}]\n", err.partial.content, source.name(), err.message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                forge_error!("source {} panicked: {message}", source.name());
                format!("[{} failed: {message}]\n", source.name())
            }
        };
        push_section(&mut result.content, source.heading(), &body);
    }

    if session.is_cancelled() {
        return Err(Cancelled);
    }
    sink.emit(CollectionEvent::Progress(CollectionProgress {
        current: total,
        total,
    }));

    let mut extracted = String::new();
    let targets: Vec<String> = result
        .urls
        .iter()
        .take(plan.settings.extract_limit)
        .map(|found| found.url.clone())
        .collect();
    for url in targets {
        if session.is_cancelled() {
            return Err(Cancelled);
        }
        let text = plan.extractor.extract_poc_text(session, &url).await;
        if !text.trim().is_empty() {
            extracted.push_str(&format!("--- {url} ---\n{text}\n"));
        }
    }
    if session.is_cancelled() {
        return Err(Cancelled);
    }
    if !extracted.is_empty() {
        push_section(&mut result.content, EXTRACTED_HEADING, &extracted);
    }

    Ok(())
}

fn push_section(content: &mut String, heading: &str, body: &str) {
    content.push_str(&format!("== {heading} ==\n{body}"));
    if !body.ends_with('\n') {
        content.push('\n');
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
