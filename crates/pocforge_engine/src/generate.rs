use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use forge_logging::forge_error;

use crate::llm::{GenerativeClient, LlmError};

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Responded {
        raw: String,
        received_at: NaiveDateTime,
    },
    Failed(LlmError),
}

/// Runs model requests off the caller's thread.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn GenerativeClient>,
}

impl Generator {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    /// Sends one request on a worker thread. Exactly one event follows.
    pub fn request(&self, system: String, user: String) -> GenerationHandle {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let fallback = tx.clone();

        let worker = thread::Builder::new()
            .name("generate".to_string())
            .spawn(move || {
                let event = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => match runtime.block_on(client.generate(&system, &user)) {
                        Ok(raw) => GenerationEvent::Responded {
                            raw,
                            received_at: Local::now().naive_local(),
                        },
                        Err(err) => GenerationEvent::Failed(err),
                    },
                    Err(err) => GenerationEvent::Failed(LlmError::Request(err.to_string())),
                };
                let _ = tx.send(event);
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                forge_error!("could not spawn generation worker: {err}");
                let _ = fallback.send(GenerationEvent::Failed(LlmError::Request(err.to_string())));
                None
            }
        };

        GenerationHandle { events: rx, worker }
    }
}

pub struct GenerationHandle {
    events: mpsc::Receiver<GenerationEvent>,
    worker: Option<thread::JoinHandle<()>>,
}

impl GenerationHandle {
    pub fn try_recv(&self) -> Option<GenerationEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<GenerationEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Blocks until the request finishes.
    pub fn wait(mut self) -> GenerationEvent {
        let event = self.events.recv().unwrap_or_else(|_| {
            GenerationEvent::Failed(LlmError::Request("generation worker stopped".to_string()))
        });
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl GenerativeClient for Echo {
        async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
            if user.is_empty() {
                return Err(LlmError::MissingApiKey);
            }
            Ok(format!("{system}|{user}"))
        }
    }

    #[test]
    fn response_arrives_as_one_event() {
        let generator = Generator::new(Arc::new(Echo));
        match generator.request("sys".into(), "usr".into()).wait() {
            GenerationEvent::Responded { raw, .. } => assert_eq!(raw, "sys|usr"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn failure_is_reported() {
        let generator = Generator::new(Arc::new(Echo));
        assert_eq!(
            generator.request("sys".into(), String::new()).wait(),
            GenerationEvent::Failed(LlmError::MissingApiKey)
        );
    }
}
