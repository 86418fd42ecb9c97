use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use forge_logging::{forge_debug, forge_info};

use crate::decode::decode_body;
use crate::fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
use crate::page::HtmlPage;
use crate::FetchError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("browser session could not start: {0}")]
    Startup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigateError {
    #[error("navigation cancelled")]
    Cancelled,
    #[error("could not load {url}: {source}")]
    Load { url: String, source: FetchError },
}

/// Opens the page fetcher backing one collection run.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn PageFetcher>, SessionError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestSessionFactory {
    settings: FetchSettings,
}

impl ReqwestSessionFactory {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl SessionFactory for ReqwestSessionFactory {
    async fn open(&self) -> Result<Arc<dyn PageFetcher>, SessionError> {
        let fetcher = ReqwestFetcher::new(self.settings.clone());
        // Building a client up front surfaces TLS or resolver setup failures here.
        fetcher
            .build_client(Arc::default())
            .map_err(|err| SessionError::Startup(err.to_string()))?;
        Ok(Arc::new(fetcher))
    }
}

/// A page as it looked once the settle wait elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    pub url: String,
    pub html: String,
}

impl LoadedPage {
    pub fn parse(&self) -> HtmlPage {
        HtmlPage::parse(&self.html, &self.url)
    }
}

/// One run's navigation handle. Owned by a single run and used by one fetch at a time.
pub struct BrowserSession {
    fetcher: Arc<dyn PageFetcher>,
    settle: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl BrowserSession {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settle: Duration, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            settle,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Loads `url`, then waits for the page to settle.
    ///
    /// Cancellation is checked before the load and after the settle wait; a
    /// load already in flight runs to completion.
    pub async fn navigate(&self, url: &str) -> Result<LoadedPage, NavigateError> {
        if self.is_cancelled() {
            return Err(NavigateError::Cancelled);
        }
        let output = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| NavigateError::Load {
                url: url.to_string(),
                source,
            })?;
        let decoded = decode_body(&output.bytes, output.metadata.content_type.as_deref());
        forge_debug!(
            "loaded {} ({} bytes, {})",
            output.metadata.final_url,
            output.metadata.byte_len,
            decoded.encoding
        );

        if !self.settle.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settle) => {}
            }
        }
        if self.is_cancelled() {
            return Err(NavigateError::Cancelled);
        }

        Ok(LoadedPage {
            url: output.metadata.final_url,
            html: decoded.text,
        })
    }

    /// Releases the underlying fetcher. Returns `false` if it was already released.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.fetcher.close();
        forge_info!("browser session closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, FetchMetadata, FetchOutput};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct StaticFetcher {
        closes: AtomicUsize,
        fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(FetchError::new(FailureKind::HttpStatus(500), "boom"));
            }
            Ok(FetchOutput {
                bytes: b"<p>hi</p>".to_vec(),
                metadata: FetchMetadata {
                    original_url: url.to_string(),
                    final_url: format!("{url}#final"),
                    redirect_count: 0,
                    content_type: Some("text/html; charset=utf-8".to_string()),
                    byte_len: 9,
                },
            })
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn navigate_returns_decoded_page() {
        let fetcher = Arc::new(StaticFetcher::default());
        let session = BrowserSession::new(fetcher.clone(), Duration::ZERO, CancellationToken::new());
        let page = session.navigate("https://a.example/").await.unwrap();
        assert_eq!(page.url, "https://a.example/#final");
        assert_eq!(page.html, "<p>hi</p>");
    }

    #[tokio::test]
    async fn cancelled_session_does_not_fetch() {
        let fetcher = Arc::new(StaticFetcher::default());
        let cancel = CancellationToken::new();
        let session = BrowserSession::new(fetcher.clone(), Duration::ZERO, cancel.clone());
        cancel.cancel();
        let err = session.navigate("https://a.example/").await.unwrap_err();
        assert_eq!(err, NavigateError::Cancelled);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_settle_wait() {
        let fetcher = Arc::new(StaticFetcher::default());
        let cancel = CancellationToken::new();
        let session = BrowserSession::new(fetcher, Duration::from_secs(60), cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = tokio::time::timeout(Duration::from_secs(5), session.navigate("https://a.example/"))
            .await
            .expect("settle wait should be interrupted")
            .unwrap_err();
        assert_eq!(err, NavigateError::Cancelled);
    }

    #[tokio::test]
    async fn load_failure_names_the_url() {
        let session = BrowserSession::new(
            Arc::new(StaticFetcher::default()),
            Duration::ZERO,
            CancellationToken::new(),
        );
        let err = session.navigate("https://broken.example/").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not load https://broken.example/: http status 500: boom"
        );
    }

    #[test]
    fn close_releases_fetcher_once() {
        let fetcher = Arc::new(StaticFetcher::default());
        let session = BrowserSession::new(fetcher.clone(), Duration::ZERO, CancellationToken::new());
        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert_eq!(fetcher.closes.load(Ordering::SeqCst), 1);
    }
}
