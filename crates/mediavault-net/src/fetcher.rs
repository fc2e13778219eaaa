//! Classified-retry acquisition.

use std::ops::RangeInclusive;

use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{FetchError, FetchResult},
    session::{SessionFactory, SessionProvider},
    traits::{ByteStream, Payload},
    types::{Headers, RetryPolicy},
};

/// Outcome of a multi-page acquisition batch.
///
/// Per-page failures are isolated and accumulated; one page exhausting
/// its retries never aborts the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub errors: Vec<PageFailure>,
}

impl BatchReport {
    fn record_failure(&mut self, page: u32, error: FetchError) {
        self.failed += 1;
        self.errors.push(PageFailure { page, error });
    }
}

/// One failed page in a batch.
#[derive(Debug)]
pub struct PageFailure {
    pub page: u32,
    pub error: FetchError,
}

/// HTTP acquisition with failure-class-specific retry and session
/// recovery.
///
/// Transient failures (timeout, connection, 5xx) back off with
/// `base_delay * 2^(attempt-1)`. A 403 invalidates and recreates the
/// session before retrying, still bounded by `max_retries`. Any other
/// 4xx and undecodable payloads fail immediately.
pub struct RetryingFetcher<F: SessionFactory> {
    session: SessionProvider<F>,
    policy: RetryPolicy,
    headers: Option<Headers>,
}

impl<F: SessionFactory> RetryingFetcher<F> {
    pub fn new(factory: F, policy: RetryPolicy) -> Self {
        Self {
            session: SessionProvider::new(factory),
            policy,
            headers: None,
        }
    }

    /// Attach headers sent with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: Option<Headers>) -> Self {
        self.headers = headers;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with the full retry policy, buffering the body.
    ///
    /// # Errors
    ///
    /// The final classified error, or [`FetchError::RetryExhausted`]
    /// once `max_retries` attempts have failed with retryable errors.
    pub async fn fetch(&self, url: &Url) -> FetchResult<Payload> {
        self.retry_loop(url, |net, url, headers| async move {
            net.get(url, headers).await
        })
        .await
    }

    /// GET `url` with retries on the initial response, returning a
    /// body stream and the Content-Length when known.
    ///
    /// Only establishing the response is retried; a stream that fails
    /// mid-body surfaces through the stream itself.
    ///
    /// # Errors
    ///
    /// Same policy as [`fetch`](Self::fetch).
    pub async fn fetch_stream(&self, url: &Url) -> FetchResult<(ByteStream, Option<u64>)> {
        self.retry_loop(url, |net, url, headers| async move {
            net.stream(url, headers).await
        })
        .await
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// An unexpected Content-Type is logged as a warning but does not
    /// by itself fail the fetch; only an empty body or an actual parse
    /// failure does, and neither is retried.
    ///
    /// # Errors
    ///
    /// [`FetchError::PayloadInvalid`] for empty or undecodable bodies,
    /// otherwise as [`fetch`](Self::fetch).
    pub async fn fetch_json(&self, url: &Url) -> FetchResult<Value> {
        let payload = self.fetch(url).await?;

        if payload.bytes.is_empty() {
            return Err(FetchError::PayloadInvalid(format!(
                "empty response body from {url}"
            )));
        }

        if let Some(content_type) = &payload.content_type {
            if !content_type.to_ascii_lowercase().contains("json") {
                warn!(%url, content_type, "response Content-Type is not JSON");
            }
        }

        serde_json::from_slice(&payload.bytes).map_err(|e| {
            FetchError::PayloadInvalid(format!("JSON decode failed for {url}: {e}"))
        })
    }

    /// Fetch an inclusive page range, feeding each decoded page to
    /// `sink`. Page failures (including sink failures) are recorded and
    /// the batch continues. A fixed inter-page delay is applied between
    /// successive pages regardless of outcome, to stay under rate
    /// limits. Cancellation stops the batch between pages.
    pub async fn fetch_pages<U, S>(
        &self,
        mut page_url: U,
        pages: RangeInclusive<u32>,
        mut sink: S,
        cancel: &CancellationToken,
    ) -> BatchReport
    where
        U: FnMut(u32) -> Url,
        S: FnMut(u32, Value) -> Result<(), String>,
    {
        let last = *pages.end();
        let mut report = BatchReport {
            total: pages.clone().count(),
            ..BatchReport::default()
        };

        for page in pages {
            if cancel.is_cancelled() {
                debug!(page, "page batch cancelled");
                break;
            }

            let url = page_url(page);
            match self.fetch_json(&url).await {
                Ok(value) => match sink(page, value) {
                    Ok(()) => {
                        report.success += 1;
                        debug!(page, "page processed");
                    }
                    Err(msg) => {
                        warn!(page, error = %msg, "page sink failed");
                        report.record_failure(
                            page,
                            FetchError::PayloadInvalid(format!("page sink failed: {msg}")),
                        );
                    }
                },
                Err(error) => {
                    warn!(page, %error, "page fetch failed");
                    report.record_failure(page, error);
                }
            }

            if page < last {
                sleep(self.policy.page_delay).await;
            }
        }

        info!(
            total = report.total,
            success = report.success,
            failed = report.failed,
            "page batch finished"
        );
        report
    }

    /// Expose the session for callers that need to force a reset.
    pub fn session(&self) -> &SessionProvider<F> {
        &self.session
    }

    async fn retry_loop<T, Op, Fut>(&self, url: &Url, op: Op) -> FetchResult<T>
    where
        Op: Fn(std::sync::Arc<dyn crate::traits::Net>, Url, Option<Headers>) -> Fut,
        Fut: std::future::Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let net = self.session.get()?;
            match op(net, url.clone(), self.headers.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() {
                        debug!(%url, %error, "fetch failed, not retryable");
                        return Err(error);
                    }
                    if error.needs_session_reset() {
                        warn!(%url, "authorization challenge, recreating session");
                        self.session.invalidate();
                    }

                    attempt += 1;
                    if attempt >= self.policy.max_retries {
                        warn!(%url, attempts = attempt, %error, "retries exhausted");
                        return Err(FetchError::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(%url, attempt, ?delay, %error, "retrying after backoff");
                    sleep(delay).await;
                }
            }
        }
    }
}
