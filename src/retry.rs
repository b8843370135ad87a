use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use exponential_backoff::Backoff;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::model::StreamId;
use crate::options::ConnectOptions;
use crate::router::Router;
use crate::stream::{QuerySink, QueryStream};
use crate::Error;

/// Upper bound on internal retries for a single logical operation, after
/// which a persistent `WrongEndpoint` is surfaced to the caller rather than
/// retried forever against a cluster that can't converge. This is the
/// default `ConnectOptions::retry_budget`; `RetryDispatcher::with_options`
/// can override it per `Handle`.
pub const MAX_RETRIES: u32 = 4;

const DEFAULT_STREAM_BUFFER: usize = 16;

const BACKOFF_BASE: Duration = Duration::from_millis(20);
const BACKOFF_CAP: Duration = Duration::from_millis(320);

fn new_backoff(retry_budget: u32) -> Backoff {
    Backoff::new(retry_budget, BACKOFF_BASE, Some(BACKOFF_CAP))
}

/// Wraps `Router` with the retry-on-`WrongEndpoint` policy shared by every
/// public operation: resolve a stream id to an endpoint, run the request,
/// and if it fails because the contacted member doesn't own the stream,
/// resync the routing table and try again, bounded by `MAX_RETRIES`.
/// Modeled on gazette's `journal::read` retry loop, generalized to also
/// cover unary calls.
pub struct RetryDispatcher {
    router: Arc<Router>,
    retry_budget: u32,
    stream_buffer: usize,
    backoff: Backoff,
}

impl RetryDispatcher {
    pub fn new(router: Arc<Router>) -> Self {
        RetryDispatcher {
            router,
            retry_budget: MAX_RETRIES,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            backoff: new_backoff(MAX_RETRIES),
        }
    }

    /// As `new`, but with the retry budget and streaming channel capacity
    /// taken from `ConnectOptions` -- the seam `Handle::connect_with_options`
    /// uses.
    pub fn with_options(router: Arc<Router>, options: &ConnectOptions) -> Self {
        RetryDispatcher {
            router,
            retry_budget: options.retry_budget,
            stream_buffer: options.stream_buffer,
            backoff: new_backoff(options.retry_budget),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Jittered delay before a redispatch, via the same `exponential_backoff::Backoff`
    /// policy `journal-client`'s `ExponentialBackoff` wraps, so a wave of
    /// callers that all hit `WrongEndpoint` at the same moment don't all
    /// redispatch in lockstep. `attempt` is 0-based; `Backoff::next` is
    /// 1-based, and returns `None` once past the configured retry budget, in
    /// which case the cap is used directly.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff.next(attempt + 1).unwrap_or(BACKOFF_CAP)
    }

    /// Runs `op` against the endpoint that owns `stream_id`, retrying on
    /// `WrongEndpoint` up to the configured retry budget. `cancel` is
    /// honored between every await point so a caller can abort a hanging
    /// dial, request, resync, or backoff sleep promptly.
    #[tracing::instrument(level = "debug", skip(self, op, cancel), err(level = tracing::Level::DEBUG))]
    pub async fn dispatch_unary<T, F, Fut>(
        &self,
        stream_id: &StreamId,
        cancel: CancellationToken,
        op: F,
    ) -> Result<T, Error>
    where
        F: Fn(crate::endpoint::Endpoint) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut last_err = Error::NoEndpointsReachable;
        let retry_budget = self.retry_budget;
        for attempt in 0..=retry_budget {
            let revision = self.router.current_mash().revision();
            let endpoint = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.router.endpoint_for(stream_id) => result?,
            };
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = op(endpoint.clone()) => result,
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_wrong_endpoint() && attempt < retry_budget => {
                    tracing::debug!(
                        attempt,
                        hash = endpoint.hash(),
                        "wrong endpoint, resyncing and retrying"
                    );
                    self.router.evict(endpoint.hash());
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        result = self.router.resync_mash(revision) => result?,
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(self.backoff_delay(attempt)) => {}
                    };
                    last_err = e;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!("unary retry budget exhausted, surfacing wrong-endpoint error");
        Err(last_err)
    }

    /// Runs a streaming `op` against the endpoint that owns `stream_id`.
    /// `op` is called once per attempt and must return a fresh `QueryStream`
    /// each time -- the inner stream is driven to completion on a spawned
    /// task that forwards items to the caller-visible stream this function
    /// returns. A `WrongEndpoint` terminal error triggers an invisible
    /// resync-and-retry only if no item has been forwarded yet; once the
    /// caller has seen data, the same error becomes terminal, since a
    /// retried request could not be distinguished from a duplicate by the
    /// caller downstream.
    pub fn dispatch_stream<T, F>(self: &Arc<Self>, stream_id: StreamId, op: F) -> QueryStream<T>
    where
        T: Send + 'static,
        F: Fn(crate::endpoint::Endpoint) -> QueryStream<T> + Send + Sync + 'static,
    {
        let (sink, stream) = QuerySink::channel(self.stream_buffer);
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run_stream(stream_id, op, sink).await;
        });
        stream
    }

    #[tracing::instrument(level = "debug", skip(self, op, sink))]
    async fn run_stream<T, F>(&self, stream_id: StreamId, op: F, sink: QuerySink<T>)
    where
        T: Send + 'static,
        F: Fn(crate::endpoint::Endpoint) -> QueryStream<T>,
    {
        let mut yielded_any = false;
        let retry_budget = self.retry_budget;
        for attempt in 0..=retry_budget {
            let revision = self.router.current_mash().revision();
            let endpoint = match self.router.endpoint_for(&stream_id).await {
                Ok(e) => e,
                Err(e) => return sink.finish(0, Some(e)),
            };

            let inner = op(endpoint.clone());
            let QueryStream {
                mut data,
                version,
                error,
            } = inner;
            while let Some(item) = data.next().await {
                if sink.send(item).await {
                    yielded_any = true;
                } else {
                    // Caller dropped the data stream; stop pulling from the
                    // upstream and let its task wind down on its own.
                    return;
                }
            }

            let version = version.await;
            let error = error.await;

            match error {
                None => return sink.finish(version, None),
                Some(e) if e.is_wrong_endpoint() && !yielded_any && attempt < retry_budget => {
                    tracing::debug!(
                        attempt,
                        hash = endpoint.hash(),
                        "wrong endpoint before any item yielded, resyncing and retrying"
                    );
                    self.router.evict(endpoint.hash());
                    if self.router.resync_mash(revision).await.is_err() {
                        return sink.finish(version, Some(Error::NoEndpointsReachable));
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                    continue;
                }
                Some(e) if e.is_wrong_endpoint() => {
                    tracing::warn!(
                        attempt,
                        hash = endpoint.hash(),
                        yielded_any,
                        "wrong endpoint after data already yielded, surfacing rather than retrying"
                    );
                    return sink.finish(version, Some(e));
                }
                Some(e) => return sink.finish(version, Some(e)),
            }
        }
        tracing::warn!("stream retry budget exhausted, surfacing wrong-endpoint error");
        sink.finish(0, Some(Error::WrongEndpoint));
    }
}
