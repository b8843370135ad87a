use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::model::Version;
use crate::Error;

/// The finite, lazily-produced half of a query's three-part response. Items
/// stop arriving once the server's stream ends or the caller's
/// `CancellationToken` fires; either way `version` and `error` resolve only
/// after this stream is exhausted.
pub struct DataStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> DataStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        DataStream { rx }
    }
}

impl<T> Stream for DataStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Resolves once, after `DataStream` has terminated, to the version the
/// query was actually evaluated at.
pub struct VersionFuture {
    rx: oneshot::Receiver<Version>,
}

impl VersionFuture {
    pub(crate) fn new(rx: oneshot::Receiver<Version>) -> Self {
        VersionFuture { rx }
    }
}

impl Future for VersionFuture {
    type Output = Version;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Version> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(v),
            // The sender side always sends before dropping; a closed channel
            // with nothing sent only happens if the dispatch task panicked.
            Poll::Ready(Err(_)) => Poll::Ready(0),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Resolves once, after `DataStream` has terminated, to the terminal error
/// for the query -- `None` if it completed cleanly.
pub struct ErrorFuture {
    rx: oneshot::Receiver<Option<Error>>,
}

impl ErrorFuture {
    pub(crate) fn new(rx: oneshot::Receiver<Option<Error>>) -> Self {
        ErrorFuture { rx }
    }
}

impl Future for ErrorFuture {
    type Output = Option<Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Error>> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(e)) => Poll::Ready(e),
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The full three-part streaming response: a lazy data sequence plus the two
/// single-shot terminal signals, guaranteed to resolve strictly after the
/// data sequence has terminated.
pub struct QueryStream<T> {
    pub data: DataStream<T>,
    pub version: VersionFuture,
    pub error: ErrorFuture,
}

/// Producer-side handle used by the dispatch loop to fill in a `QueryStream`.
/// `finish` must be the last thing called: it sends the terminal signals in
/// the order the contract requires (data channel dropped by `tx` going out
/// of scope, then version, then error).
pub(crate) struct QuerySink<T> {
    tx: mpsc::Sender<T>,
    version_tx: Option<oneshot::Sender<Version>>,
    error_tx: Option<oneshot::Sender<Option<Error>>>,
}

impl<T> QuerySink<T> {
    pub(crate) fn channel(buffer: usize) -> (Self, QueryStream<T>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (version_tx, version_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        (
            QuerySink {
                tx,
                version_tx: Some(version_tx),
                error_tx: Some(error_tx),
            },
            QueryStream {
                data: DataStream::new(rx),
                version: VersionFuture::new(version_rx),
                error: ErrorFuture::new(error_rx),
            },
        )
    }

    /// Best-effort send: a caller that dropped `DataStream` early (or whose
    /// receive buffer is momentarily full past cancellation) just loses this
    /// item, per the "partial delivery is allowed" contract.
    pub(crate) async fn send(&self, item: T) -> bool {
        self.tx.send(item).await.is_ok()
    }

    pub(crate) fn finish(mut self, version: Version, error: Option<Error>) {
        drop(self.tx);
        if let Some(tx) = self.version_tx.take() {
            let _ = tx.send(version);
        }
        if let Some(tx) = self.error_tx.take() {
            let _ = tx.send(error);
        }
    }
}
