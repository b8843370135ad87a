use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::endpoint::{Connector, Endpoint};
use crate::mash::Mash;
use crate::model::{validate_time_range, RawPoint, StatPoint, StreamId, Version};
use crate::options::ConnectOptions;
use crate::retry::RetryDispatcher;
use crate::router::Router;
use crate::stream::QueryStream;
use crate::wire::GrpcConnector;
use crate::Error;

/// Public entry point. Owns the routing table, the endpoint cache, and the
/// retry policy; every operation below is a thin, validating façade over
/// `RetryDispatcher`.
#[derive(Clone)]
pub struct Handle {
    dispatcher: Arc<RetryDispatcher>,
}

impl Handle {
    /// Connects to the cluster by trying each of `addresses` in turn until
    /// one answers `Info()`, seeding the initial routing table from its
    /// response. Fails with `NoReachable` if none do. Uses
    /// `ConnectOptions::default()`; see `connect_with_options` to tune dial
    /// timeouts, the resync deadline, the retry budget, or the streaming
    /// channel capacity.
    pub async fn connect(addresses: Vec<String>) -> Result<Handle, Error> {
        Handle::connect_with_options(addresses, ConnectOptions::default()).await
    }

    /// As `connect`, but with explicit `ConnectOptions`.
    pub async fn connect_with_options(
        addresses: Vec<String>,
        options: ConnectOptions,
    ) -> Result<Handle, Error> {
        let connector = Arc::new(GrpcConnector::new(options.dial_timeout));
        Handle::connect_inner(addresses, connector, options).await
    }

    /// As `connect`, but dials through a caller-supplied `Connector` --
    /// the seam integration tests use to substitute an in-memory cluster.
    /// Uses `ConnectOptions::default()`; a custom `Connector` doesn't need
    /// `dial_timeout` (it's meaningless for, e.g., an in-memory fake), but
    /// the resync deadline and retry budget still apply.
    pub async fn connect_with(
        addresses: Vec<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<Handle, Error> {
        Handle::connect_inner(addresses, connector, ConnectOptions::default()).await
    }

    #[tracing::instrument(skip(connector, options), err(level = tracing::Level::WARN))]
    async fn connect_inner(
        addresses: Vec<String>,
        connector: Arc<dyn Connector>,
        options: ConnectOptions,
    ) -> Result<Handle, Error> {
        if addresses.is_empty() {
            return Err(Error::InvalidArguments(
                "at least one seed address is required".to_string(),
            ));
        }

        for address in &addresses {
            let transport = match connector.connect(std::slice::from_ref(address)).await {
                Ok(t) => t,
                Err(error) => {
                    tracing::debug!(address, %error, "seed address unreachable, trying next");
                    continue;
                }
            };
            let mash = match transport.info().await {
                Ok(m) => m,
                Err(error) => {
                    tracing::debug!(address, %error, "seed address did not answer info, trying next");
                    continue;
                }
            };
            tracing::debug!(address, revision = mash.revision(), "seeded routing table");
            // The seed connection we just used for `Info()` is already live;
            // if it belongs to a member the fresh MASH names, seed the cache
            // with it so the first real operation against that member
            // doesn't pay for a second dial.
            let seeded_member = mash
                .members()
                .find(|m| m.addresses.iter().any(|a| a == address))
                .cloned();
            let router = Arc::new(Router::with_options(mash, connector.clone(), &options));
            if let Some(member) = seeded_member {
                router
                    .cache()
                    .insert(Endpoint::new(member.hash, member.addresses, transport));
            }
            let dispatcher = Arc::new(RetryDispatcher::with_options(router, &options));
            return Ok(Handle { dispatcher });
        }

        Err(Error::NoReachable)
    }

    /// Closes every cached connection. Idempotent; safe to call more than
    /// once or concurrently with in-flight operations, which simply fail
    /// with `Disconnected` from that point on. Returns the last non-nil
    /// error observed while closing, if any.
    pub fn disconnect(&self) -> Option<Error> {
        tracing::debug!("disconnecting handle");
        self.dispatcher.router().disconnect()
    }

    /// The routing table this handle currently holds, mostly useful for
    /// diagnostics and tests.
    pub fn current_mash(&self) -> Arc<Mash> {
        self.dispatcher.router().current_mash()
    }

    pub async fn create(
        &self,
        stream_id: StreamId,
        collection: String,
        tags: HashMap<String, String>,
        annotation: bytes::Bytes,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        if collection.is_empty() {
            return Err(Error::InvalidArguments(
                "collection must not be empty".to_string(),
            ));
        }
        self.dispatcher
            .dispatch_unary(&stream_id, cancel.clone(), |endpoint| {
                let collection = collection.clone();
                let tags = tags.clone();
                let annotation = annotation.clone();
                let cancel = cancel.clone();
                async move {
                    endpoint
                        .transport()
                        .create(stream_id, collection, tags, annotation, cancel)
                        .await
                }
            })
            .await
    }

    pub async fn insert(
        &self,
        stream_id: StreamId,
        points: Vec<RawPoint>,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        if points.is_empty() {
            return Err(Error::InvalidArguments(
                "points must not be empty".to_string(),
            ));
        }
        for point in &points {
            validate_time_range(point.time)?;
        }
        self.dispatcher
            .dispatch_unary(&stream_id, cancel.clone(), |endpoint| {
                let points = points.clone();
                let cancel = cancel.clone();
                async move { endpoint.transport().insert(stream_id, &points, cancel).await }
            })
            .await
    }

    pub async fn insert_tv(
        &self,
        stream_id: StreamId,
        times: Vec<i64>,
        values: Vec<f64>,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        if times.len() != values.len() {
            return Err(Error::InvalidArguments(
                "times and values must be the same length".to_string(),
            ));
        }
        if times.is_empty() {
            return Err(Error::InvalidArguments(
                "times and values must not be empty".to_string(),
            ));
        }
        for &time in &times {
            validate_time_range(time)?;
        }
        self.dispatcher
            .dispatch_unary(&stream_id, cancel.clone(), |endpoint| {
                let times = times.clone();
                let values = values.clone();
                let cancel = cancel.clone();
                async move {
                    endpoint
                        .transport()
                        .insert_tv(stream_id, &times, &values, cancel)
                        .await
                }
            })
            .await
    }

    pub async fn nearest(
        &self,
        stream_id: StreamId,
        time: i64,
        version: Version,
        backward: bool,
        cancel: CancellationToken,
    ) -> Result<(RawPoint, Version), Error> {
        validate_time_range(time)?;
        self.dispatcher
            .dispatch_unary(&stream_id, cancel.clone(), |endpoint| {
                let cancel = cancel.clone();
                async move {
                    endpoint
                        .transport()
                        .nearest(stream_id, time, version, backward, cancel)
                        .await
                }
            })
            .await
    }

    pub fn raw_values(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        version: Version,
        cancel: CancellationToken,
    ) -> Result<QueryStream<RawPoint>, Error> {
        validate_time_range(start)?;
        validate_time_range(end)?;
        if start >= end {
            return Err(Error::InvalidArguments(
                "start must be strictly before end".to_string(),
            ));
        }
        Ok(self.dispatcher.dispatch_stream(stream_id, move |endpoint| {
            endpoint
                .transport()
                .raw_values(stream_id, start, end, version, cancel.clone())
        }))
    }

    pub fn windows(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        width: i64,
        depth: u32,
        version: Version,
        cancel: CancellationToken,
    ) -> Result<QueryStream<StatPoint>, Error> {
        validate_time_range(start)?;
        validate_time_range(end)?;
        if start >= end {
            return Err(Error::InvalidArguments(
                "start must be strictly before end".to_string(),
            ));
        }
        if width <= 0 {
            return Err(Error::InvalidArguments(
                "width must be positive".to_string(),
            ));
        }
        Ok(self.dispatcher.dispatch_stream(stream_id, move |endpoint| {
            endpoint
                .transport()
                .windows(stream_id, start, end, width, depth, version, cancel.clone())
        }))
    }
}
