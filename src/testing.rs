//! In-memory test doubles for `Transport`/`Connector`. Lets `Router`,
//! `EndpointCache`, and `RetryDispatcher` be exercised without a live
//! cluster, the way gazette's own test suite (`tests/dekaf.rs`) stands up a
//! fake broker rather than requiring a real one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::endpoint::{Connector, Transport};
use crate::mash::Mash;
use crate::model::{RawPoint, StatPoint, StreamId, Version};
use crate::stream::{QuerySink, QueryStream};
use crate::Error;

/// Scripted behavior for one fake cluster member, addressed in tests by its
/// hash formatted as a decimal string (`FakeConnector` parses it back out).
pub(crate) struct FakeNode {
    pub(crate) info: Mash,
    pub(crate) fail_with: Option<Error>,
    pub(crate) raw_values: Vec<RawPoint>,
    /// Artificial delay before `info()` resolves, used to exercise
    /// `Router::resync_mash`'s per-probe deadline.
    pub(crate) info_delay: Option<Duration>,
}

impl FakeNode {
    pub(crate) fn new(info: Mash) -> Self {
        FakeNode {
            info,
            fail_with: None,
            raw_values: Vec::new(),
            info_delay: None,
        }
    }
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::WrongEndpoint => Error::WrongEndpoint,
        Error::ClusterDegraded => Error::ClusterDegraded,
        Error::Disconnected => Error::Disconnected,
        other => Error::Protocol(other.to_string()),
    }
}

pub(crate) struct FakeTransport {
    pub(crate) calls: Arc<Mutex<u32>>,
    node: Arc<Mutex<FakeNode>>,
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn info(&self) -> Result<Mash, Error> {
        let (info, delay) = {
            let n = self.node.lock().unwrap();
            (n.info.clone(), n.info_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(info)
    }

    async fn create(
        &self,
        _stream_id: StreamId,
        _collection: String,
        _tags: HashMap<String, String>,
        _annotation: bytes::Bytes,
        _cancel: CancellationToken,
    ) -> Result<(), Error> {
        self.bump_and_maybe_fail()
    }

    async fn insert(
        &self,
        _stream_id: StreamId,
        _points: &[RawPoint],
        _cancel: CancellationToken,
    ) -> Result<(), Error> {
        self.bump_and_maybe_fail()
    }

    async fn insert_tv(
        &self,
        _stream_id: StreamId,
        _times: &[i64],
        _values: &[f64],
        _cancel: CancellationToken,
    ) -> Result<(), Error> {
        self.bump_and_maybe_fail()
    }

    async fn nearest(
        &self,
        _stream_id: StreamId,
        _time: i64,
        _version: Version,
        _backward: bool,
        _cancel: CancellationToken,
    ) -> Result<(RawPoint, Version), Error> {
        self.bump_and_maybe_fail()?;
        Ok((RawPoint { time: 0, value: 0.0 }, 1))
    }

    fn raw_values(
        &self,
        _stream_id: StreamId,
        _start: i64,
        _end: i64,
        _version: Version,
        _cancel: CancellationToken,
    ) -> QueryStream<RawPoint> {
        let (sink, stream) = QuerySink::channel(8);
        *self.calls.lock().unwrap() += 1;
        let node = self.node.clone();
        tokio::spawn(async move {
            let (points, fail_with) = {
                let n = node.lock().unwrap();
                (n.raw_values.clone(), n.fail_with.as_ref().map(clone_error))
            };
            for p in points {
                if !sink.send(p).await {
                    return;
                }
            }
            sink.finish(1, fail_with);
        });
        stream
    }

    fn windows(
        &self,
        _stream_id: StreamId,
        _start: i64,
        _end: i64,
        _width: i64,
        _depth: u32,
        _version: Version,
        _cancel: CancellationToken,
    ) -> QueryStream<StatPoint> {
        let (sink, stream) = QuerySink::channel(8);
        *self.calls.lock().unwrap() += 1;
        sink.finish(1, None);
        stream
    }
}

impl FakeTransport {
    fn bump_and_maybe_fail(&self) -> Result<(), Error> {
        *self.calls.lock().unwrap() += 1;
        match self.node.lock().unwrap().fail_with.as_ref() {
            Some(e) => Err(clone_error(e)),
            None => Ok(()),
        }
    }
}

/// Dials addresses that are themselves a node's hash formatted as text --
/// keeps the fake's wiring trivial instead of reimplementing DNS.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    pub(crate) nodes: Arc<Mutex<HashMap<u32, Arc<Mutex<FakeNode>>>>>,
    pub(crate) dial_calls: Arc<Mutex<HashMap<u32, u32>>>,
}

impl FakeConnector {
    pub(crate) fn add_node(&self, hash: u32, node: FakeNode) {
        self.nodes
            .lock()
            .unwrap()
            .insert(hash, Arc::new(Mutex::new(node)));
    }

    pub(crate) fn dial_count(&self, hash: u32) -> u32 {
        *self.dial_calls.lock().unwrap().get(&hash).unwrap_or(&0)
    }

    pub(crate) fn fail_node(&self, hash: u32, err: Error) {
        if let Some(node) = self.nodes.lock().unwrap().get(&hash) {
            node.lock().unwrap().fail_with = Some(err);
        }
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, addresses: &[String]) -> Result<Arc<dyn Transport>, Error> {
        let hash: u32 = addresses
            .first()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| Error::Unreachable("fake address must be a node hash".to_string()))?;
        let node = self
            .nodes
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or_else(|| Error::Unreachable(format!("no fake node for hash {hash}")))?;
        *self.dial_calls.lock().unwrap().entry(hash).or_insert(0) += 1;
        Ok(Arc::new(FakeTransport {
            calls: Arc::new(Mutex::new(0)),
            node,
        }))
    }
}
