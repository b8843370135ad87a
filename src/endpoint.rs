use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::mash::Mash;
use crate::model::{RawPoint, StatPoint, StreamId, Version};
use crate::stream::QueryStream;
use crate::Error;

/// The seam between routing/dispatch and the wire. A real cluster member is
/// reached through `wire::GrpcTransport`; unit tests substitute an in-memory
/// fake. Mirrors the role gazette's `Router` gives to its `Channel` --
/// something the cache can dial once and reuse -- generalized to a trait so
/// it can be faked without a live server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the current MASH snapshot from this member.
    async fn info(&self) -> Result<Mash, Error>;

    async fn create(
        &self,
        stream_id: StreamId,
        collection: String,
        tags: HashMap<String, String>,
        annotation: bytes::Bytes,
        cancel: CancellationToken,
    ) -> Result<(), Error>;

    async fn insert(
        &self,
        stream_id: StreamId,
        points: &[RawPoint],
        cancel: CancellationToken,
    ) -> Result<(), Error>;

    async fn insert_tv(
        &self,
        stream_id: StreamId,
        times: &[i64],
        values: &[f64],
        cancel: CancellationToken,
    ) -> Result<(), Error>;

    async fn nearest(
        &self,
        stream_id: StreamId,
        time: i64,
        version: Version,
        backward: bool,
        cancel: CancellationToken,
    ) -> Result<(RawPoint, Version), Error>;

    fn raw_values(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        version: Version,
        cancel: CancellationToken,
    ) -> QueryStream<RawPoint>;

    fn windows(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        width: i64,
        depth: u32,
        version: Version,
        cancel: CancellationToken,
    ) -> QueryStream<StatPoint>;
}

/// Dials a member's candidate addresses down to a live `Transport`. Addresses
/// are tried in order; the first to yield a usable channel wins. Kept
/// distinct from `Transport` so production dialing (tonic/TLS) and tests
/// (an in-memory map) can each supply their own strategy without touching
/// `EndpointCache`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addresses: &[String]) -> Result<Arc<dyn Transport>, Error>;
}

/// A dialed cluster member: the hash the MASH snapshot identified it by, the
/// addresses it was reached at, and the live transport.
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) hash: u32,
    pub(crate) addresses: Vec<String>,
    pub(crate) transport: Arc<dyn Transport>,
}

impl Endpoint {
    pub(crate) fn new(hash: u32, addresses: Vec<String>, transport: Arc<dyn Transport>) -> Self {
        Endpoint {
            hash,
            addresses,
            transport,
        }
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("hash", &self.hash)
            .field("addresses", &self.addresses)
            .finish()
    }
}
