use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::EndpointCache;
use crate::endpoint::{Connector, Endpoint};
use crate::mash::Mash;
use crate::model::StreamId;
use crate::options::ConnectOptions;
use crate::Error;

/// Deadline for each `Info()` probe `resync_mash` issues, per
/// `ConnectOptions::default`. Named here too so `Router::new` -- used
/// throughout this crate's own tests, which don't go through `Handle` --
/// doesn't need every call site threading an explicit deadline.
const DEFAULT_RESYNC_DEADLINE: Duration = Duration::from_secs(2);

/// Composes a `Mash` snapshot with an `EndpointCache` and keeps the snapshot
/// current. Reads of the snapshot never block on a writer: `ArcSwap` gives
/// every caller a lock-free `Arc<Mash>` load, while the (rare) resync path
/// is serialized by a dedicated async mutex so concurrent resync callers
/// coalesce into a single `Info()` round trip rather than racing. Grounded
/// in `spark-router`'s `ArcSwap`-backed routing table, generalized from
/// path matching to rendezvous-hash placement.
pub struct Router {
    mash: ArcSwap<Mash>,
    cache: EndpointCache,
    connector: Arc<dyn Connector>,
    resync: AsyncMutex<()>,
    resync_deadline: Duration,
}

impl Router {
    pub fn new(mash: Mash, connector: Arc<dyn Connector>) -> Self {
        Router::new_with_deadline(mash, connector, DEFAULT_RESYNC_DEADLINE)
    }

    /// As `new`, but with an explicit `Info()` probe deadline -- the seam
    /// `Handle::connect_with_options` uses to honor `ConnectOptions::resync_deadline`.
    pub fn new_with_deadline(mash: Mash, connector: Arc<dyn Connector>, resync_deadline: Duration) -> Self {
        Router {
            mash: ArcSwap::from_pointee(mash),
            cache: EndpointCache::new(connector.clone()),
            connector,
            resync: AsyncMutex::new(()),
            resync_deadline,
        }
    }

    pub fn with_options(mash: Mash, connector: Arc<dyn Connector>, options: &ConnectOptions) -> Self {
        Router::new_with_deadline(mash, connector, options.resync_deadline)
    }

    pub fn current_mash(&self) -> Arc<Mash> {
        self.mash.load_full()
    }

    pub fn cache(&self) -> &EndpointCache {
        &self.cache
    }

    /// Resolves `stream_id` against the current snapshot and returns a
    /// dialed `Endpoint` for its owner, dialing lazily via the cache. The
    /// common path for every stream-bound operation.
    pub async fn endpoint_for(&self, stream_id: &StreamId) -> Result<Endpoint, Error> {
        let mash = self.mash.load();
        let placement = mash.endpoint_for(stream_id).ok_or(Error::ClusterDegraded)?;
        self.cache
            .get_or_connect(placement.hash, &placement.addresses)
            .await
    }

    /// Identical policy to `endpoint_for` today; kept as a distinct name so
    /// a future read-preference policy (e.g. prefer a replica) can be
    /// introduced at this call site without touching callers that use
    /// `endpoint_for` for writes.
    pub async fn read_endpoint_for(&self, stream_id: &StreamId) -> Result<Endpoint, Error> {
        self.endpoint_for(stream_id).await
    }

    /// Resolves a member already known by hash (as opposed to a stream id
    /// that still needs placement) -- used by `resync_mash` to dial the
    /// members of the current MASH by their own identity.
    pub async fn endpoint_for_hash(&self, hash: u32) -> Result<Endpoint, Error> {
        let mash = self.mash.load();
        let member = mash.member_by_hash(hash).ok_or(Error::ClusterDegraded)?;
        self.cache
            .get_or_connect(member.hash, &member.addresses)
            .await
    }

    /// Returns any endpoint, without regard for ownership of a particular
    /// stream -- used to bootstrap calls (like `Create`) that aren't yet
    /// bound to a placement, or that the server accepts from any member. If
    /// the cache is empty, synthesizes a random stream id and resolves it
    /// through the normal placement function, so the member chosen is still
    /// a real owner under the active MASH rather than an arbitrary pick.
    pub async fn any_endpoint(&self) -> Result<Endpoint, Error> {
        if let Some(endpoint) = self.cache.any_open() {
            return Ok(endpoint);
        }
        self.endpoint_for(&StreamId::random()).await
    }

    /// Refreshes the routing table. `stale_revision` is the revision the
    /// caller observed when it decided the table needed refreshing; if
    /// another caller already installed something newer by the time this
    /// runs, the call is a no-op -- this is what coalesces concurrent
    /// resyncs triggered by the same wave of `WrongEndpoint` responses into
    /// one `Info()` round trip.
    #[tracing::instrument(skip(self))]
    pub async fn resync_mash(&self, stale_revision: u64) -> Result<(), Error> {
        let _guard = self.resync.lock().await;
        if self.mash.load().revision() > stale_revision {
            tracing::debug!(
                current = self.mash.load().revision(),
                "mash already advanced past stale revision, skipping resync"
            );
            return Ok(());
        }

        // Phase 1: every endpoint already in the cache is cheap to try and
        // needs no dial, so each one gets an `Info()` probe before this
        // falls through to fresh member dials at all.
        for endpoint in self.cache.all_open() {
            if self.try_info(&endpoint).await {
                return Ok(());
            }
        }

        // Phase 2: the cache is exhausted. Dial the members of the current
        // (possibly stale) MASH one at a time and probe each as it comes up.
        let member_hashes: Vec<u32> = self.mash.load().members().map(|m| m.hash).collect();
        for hash in member_hashes {
            let endpoint = match self.endpoint_for_hash(hash).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            if self.try_info(&endpoint).await {
                return Ok(());
            }
        }

        tracing::warn!("resync exhausted every candidate; no endpoint reachable");
        Err(Error::NoEndpointsReachable)
    }

    /// Issues one bounded `Info()` probe against `endpoint` and installs the
    /// response if it advances the current revision. Evicts `endpoint` from
    /// the cache on failure or timeout, so `resync_mash` won't try it twice
    /// across its two phases. Returns whether the probe succeeded.
    async fn try_info(&self, endpoint: &Endpoint) -> bool {
        match tokio::time::timeout(self.resync_deadline, endpoint.transport().info()).await {
            Ok(Ok(fresh)) => {
                let installed = fresh.revision() > self.mash.load().revision();
                if installed {
                    tracing::debug!(
                        from = endpoint.hash(),
                        revision = fresh.revision(),
                        "installed refreshed mash"
                    );
                    self.mash.store(Arc::new(fresh));
                }
                true
            }
            Ok(Err(error)) => {
                tracing::debug!(hash = endpoint.hash(), %error, "info probe failed during resync");
                self.cache.evict(endpoint.hash());
                false
            }
            Err(_elapsed) => {
                tracing::debug!(
                    hash = endpoint.hash(),
                    deadline = ?self.resync_deadline,
                    "info probe timed out during resync"
                );
                self.cache.evict(endpoint.hash());
                false
            }
        }
    }

    /// Evicts a cached endpoint proven stale by a `WrongEndpoint` response,
    /// so the next `endpoint_for` redials rather than reusing the dead
    /// channel.
    pub fn evict(&self, hash: u32) {
        self.cache.evict(hash);
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Closes every cached connection. Idempotent. Returns the last
    /// non-nil error observed while closing, if any.
    pub fn disconnect(&self) -> Option<Error> {
        self.cache.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mash::Member;
    use crate::model::StreamId;
    use crate::testing::{FakeConnector, FakeNode};

    fn member(hash: u32) -> Member {
        Member {
            hash,
            addresses: vec![hash.to_string()],
        }
    }

    #[tokio::test]
    async fn endpoint_for_picks_a_live_owner() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![member(1), member(2)]);
        connector.add_node(1, FakeNode::new(mash.clone()));
        connector.add_node(2, FakeNode::new(mash.clone()));
        let router = Router::new(mash, connector);

        let endpoint = router.endpoint_for(&StreamId::random()).await.unwrap();
        assert!(endpoint.hash() == 1 || endpoint.hash() == 2);
    }

    #[tokio::test]
    async fn resync_coalesces_concurrent_callers() {
        let connector = Arc::new(FakeConnector::default());
        let initial = Mash::new(1, vec![member(1)]);
        let refreshed = Mash::new(2, vec![member(1), member(2)]);
        connector.add_node(1, FakeNode::new(refreshed.clone()));
        connector.add_node(2, FakeNode::new(refreshed.clone()));
        let router = Arc::new(Router::new(initial, connector));

        // Warm the cache slot for member 1 so resync has something to reuse.
        router.any_endpoint().await.unwrap();

        let (a, b) = tokio::join!(router.resync_mash(1), router.resync_mash(1));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(router.current_mash().revision(), 2);
    }

    #[tokio::test]
    async fn resync_is_a_no_op_once_superseded() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(5, vec![member(1)]);
        connector.add_node(1, FakeNode::new(mash.clone()));
        let router = Router::new(mash, connector);

        // stale_revision (1) is already behind the router's current (5).
        router.resync_mash(1).await.unwrap();
        assert_eq!(router.current_mash().revision(), 5);
    }

    #[tokio::test]
    async fn resync_fails_when_nothing_is_reachable() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![]);
        let router = Router::new(mash, connector);
        let err = router.resync_mash(0).await.unwrap_err();
        assert!(matches!(err, Error::NoEndpointsReachable));
    }

    #[tokio::test(start_paused = true)]
    async fn resync_treats_a_slow_info_probe_as_a_failed_candidate() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![member(1), member(2)]);
        let mut slow = FakeNode::new(Mash::new(2, vec![member(1), member(2)]));
        slow.info_delay = Some(Duration::from_secs(5));
        connector.add_node(1, slow);
        connector.add_node(2, FakeNode::new(Mash::new(2, vec![member(1), member(2)])));
        let router = Router::new_with_deadline(mash, connector, Duration::from_secs(2));

        // Warm both cache slots so resync has two candidates to try; the
        // first (member 1) is too slow and should be skipped in favor of
        // member 2 rather than hanging for 5 seconds.
        router.endpoint_for_hash(1).await.unwrap();
        router.endpoint_for_hash(2).await.unwrap();

        router.resync_mash(0).await.unwrap();
        assert_eq!(router.current_mash().revision(), 2);
    }

    #[tokio::test]
    async fn endpoint_for_hash_dials_a_known_member() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![member(1), member(2)]);
        connector.add_node(1, FakeNode::new(mash.clone()));
        connector.add_node(2, FakeNode::new(mash.clone()));
        let router = Router::new(mash, connector);

        let endpoint = router.endpoint_for_hash(2).await.unwrap();
        assert_eq!(endpoint.hash(), 2);
    }

    #[tokio::test]
    async fn endpoint_for_hash_rejects_an_unknown_hash() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![member(1)]);
        connector.add_node(1, FakeNode::new(mash.clone()));
        let router = Router::new(mash, connector);

        let err = router.endpoint_for_hash(99).await.unwrap_err();
        assert!(matches!(err, Error::ClusterDegraded));
    }

    #[tokio::test]
    async fn any_endpoint_synthesizes_a_random_key_when_cache_is_empty() {
        let connector = Arc::new(FakeConnector::default());
        let mash = Mash::new(1, vec![member(1), member(2)]);
        connector.add_node(1, FakeNode::new(mash.clone()));
        connector.add_node(2, FakeNode::new(mash.clone()));
        let router = Router::new(mash, connector);

        let endpoint = router.any_endpoint().await.unwrap();
        assert!(endpoint.hash() == 1 || endpoint.hash() == 2);
    }
}
