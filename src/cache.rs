use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex as AsyncMutex;

use crate::endpoint::{Connector, Endpoint};
use crate::Error;

/// Single-flight slot for one member hash: the first caller to find it empty
/// dials; everyone else waiting on the same hash gets the same `Endpoint`
/// once the dial completes, instead of racing to open duplicate channels.
/// Modeled on gazette's `router.rs` `DialState` (`Arc<futures::lock::Mutex<Option<(Channel, usize)>>>`
/// keyed by member id), adapted so the dial itself (not just the channel
/// construction) happens under the per-slot lock.
struct Slot(AsyncMutex<Option<Endpoint>>);

struct Inner {
    closed: bool,
    slots: HashMap<u32, Arc<Slot>>,
}

/// Caches one dialed `Endpoint` per MASH member hash, keyed independently of
/// any particular `Mash` snapshot so a resync that reassigns hashes to new
/// addresses doesn't orphan still-open connections to unrelated members.
pub struct EndpointCache {
    connector: Arc<dyn Connector>,
    inner: RwLock<Inner>,
}

impl EndpointCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        EndpointCache {
            connector,
            inner: RwLock::new(Inner {
                closed: false,
                slots: HashMap::new(),
            }),
        }
    }

    fn slot_for(&self, hash: u32) -> Arc<Slot> {
        if let Some(slot) = self.inner.read().unwrap().slots.get(&hash) {
            return slot.clone();
        }
        let mut inner = self.inner.write().unwrap();
        inner
            .slots
            .entry(hash)
            .or_insert_with(|| Arc::new(Slot(AsyncMutex::new(None))))
            .clone()
    }

    /// Returns the cached endpoint for `hash`, dialing `addresses` if this is
    /// the first caller to ask for it. Addresses are only consulted on a
    /// cold slot; a warm slot is returned as-is even if `addresses` has since
    /// changed (a MASH resync that moves a hash to new addresses clears the
    /// stale slot itself via `evict`).
    pub async fn get_or_connect(&self, hash: u32, addresses: &[String]) -> Result<Endpoint, Error> {
        if self.inner.read().unwrap().closed {
            return Err(Error::Disconnected);
        }
        let slot = self.slot_for(hash);
        let mut guard = slot.0.lock().await;
        if let Some(endpoint) = guard.as_ref() {
            return Ok(endpoint.clone());
        }
        tracing::debug!(hash, ?addresses, "dialing member");
        let transport = match self.connector.connect(addresses).await {
            Ok(transport) => transport,
            Err(error) => {
                tracing::warn!(hash, ?addresses, %error, "dial failed");
                return Err(error);
            }
        };
        let endpoint = Endpoint::new(hash, addresses.to_vec(), transport);
        *guard = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Installs an already-dialed endpoint (used when `Connect` bootstraps
    /// from a seed address before any MASH exists to assign it a hash).
    pub fn insert(&self, endpoint: Endpoint) {
        let slot = self.slot_for(endpoint.hash());
        if let Ok(mut guard) = slot.0.try_lock() {
            *guard = Some(endpoint);
        }
    }

    /// Drops the cached endpoint for `hash`, if any, so the next
    /// `get_or_connect` redials. Used when a `WrongEndpoint` response proves
    /// a cached channel is stale.
    pub fn evict(&self, hash: u32) {
        let slot = {
            let inner = self.inner.read().unwrap();
            inner.slots.get(&hash).cloned()
        };
        if let Some(slot) = slot {
            if let Ok(mut guard) = slot.0.try_lock() {
                if guard.take().is_some() {
                    tracing::debug!(hash, "evicted cached endpoint");
                }
            }
        }
    }

    /// Returns any one currently-dialed endpoint, used as a resync candidate
    /// before falling back to dialing fresh MASH members.
    pub fn any_open(&self) -> Option<Endpoint> {
        let slots: Vec<_> = self.inner.read().unwrap().slots.values().cloned().collect();
        for slot in slots {
            if let Ok(guard) = slot.0.try_lock() {
                if let Some(endpoint) = guard.as_ref() {
                    return Some(endpoint.clone());
                }
            }
        }
        None
    }

    /// Returns every currently-dialed endpoint. `resync_mash` tries all of
    /// these against `Info()` before it dials anything fresh.
    pub fn all_open(&self) -> Vec<Endpoint> {
        let slots: Vec<_> = self.inner.read().unwrap().slots.values().cloned().collect();
        let mut open = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Ok(guard) = slot.0.try_lock() {
                if let Some(endpoint) = guard.as_ref() {
                    open.push(endpoint.clone());
                }
            }
        }
        open
    }

    /// Closes the cache: marks it closed so future `get_or_connect` calls
    /// fail fast, and drops every cached endpoint. Idempotent. Returns the
    /// last non-nil error observed while closing, if any.
    pub fn close(&self) -> Option<Error> {
        let mut inner = self.inner.write().unwrap();
        if inner.closed {
            return None;
        }
        inner.closed = true;
        let count = inner.slots.len();
        inner.slots.clear();
        tracing::debug!(count, "closed endpoint cache");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mash::Mash;
    use crate::testing::{FakeConnector, FakeNode};

    #[tokio::test]
    async fn concurrent_get_or_connect_dials_once() {
        let connector = Arc::new(FakeConnector::default());
        connector.add_node(7, FakeNode::new(Mash::new(1, vec![])));
        let cache = Arc::new(EndpointCache::new(connector.clone()));

        let addrs = vec!["7".to_string()];
        let (a, b) = tokio::join!(
            cache.get_or_connect(7, &addrs),
            cache.get_or_connect(7, &addrs)
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(connector.dial_count(7), 1);
    }

    #[tokio::test]
    async fn evict_forces_redial() {
        let connector = Arc::new(FakeConnector::default());
        connector.add_node(3, FakeNode::new(Mash::new(1, vec![])));
        let cache = EndpointCache::new(connector.clone());
        let addrs = vec!["3".to_string()];

        cache.get_or_connect(3, &addrs).await.unwrap();
        cache.evict(3);
        cache.get_or_connect(3, &addrs).await.unwrap();
        assert_eq!(connector.dial_count(3), 2);
    }

    #[tokio::test]
    async fn closed_cache_rejects_new_dials() {
        let connector = Arc::new(FakeConnector::default());
        connector.add_node(1, FakeNode::new(Mash::new(1, vec![])));
        let cache = EndpointCache::new(connector);
        cache.close();
        let err = cache
            .get_or_connect(1, &["1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected));
    }
}
