use crate::model::StreamId;

/// One cluster member as described by a MASH snapshot: an opaque routing
/// hash assigned by the server, and an ordered, non-empty list of candidate
/// addresses (alternates for the same node).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub hash: u32,
    pub addresses: Vec<String>,
}

/// Where a stream id is currently owned, as resolved by `Mash::endpoint_for`.
#[derive(Clone, Debug)]
pub struct Placement {
    pub hash: u32,
    pub addresses: Vec<String>,
}

/// Immutable snapshot of cluster routing state. `revision` orders snapshots;
/// a MASH is replaced wholesale, never mutated, once installed.
#[derive(Clone, Debug, Default)]
pub struct Mash {
    revision: u64,
    members: Vec<Member>,
}

impl Mash {
    pub fn new(revision: u64, members: Vec<Member>) -> Self {
        Mash { revision, members }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn member_by_hash(&self, hash: u32) -> Option<&Member> {
        self.members.iter().find(|m| m.hash == hash)
    }

    /// Maps `stream_id` to its owning member, or `None` if the cluster
    /// currently has no owner for it (an empty member list -- a degraded
    /// state; callers surface `ClusterDegraded`, never wait here).
    ///
    /// The server tells us only cluster membership; the placement function
    /// itself is computed client-side by rendezvous hashing (highest random
    /// weight) over `(stream_id, member.hash)`, which is deterministic in
    /// `(stream_id, Mash)` without requiring any further wire information.
    pub fn endpoint_for(&self, stream_id: &StreamId) -> Option<Placement> {
        self.members
            .iter()
            .max_by_key(|m| rendezvous_score(stream_id, m.hash))
            .map(|m| Placement {
                hash: m.hash,
                addresses: m.addresses.clone(),
            })
    }
}

fn rendezvous_score(stream_id: &StreamId, member_hash: u32) -> u64 {
    let mut bytes = [0u8; 20];
    bytes[..16].copy_from_slice(stream_id.as_ref());
    bytes[16..].copy_from_slice(&member_hash.to_le_bytes());
    xxhash_rust::xxh3::xxh3_64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(n: u32) -> Vec<Member> {
        (0..n)
            .map(|i| Member {
                hash: i,
                addresses: vec![format!("10.0.0.{i}:4242")],
            })
            .collect()
    }

    #[test]
    fn placement_is_deterministic() {
        let mash = Mash::new(1, members(8));
        let id = StreamId::random();
        let a = mash.endpoint_for(&id).unwrap().hash;
        let b = mash.endpoint_for(&id).unwrap().hash;
        assert_eq!(a, b);
    }

    #[test]
    fn placement_spreads_across_members() {
        let mash = Mash::new(1, members(16));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let id = StreamId::random();
            seen.insert(mash.endpoint_for(&id).unwrap().hash);
        }
        // With 500 random ids over 16 members we expect to have touched
        // nearly all of them; this is a sanity check against a degenerate
        // placement function that always picks the same member.
        assert!(seen.len() > 10, "only touched {} of 16 members", seen.len());
    }

    #[test]
    fn empty_mash_is_unmapped() {
        let mash = Mash::new(1, vec![]);
        assert!(mash.endpoint_for(&StreamId::random()).is_none());
    }
}
