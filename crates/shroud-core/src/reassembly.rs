//! Reassembly of in-flight transmissions.
//!
//! Fragments are bucketed by (transmission id, peer address). A bucket opens
//! on a START fragment, collects everything that follows and is handed back
//! whole when a fragment carrying END arrives. Buckets that stop receiving
//! fragments are removed by [`ReassemblyCache::sweep`].

use crate::frame::Fragment;
use crate::shifter::FragmentSize;
use shroud_crypto::{NONCE_SIZE, TAG_SIZE};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bucket key: transmission id and the address it arrived from
pub type TransmissionKey = (u16, IpAddr);

/// Default per-bucket fragment limit: a 65535-byte message at the smallest
/// fragment size.
pub const MAX_BUCKET_FRAGMENTS: usize = NONCE_SIZE.div_ceil(FragmentSize::MIN as usize)
    + (u16::MAX as usize + TAG_SIZE).div_ceil(FragmentSize::MIN as usize);

/// Why a fragment was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// START carrying our own sender id
    SelfEcho,
    /// Continuation fragment with no open bucket
    NotStarted,
    /// Cache already holds the maximum number of buckets
    CacheFull,
    /// Bucket hit its fragment limit and was dropped
    BucketOverflow,
}

/// Outcome of offering a fragment to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new bucket was opened
    Opened,
    /// A START replaced an unfinished bucket for the same key
    Restarted,
    /// Fragment appended to an open bucket
    Appended,
    /// END reached; the bucket is removed and its fragments returned in
    /// arrival order
    Complete(Vec<Fragment>),
    /// Fragment dropped
    Discarded(DiscardReason),
}

struct Bucket {
    fragments: Vec<Fragment>,
    last_touch: Instant,
}

/// Keyed buffer of open transmissions with idle expiry
pub struct ReassemblyCache {
    own_id: u16,
    ttl: Duration,
    max_open: usize,
    max_fragments: usize,
    buckets: HashMap<TransmissionKey, Bucket>,
}

impl ReassemblyCache {
    /// Create a cache for a session whose own transmissions use `own_id`.
    ///
    /// Buckets idle for longer than `ttl` are dropped by `sweep`; at most
    /// `max_open` buckets exist at once.
    #[must_use]
    pub fn new(own_id: u16, ttl: Duration, max_open: usize) -> Self {
        Self {
            own_id,
            ttl,
            max_open,
            max_fragments: MAX_BUCKET_FRAGMENTS,
            buckets: HashMap::new(),
        }
    }

    /// Override the per-bucket fragment limit (at least 1).
    #[must_use]
    pub fn with_fragment_limit(mut self, max_fragments: usize) -> Self {
        self.max_fragments = max_fragments.max(1);
        self
    }

    /// Offer a fragment received from `peer`.
    pub fn admit(&mut self, peer: IpAddr, fragment: Fragment) -> Admission {
        self.admit_at(peer, fragment, Instant::now())
    }

    /// Offer a fragment with an explicit arrival time.
    pub fn admit_at(&mut self, peer: IpAddr, fragment: Fragment, now: Instant) -> Admission {
        let key = (fragment.transmission_id(), peer);

        let admission = if fragment.is_start() {
            if key.0 == self.own_id {
                return Admission::Discarded(DiscardReason::SelfEcho);
            }
            let restarted = self.buckets.contains_key(&key);
            if !restarted && self.buckets.len() >= self.max_open {
                debug!(id = key.0, %peer, open = self.buckets.len(), "reassembly cache full");
                return Admission::Discarded(DiscardReason::CacheFull);
            }
            self.buckets.insert(
                key,
                Bucket {
                    fragments: vec![fragment],
                    last_touch: now,
                },
            );
            if restarted {
                debug!(id = key.0, %peer, "transmission restarted");
                Admission::Restarted
            } else {
                Admission::Opened
            }
        } else {
            let Some(bucket) = self.buckets.get_mut(&key) else {
                return Admission::Discarded(DiscardReason::NotStarted);
            };
            if bucket.fragments.len() >= self.max_fragments {
                let held = bucket.fragments.len();
                self.buckets.remove(&key);
                debug!(id = key.0, %peer, held, "transmission exceeded fragment limit");
                return Admission::Discarded(DiscardReason::BucketOverflow);
            }
            bucket.fragments.push(fragment);
            bucket.last_touch = now;
            Admission::Appended
        };

        // END may arrive on the seed itself or on any appended fragment.
        let complete = self
            .buckets
            .get(&key)
            .and_then(|bucket| bucket.fragments.last())
            .is_some_and(Fragment::is_end);
        if !complete {
            return admission;
        }
        self.buckets
            .remove(&key)
            .map_or(admission, |bucket| Admission::Complete(bucket.fragments))
    }

    /// Remove buckets idle for longer than the TTL, returning how many.
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Sweep relative to an explicit clock reading.
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_touch) <= ttl);
        let expired = before - self.buckets.len();
        if expired > 0 {
            debug!(expired, remaining = self.buckets.len(), "swept idle transmissions");
        }
        expired
    }

    /// Whether a bucket is open for `key`
    #[must_use]
    pub fn contains(&self, key: &TransmissionKey) -> bool {
        self.buckets.contains_key(key)
    }

    /// Number of open buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if no bucket is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Idle time after which a bucket expires
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Most fragments a single bucket may hold
    #[must_use]
    pub fn fragment_limit(&self) -> usize {
        self.max_fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FragmentType, mark_boundaries};
    use std::net::Ipv4Addr;

    const OWN_ID: u16 = 1;
    const PEER_A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    const PEER_B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
    const TTL: Duration = Duration::from_secs(5);

    fn transmission(id: u16, count: usize) -> Vec<Fragment> {
        let mut fragments: Vec<Fragment> = (0..count)
            .map(|i| Fragment::new(FragmentType::Ciphertext, id, vec![i as u8; 4]).unwrap())
            .collect();
        mark_boundaries(&mut fragments);
        fragments
    }

    fn cache() -> ReassemblyCache {
        ReassemblyCache::new(OWN_ID, TTL, 16)
    }

    #[test]
    fn test_complete_transmission() {
        let mut cache = cache();
        let fragments = transmission(7, 3);

        assert_eq!(cache.admit(PEER_A, fragments[0].clone()), Admission::Opened);
        assert_eq!(cache.admit(PEER_A, fragments[1].clone()), Admission::Appended);
        assert!(cache.contains(&(7, PEER_A)));

        assert_eq!(
            cache.admit(PEER_A, fragments[2].clone()),
            Admission::Complete(fragments)
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_single_fragment_completes_on_seed() {
        let mut cache = cache();
        let fragments = transmission(7, 1);
        assert_eq!(
            cache.admit(PEER_A, fragments[0].clone()),
            Admission::Complete(fragments)
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_self_echo_suppressed() {
        let mut cache = cache();
        let fragments = transmission(OWN_ID, 2);
        assert_eq!(
            cache.admit(PEER_A, fragments[0].clone()),
            Admission::Discarded(DiscardReason::SelfEcho)
        );
        assert_eq!(
            cache.admit(PEER_A, fragments[1].clone()),
            Admission::Discarded(DiscardReason::NotStarted)
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_continuation_without_start_discarded() {
        let mut cache = cache();
        let fragments = transmission(9, 3);
        assert_eq!(
            cache.admit(PEER_A, fragments[1].clone()),
            Admission::Discarded(DiscardReason::NotStarted)
        );
        assert_eq!(
            cache.admit(PEER_A, fragments[2].clone()),
            Admission::Discarded(DiscardReason::NotStarted)
        );
    }

    #[test]
    fn test_peers_are_independent() {
        let mut cache = cache();
        let from_a = transmission(7, 2);
        let from_b = transmission(7, 2);

        cache.admit(PEER_A, from_a[0].clone());
        cache.admit(PEER_B, from_b[0].clone());
        assert_eq!(cache.len(), 2);

        assert!(matches!(
            cache.admit(PEER_B, from_b[1].clone()),
            Admission::Complete(_)
        ));
        assert!(cache.contains(&(7, PEER_A)));
        assert!(!cache.contains(&(7, PEER_B)));
    }

    #[test]
    fn test_start_replaces_open_bucket() {
        let mut cache = cache();
        let first = transmission(7, 3);
        let second = transmission(7, 2);

        cache.admit(PEER_A, first[0].clone());
        cache.admit(PEER_A, first[1].clone());
        assert_eq!(cache.admit(PEER_A, second[0].clone()), Admission::Restarted);

        assert_eq!(
            cache.admit(PEER_A, second[1].clone()),
            Admission::Complete(second)
        );
    }

    #[test]
    fn test_sweep_expires_idle_buckets() {
        let mut cache = cache();
        let fragments = transmission(7, 3);
        let start = Instant::now();

        cache.admit_at(PEER_A, fragments[0].clone(), start);
        assert_eq!(cache.sweep_at(start + TTL), 0);
        assert_eq!(cache.sweep_at(start + TTL + Duration::from_millis(1)), 1);
        assert!(cache.is_empty());

        // A late END for the expired key has nothing to join.
        assert_eq!(
            cache.admit(PEER_A, fragments[2].clone()),
            Admission::Discarded(DiscardReason::NotStarted)
        );
    }

    #[test]
    fn test_append_refreshes_timestamp() {
        let mut cache = cache();
        let fragments = transmission(7, 3);
        let start = Instant::now();

        cache.admit_at(PEER_A, fragments[0].clone(), start);
        cache.admit_at(PEER_A, fragments[1].clone(), start + Duration::from_secs(4));
        assert_eq!(cache.sweep_at(start + Duration::from_secs(8)), 0);
        assert_eq!(cache.sweep_at(start + Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut cache = ReassemblyCache::new(OWN_ID, TTL, 2);
        let a = transmission(10, 2);
        let b = transmission(11, 2);
        let c = transmission(12, 2);

        assert_eq!(cache.admit(PEER_A, a[0].clone()), Admission::Opened);
        assert_eq!(cache.admit(PEER_A, b[0].clone()), Admission::Opened);
        assert_eq!(
            cache.admit(PEER_A, c[0].clone()),
            Admission::Discarded(DiscardReason::CacheFull)
        );
        // Restarting an existing key is still allowed when full.
        assert_eq!(cache.admit(PEER_A, a[0].clone()), Admission::Restarted);
    }

    #[test]
    fn test_default_fragment_limit() {
        assert_eq!(cache().fragment_limit(), 3 + 16388);
        assert_eq!(cache().with_fragment_limit(0).fragment_limit(), 1);
    }

    #[test]
    fn test_endless_transmission_dropped_at_limit() {
        let mut cache = cache().with_fragment_limit(4);
        let endless: Vec<Fragment> = transmission(7, 8).into_iter().take(7).collect();

        for fragment in &endless[..4] {
            assert!(matches!(
                cache.admit(PEER_A, fragment.clone()),
                Admission::Opened | Admission::Appended
            ));
        }
        assert_eq!(
            cache.admit(PEER_A, endless[4].clone()),
            Admission::Discarded(DiscardReason::BucketOverflow)
        );
        assert!(cache.is_empty());

        // The rest of the flood has nothing to join.
        assert_eq!(
            cache.admit(PEER_A, endless[5].clone()),
            Admission::Discarded(DiscardReason::NotStarted)
        );

        // A transmission within the limit still completes.
        let short = transmission(7, 4);
        for fragment in &short[..3] {
            cache.admit(PEER_A, fragment.clone());
        }
        assert_eq!(
            cache.admit(PEER_A, short[3].clone()),
            Admission::Complete(short)
        );
    }
}
