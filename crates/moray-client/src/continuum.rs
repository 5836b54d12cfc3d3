//! The ketama continuum: consistent hashing over groups.
//!
//! Each group contributes `total_groups * 160 * weight / total_weight`
//! points to a ring sorted by hash. Points are derived from SHA-1 of
//! `"<group_name>:<index>"` so that every ketama client addressing the
//! same group names agrees on the layout; lookups hash the namespaced key
//! with CRC-32, which only needs to be cheap and deterministic. The
//! spread of the SHA-1 points is what provides uniformity.
//!
//! The ring is keyed by *group names*, not server hosts: replicas can be
//! swapped inside a group without moving any keys.

use sha1::{Digest, Sha1};

/// Ring points per unit of weight, the libmemcached-compatible constant.
/// Changing it would reshuffle every key addressed by other ketama
/// clients of the same cluster.
const POINTS_PER_WEIGHT: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    hash: u32,
    group: usize,
}

/// An immutable sorted ring of (hash, group-index) points.
///
/// Built once per client; safe to read without synchronization.
#[derive(Debug, Clone)]
pub struct Continuum {
    points: Vec<Point>,
}

impl Continuum {
    /// Builds the ring from `(name, weight)` pairs, one per group, in
    /// group-list order.
    pub fn build<'a>(groups: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let groups: Vec<(&str, u32)> = groups.into_iter().collect();
        let total_weight: u64 = groups.iter().map(|&(_, w)| w as u64).sum();

        let mut points = Vec::new();
        for (index, &(name, weight)) in groups.iter().enumerate() {
            let count = if total_weight == 0 {
                0
            } else {
                (groups.len() as u64 * POINTS_PER_WEIGHT as u64 * weight as u64
                    / total_weight) as usize
            };
            for k in 0..count {
                let digest = Sha1::digest(format!("{name}:{k}").as_bytes());
                let hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
                points.push(Point {
                    hash,
                    group: index,
                });
            }
        }
        points.sort_unstable_by_key(|p| p.hash);
        Self { points }
    }

    /// Hashes a namespaced key onto the ring.
    pub fn hash_key(key: &[u8]) -> u32 {
        crc32fast::hash(key)
    }

    /// Returns the group index owning `hash`: the largest point with
    /// `point.hash <= hash`, wrapping to the last point when `hash`
    /// precedes the whole ring.
    pub fn locate(&self, hash: u32) -> usize {
        debug_assert!(!self.points.is_empty());
        match self.points.partition_point(|p| p.hash <= hash) {
            0 => self.points[self.points.len() - 1].group,
            n => self.points[n - 1].group,
        }
    }

    /// Total number of points on the ring.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    fn from_raw(points: Vec<(u32, usize)>) -> Self {
        let mut points: Vec<Point> = points
            .into_iter()
            .map(|(hash, group)| Point { hash, group })
            .collect();
        points.sort_unstable_by_key(|p| p.hash);
        Self { points }
    }
}
