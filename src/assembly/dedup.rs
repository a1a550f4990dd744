use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{MeshError, Result};

/// Opaque fixed-width composite key with a cached content hash.
///
/// Ordering compares the hash first and falls back to the words on a tie, so
/// equal keys always compare `Equal` and distinct keys sharing a hash stay
/// distinct.
#[derive(Debug, Clone)]
pub struct VertexKey {
    hash: u64,
    words: Box<[u32]>,
}

impl VertexKey {
    pub fn new(words: &[u32]) -> Self {
        Self {
            hash: fnv1a(words),
            words: words.into(),
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[cfg(test)]
    fn with_hash(words: &[u32], hash: u64) -> Self {
        Self {
            hash,
            words: words.into(),
        }
    }
}

impl PartialEq for VertexKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.words == other.words
    }
}

impl Eq for VertexKey {}

impl PartialOrd for VertexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VertexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.words.cmp(&other.words))
    }
}

fn fnv1a(words: &[u32]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = OFFSET;
    for w in words {
        for b in w.to_le_bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(PRIME);
        }
    }
    h
}

/// Ordered map from composite key to unique vertex id.
///
/// Ids are handed out sequentially from 0 in first-seen order; the map size
/// is the unique vertex count of the assembled buffer.
#[derive(Debug, Default)]
pub struct DedupIndex {
    map: BTreeMap<VertexKey, u32>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `key`, inserting it with the next id when unseen.
    pub fn lookup_or_insert(&mut self, key: &[u32]) -> Result<u32> {
        let next = u32::try_from(self.map.len()).map_err(|_| {
            MeshError::Capacity("more than u32::MAX unique vertices".into())
        })?;
        Ok(*self.map.entry(VertexKey::new(key)).or_insert(next))
    }

    pub fn get(&self, key: &[u32]) -> Option<u32> {
        self.map.get(&VertexKey::new(key)).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
