//! Bounded, height-indexed buffers for shares and computed entropies,
//! plus the generator's height and aeon pointers. One instance lives
//! behind the generator mutex; nothing here locks or verifies.

use super::aeon::AeonDetails;
use super::types::EntropyShare;

use std::collections::BTreeMap;
use std::sync::Arc;

pub struct ShareStore {
    shares: BTreeMap<u64, BTreeMap<u32, EntropyShare>>,
    computed: BTreeMap<u64, Vec<u8>>,
    last_computed_height: u64,
    last_block_height: u64,
    current_aeon: Option<Arc<AeonDetails>>,
    next_aeon: Option<Arc<AeonDetails>>,
}

impl ShareStore {
    pub fn new(last_computed_height: u64) -> Self {
        Self {
            shares: BTreeMap::new(),
            computed: BTreeMap::new(),
            last_computed_height,
            last_block_height: 0,
            current_aeon: None,
            next_aeon: None,
        }
    }

    pub fn last_computed_height(&self) -> u64 {
        self.last_computed_height
    }

    pub fn last_block_height(&self) -> u64 {
        self.last_block_height
    }

    /// Monotonic: lower heights are ignored.
    pub fn set_last_block_height(&mut self, height: u64) -> bool {
        if height <= self.last_block_height {
            return false;
        }
        self.last_block_height = height;
        true
    }

    pub fn current_aeon(&self) -> Option<&Arc<AeonDetails>> {
        self.current_aeon.as_ref()
    }

    pub fn next_aeon(&self) -> Option<&Arc<AeonDetails>> {
        self.next_aeon.as_ref()
    }

    pub fn set_current_aeon(&mut self, aeon: Arc<AeonDetails>) {
        self.current_aeon = Some(aeon);
    }

    pub fn set_next_aeon(&mut self, aeon: Arc<AeonDetails>) {
        self.next_aeon = Some(aeon);
    }

    pub fn clear_current_aeon(&mut self) {
        self.current_aeon = None;
    }

    pub fn promote_next_aeon(&mut self) -> Option<Arc<AeonDetails>> {
        let aeon = self.next_aeon.take()?;
        self.current_aeon = Some(aeon.clone());
        Some(aeon)
    }

    pub fn has_share(&self, height: u64, index: u32) -> bool {
        self.shares
            .get(&height)
            .is_some_and(|slots| slots.contains_key(&index))
    }

    /// Inserts into the per-`(height, index)` slot; duplicates lose.
    pub fn add_share(&mut self, index: u32, share: EntropyShare) -> bool {
        let slots = self.shares.entry(share.height).or_default();
        if slots.contains_key(&index) {
            return false;
        }
        slots.insert(index, share);
        true
    }

    pub fn shares_at(&self, height: u64) -> Option<&BTreeMap<u32, EntropyShare>> {
        self.shares.get(&height)
    }

    pub fn shares_count(&self, height: u64) -> usize {
        self.shares.get(&height).map_or(0, BTreeMap::len)
    }

    pub fn share_heights(&self) -> usize {
        self.shares.len()
    }

    pub fn get_computed(&self, height: u64) -> Option<&Vec<u8>> {
        self.computed.get(&height)
    }

    pub fn computed_heights(&self) -> usize {
        self.computed.len()
    }

    /// Seeds an entry without requiring contiguity (genesis, catch-up
    /// bootstrap). Never moves `last_computed_height` backwards.
    pub fn seed_computed(&mut self, height: u64, group_signature: Vec<u8>) {
        self.computed.insert(height, group_signature);
        if height > self.last_computed_height {
            self.last_computed_height = height;
        }
    }

    /// Stores the entropy for `last_computed_height + 1` and advances.
    pub fn advance_computed(&mut self, height: u64, group_signature: Vec<u8>) {
        debug_assert_eq!(height, self.last_computed_height + 1);
        self.computed.insert(height, group_signature);
        self.last_computed_height = height;
    }

    /// Drops shares and entropies below `last_computed_height - history`.
    pub fn prune(&mut self, history: u64) {
        let cutoff = self.last_computed_height.saturating_sub(history);
        self.shares.retain(|&height, _| height >= cutoff);
        self.computed.retain(|&height, _| height >= cutoff);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key::Address;

    fn share(height: u64) -> EntropyShare {
        EntropyShare {
            height,
            signer_address: Address::from_bytes(&[1; 20]).unwrap(),
            signature_share: vec![height as u8],
            validator_signature: vec![],
        }
    }

    #[test]
    fn duplicate_slots_are_kept_first_wins() {
        let mut store = ShareStore::new(0);
        assert!(store.add_share(2, share(1)));
        assert!(!store.add_share(2, share(1)));
        assert_eq!(store.shares_count(1), 1);
        assert!(store.has_share(1, 2));
        assert!(!store.has_share(1, 3));
    }

    #[test]
    fn block_height_is_monotonic() {
        let mut store = ShareStore::new(0);
        assert!(store.set_last_block_height(5));
        assert!(!store.set_last_block_height(5));
        assert!(!store.set_last_block_height(3));
        assert_eq!(store.last_block_height(), 5);
    }

    #[test]
    fn seed_never_regresses_the_height_pointer() {
        let mut store = ShareStore::new(0);
        store.seed_computed(4, b"four".to_vec());
        assert_eq!(store.last_computed_height(), 4);
        store.seed_computed(1, b"one".to_vec());
        assert_eq!(store.last_computed_height(), 4);
        assert_eq!(store.get_computed(1).unwrap(), b"one");
    }

    #[test]
    fn prune_bounds_both_buffers() {
        let history = 10;
        let mut store = ShareStore::new(0);
        store.seed_computed(0, b"genesis".to_vec());
        for height in 1..=30 {
            store.add_share(0, share(height));
            store.advance_computed(height, vec![height as u8]);
        }
        store.prune(history);

        assert!(store.share_heights() as u64 <= history + 1);
        assert!(store.computed_heights() as u64 <= history + 1);
        assert!(store.get_computed(30 - history - 1).is_none());
        assert!(store.get_computed(30 - history).is_some());
        assert!(store.get_computed(30).is_some());
    }
}
