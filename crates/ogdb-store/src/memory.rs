use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use ogdb_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::slot::Slot;
use crate::traits::SlotStore;

/// Default allocation granularity of the in-memory store.
pub const DEFAULT_BLOCK_SIZE: usize = 8;

#[derive(Clone, Debug)]
struct StoredSlot {
    slot: Slot,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i32,
    next_address: u64,
    reserved: BTreeSet<ObjectId>,
    pending: HashMap<ObjectId, Slot>,
    slots: BTreeMap<ObjectId, StoredSlot>,
}

/// In-memory, map-based slot store.
///
/// Intended for tests and embedding. Addresses are handed out from a bump
/// counter; an update reuses the old address when the new length fits.
pub struct InMemorySlotStore {
    block_size: usize,
    state: RwLock<State>,
}

impl InMemorySlotStore {
    /// Create an empty store with the default block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create an empty store that aligns every slot to `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            state: RwLock::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    /// Number of written slots.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").slots.len()
    }

    /// Returns `true` if no slot has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all written slots.
    pub fn total_bytes(&self) -> usize {
        self.state
            .read()
            .expect("lock poisoned")
            .slots
            .values()
            .map(|s| s.slot.length)
            .sum()
    }

    /// The slot currently backing `id`, if written.
    pub fn slot_of(&self, id: ObjectId) -> Option<Slot> {
        self.state
            .read()
            .expect("lock poisoned")
            .slots
            .get(&id)
            .map(|s| s.slot)
    }

    /// Overwrite the bytes of an existing slot in place, keeping its length.
    ///
    /// Test hook for simulating on-disk corruption.
    pub fn corrupt(&self, id: ObjectId, offset: usize, bytes: &[u8]) -> bool {
        let mut state = self.state.write().expect("lock poisoned");
        match state.slots.get_mut(&id) {
            Some(stored) if offset + bytes.len() <= stored.bytes.len() => {
                stored.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    fn check_reserved(state: &State, id: ObjectId) -> StoreResult<()> {
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        if !state.reserved.contains(&id) {
            return Err(StoreError::NotReserved(id));
        }
        Ok(())
    }

    fn bump(state: &mut State, length: usize) -> Slot {
        let slot = Slot::new(state.next_address, length);
        state.next_address = slot.end();
        slot
    }
}

impl Default for InMemorySlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStore for InMemorySlotStore {
    fn reserve_id(&self) -> StoreResult<ObjectId> {
        let mut state = self.state.write().expect("lock poisoned");
        let id = ObjectId::new(state.next_id);
        state.next_id += 1;
        state.reserved.insert(id);
        Ok(id)
    }

    fn allocate_new(&self, id: ObjectId, length: usize) -> StoreResult<Slot> {
        let mut state = self.state.write().expect("lock poisoned");
        Self::check_reserved(&state, id)?;
        let slot = Self::bump(&mut state, length);
        state.pending.insert(id, slot);
        Ok(slot)
    }

    fn allocate_update(&self, id: ObjectId, length: usize) -> StoreResult<Slot> {
        let mut state = self.state.write().expect("lock poisoned");
        Self::check_reserved(&state, id)?;
        let slot = match state.slots.get(&id) {
            Some(old) if old.slot.length >= length => Slot::new(old.slot.address, length),
            _ => Self::bump(&mut state, length),
        };
        state.pending.insert(id, slot);
        Ok(slot)
    }

    fn write(&self, id: ObjectId, slot: Slot, bytes: &[u8]) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        match state.pending.get(&id) {
            Some(pending) if *pending == slot => {}
            _ => return Err(StoreError::Unallocated(id)),
        }
        if bytes.len() != slot.length {
            return Err(StoreError::LengthMismatch {
                id,
                expected: slot.length,
                actual: bytes.len(),
            });
        }
        state.pending.remove(&id);
        state.slots.insert(
            id,
            StoredSlot {
                slot,
                bytes: bytes.to_vec(),
            },
        );
        debug!(%id, address = slot.address, len = slot.length, "slot written");
        Ok(())
    }

    fn read(&self, id: ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.slots.get(&id).map(|s| s.bytes.clone()))
    }

    fn free(&self, id: ObjectId) -> StoreResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        state.pending.remove(&id);
        Ok(state.slots.remove(&id).is_some())
    }

    fn ids(&self) -> StoreResult<Vec<ObjectId>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.slots.keys().copied().collect())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for InMemorySlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySlotStore")
            .field("block_size", &self.block_size)
            .field("slot_count", &self.len())
            .finish()
    }
}
