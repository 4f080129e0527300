use ogdb_types::ObjectId;

use crate::error::StoreResult;
use crate::slot::{block_aligned, Slot};

/// Storage allocator and slot reader seen from the marshalling core.
///
/// All implementations must satisfy these invariants:
/// - `reserve_id` never returns the null id and never returns an id twice.
/// - `allocate_new` / `allocate_update` return a slot whose `length` equals
///   the requested length.
/// - `write` rejects bytes that do not fill the allocated slot exactly.
/// - `read` returns `Ok(None)` for ids with no written slot; it does not fail
///   on unknown ids.
pub trait SlotStore: Send + Sync {
    /// Reserve a fresh id. The id has no slot until one is allocated and written.
    fn reserve_id(&self) -> StoreResult<ObjectId>;

    /// Allocate a destination range for a slot that has never been written.
    fn allocate_new(&self, id: ObjectId, length: usize) -> StoreResult<Slot>;

    /// Allocate a destination range to replace the existing slot of `id`.
    ///
    /// Implementations may reuse the old range if it is large enough.
    fn allocate_update(&self, id: ObjectId, length: usize) -> StoreResult<Slot>;

    /// Write the finished bytes into the range allocated for `id`.
    fn write(&self, id: ObjectId, slot: Slot, bytes: &[u8]) -> StoreResult<()>;

    /// Read the current bytes of `id`, or `None` if it has no slot.
    fn read(&self, id: ObjectId) -> StoreResult<Option<Vec<u8>>>;

    /// Release the slot of `id`. Returns `true` if the slot existed.
    fn free(&self, id: ObjectId) -> StoreResult<bool>;

    /// All ids that currently have a written slot, in ascending order.
    fn ids(&self) -> StoreResult<Vec<ObjectId>>;

    /// Allocation granularity in bytes.
    fn block_size(&self) -> usize;

    /// Round a slot length up to the allocation granularity.
    fn block_aligned(&self, length: usize) -> usize {
        block_aligned(length, self.block_size())
    }

    /// Check whether `id` has a written slot.
    fn contains(&self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }
}
