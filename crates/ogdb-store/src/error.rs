use ogdb_types::ObjectId;

/// Errors from slot store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Attempted to allocate or write for the null id.
    #[error("cannot store a slot under the null id")]
    NullObjectId,

    /// The id was never reserved by this store.
    #[error("id {0} was not reserved")]
    NotReserved(ObjectId),

    /// A write arrived without a matching allocation.
    #[error("no slot allocated for {0}")]
    Unallocated(ObjectId),

    /// The written bytes do not fill the allocated slot exactly.
    #[error("slot length mismatch for {id}: allocated {expected}, got {actual}")]
    LengthMismatch {
        id: ObjectId,
        expected: usize,
        actual: usize,
    },
}

/// Result alias for slot store operations.
pub type StoreResult<T> = Result<T, StoreError>;
