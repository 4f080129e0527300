use serde::{Deserialize, Serialize};

/// A destination range handed out by the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Start address of the range.
    pub address: u64,
    /// Exact length of the range in bytes.
    pub length: usize,
}

impl Slot {
    pub fn new(address: u64, length: usize) -> Self {
        Self { address, length }
    }

    /// First address past the range.
    pub fn end(&self) -> u64 {
        self.address + self.length as u64
    }
}

/// Round `length` up to a multiple of `block_size`.
///
/// A block size of `0` or `1` leaves the length unchanged.
pub fn block_aligned(length: usize, block_size: usize) -> usize {
    if block_size <= 1 {
        return length;
    }
    length.div_ceil(block_size) * block_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_up_to_block() {
        assert_eq!(block_aligned(0, 8), 0);
        assert_eq!(block_aligned(1, 8), 8);
        assert_eq!(block_aligned(8, 8), 8);
        assert_eq!(block_aligned(9, 8), 16);
    }

    #[test]
    fn unit_block_is_identity() {
        assert_eq!(block_aligned(13, 1), 13);
        assert_eq!(block_aligned(13, 0), 13);
    }

    #[test]
    fn slot_end() {
        assert_eq!(Slot::new(16, 24).end(), 40);
    }
}
