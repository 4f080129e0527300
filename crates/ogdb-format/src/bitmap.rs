/// One bit per field; a set bit marks the field as absent.
///
/// Bit `i` lives in byte `i / 8` at bit position `i % 8`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullBitmap {
    bits: Vec<u8>,
    field_count: usize,
}

impl NullBitmap {
    /// An all-clear bitmap for `field_count` fields.
    pub fn new(field_count: usize) -> Self {
        Self {
            bits: vec![0; Self::byte_length(field_count)],
            field_count,
        }
    }

    /// Rebuild a bitmap from its stored bytes.
    ///
    /// `bytes` must be exactly [`NullBitmap::byte_length`] long.
    pub fn from_bytes(field_count: usize, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::byte_length(field_count));
        Self {
            bits: bytes.to_vec(),
            field_count,
        }
    }

    /// Stored length of a bitmap for `field_count` fields.
    pub fn byte_length(field_count: usize) -> usize {
        field_count.div_ceil(8)
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn set(&mut self, index: usize, absent: bool) {
        debug_assert!(index < self.field_count);
        let mask = 1u8 << (index % 8);
        if absent {
            self.bits[index / 8] |= mask;
        } else {
            self.bits[index / 8] &= !mask;
        }
    }

    /// Returns `true` if field `index` is absent. Indices past the recorded
    /// field count read as absent.
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.field_count {
            return true;
        }
        self.bits[index / 8] & (1u8 << (index % 8)) != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}
