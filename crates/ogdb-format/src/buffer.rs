use crate::error::{FormatError, FormatResult};

/// Cursor over the bytes of one fetched slot.
///
/// The buffer is owned by whichever context fetched it for the duration of
/// one read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl ReadBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Move the cursor. Seeking to `len()` is allowed; reads past it fail.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_slice(&mut self, len: usize) -> FormatResult<&[u8]> {
        if self.remaining() < len {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.data[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> FormatResult<()> {
        self.read_slice(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> FormatResult<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_i32(&mut self) -> FormatResult<i32> {
        let bytes = self.read_slice(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i64(&mut self) -> FormatResult<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_slice(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_bytes(&mut self, len: usize) -> FormatResult<Vec<u8>> {
        self.read_slice(len).map(<[u8]>::to_vec)
    }

    /// Read a non-negative length prefix.
    pub fn read_length(&mut self) -> FormatResult<usize> {
        let at = self.offset;
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| {
            FormatError::CorruptHeader(format!("negative length {len} at offset {at}"))
        })
    }

    /// Read a `[byteLength:i32][UTF-8 bytes]` short string.
    pub fn read_short_string(&mut self) -> FormatResult<String> {
        let len = self.read_length()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| FormatError::InvalidString(e.to_string()))
    }
}

/// Growable, append-only byte sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBuffer {
    data: Vec<u8>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_short_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.write_bytes(s.as_bytes());
    }

    /// Overwrite four bytes at `at` with `value`.
    pub fn patch_i32(&mut self, at: usize, value: i32) {
        self.data[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Zero-pad to `len` bytes.
    pub fn pad_to(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
    }
}

impl From<Vec<u8>> for WriteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Encoded length of a short string.
pub fn short_string_length(s: &str) -> usize {
    4 + s.len()
}
