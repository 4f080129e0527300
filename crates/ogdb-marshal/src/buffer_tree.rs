use ogdb_format::{SlotFormat, WriteBuffer, POINTER_LENGTH};

use crate::error::{MarshalError, MarshalResult};

/// Handle to one chunk of a [`BufferTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkId(usize);

#[derive(Clone, Copy, Debug)]
struct Link {
    parent: ChunkId,
    /// Offset of the reserved pointer within the parent chunk.
    at: usize,
    child: ChunkId,
}

/// A reserved pointer after it was patched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchedPointer {
    /// Position of the pointer within the merged payload.
    pub at: usize,
    /// Stored offset, in the format's addressing.
    pub offset: i32,
    /// Length of the child region, descendants included.
    pub length: i32,
    /// Payload-relative position of the child region.
    pub child_start: usize,
}

/// The contiguous payload produced by [`BufferTree::merge`].
#[derive(Clone, Debug)]
pub struct MergedPayload {
    pub bytes: Vec<u8>,
    pub pointers: Vec<PatchedPointer>,
}

/// Arena of byte chunks plus the reserved pointers that link them.
///
/// Chunk 0 is the root (inline field payloads). A child is opened by
/// reserving an 8-byte pointer at the end of its parent; the pointer is
/// patched once, in [`BufferTree::merge`], when every chunk's final position
/// is known.
#[derive(Clone, Debug)]
pub struct BufferTree {
    chunks: Vec<WriteBuffer>,
    links: Vec<Link>,
}

impl Default for BufferTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferTree {
    pub const ROOT: ChunkId = ChunkId(0);

    pub fn new() -> Self {
        Self {
            chunks: vec![WriteBuffer::new()],
            links: Vec::new(),
        }
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> &mut WriteBuffer {
        &mut self.chunks[id.0]
    }

    /// Reserve a zeroed pointer at the end of `parent` and open a child
    /// chunk for it.
    pub fn open_child(&mut self, parent: ChunkId) -> ChunkId {
        let at = self.chunks[parent.0].len();
        self.chunks[parent.0].write_bytes(&[0; POINTER_LENGTH]);
        self.chunks.push(WriteBuffer::new());
        let child = ChunkId(self.chunks.len() - 1);
        self.links.push(Link { parent, at, child });
        child
    }

    /// Total bytes across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(WriteBuffer::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Lay the chunks out depth-first (each child region directly followed by
    /// its own descendants) and patch every reserved pointer.
    ///
    /// `payload_start` is where the payload will sit in the finished slot;
    /// it only matters for formats with slot-relative pointers.
    pub fn merge(self, format: SlotFormat, payload_start: usize) -> MarshalResult<MergedPayload> {
        let count = self.chunks.len();
        let mut children = vec![Vec::new(); count];
        for link in &self.links {
            children[link.parent.0].push(link.child);
        }

        let mut order = Vec::with_capacity(count);
        let mut stack = vec![Self::ROOT];
        while let Some(chunk) = stack.pop() {
            order.push(chunk);
            stack.extend(children[chunk.0].iter().rev().copied());
        }
        if order.len() != count {
            return Err(MarshalError::InternalConsistency(format!(
                "{} of {count} chunks are not reachable from the root",
                count - order.len()
            )));
        }

        let mut position = vec![0usize; count];
        let mut cursor = 0;
        for chunk in &order {
            position[chunk.0] = cursor;
            cursor += self.chunks[chunk.0].len();
        }
        let mut region = vec![0usize; count];
        for chunk in order.iter().rev() {
            region[chunk.0] = self.chunks[chunk.0].len()
                + children[chunk.0].iter().map(|c| region[c.0]).sum::<usize>();
        }

        let mut out = WriteBuffer::with_capacity(cursor);
        for chunk in &order {
            out.write_bytes(self.chunks[chunk.0].as_slice());
        }

        let mut patched = vec![false; count];
        let mut pointers = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let at = position[link.parent.0] + link.at;
            let reserved = out.as_slice().get(at..at + POINTER_LENGTH);
            if patched[link.child.0] || reserved != Some(&[0u8; POINTER_LENGTH][..]) {
                return Err(MarshalError::InternalConsistency(format!(
                    "pointer at payload offset {at} patched twice"
                )));
            }
            let child_start = position[link.child.0];
            let length = region[link.child.0];
            if child_start + length > cursor {
                return Err(MarshalError::InternalConsistency(format!(
                    "child region {child_start}+{length} exceeds payload length {cursor}"
                )));
            }
            let offset = format.encode_child_offset(payload_start, child_start);
            out.patch_i32(at, offset);
            out.patch_i32(at + 4, length as i32);
            patched[link.child.0] = true;
            pointers.push(PatchedPointer {
                at,
                offset,
                length: length as i32,
                child_start,
            });
        }

        Ok(MergedPayload {
            bytes: out.into_vec(),
            pointers,
        })
    }
}
