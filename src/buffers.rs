//! The two backing buffers pieces can name: the read-only `original` (the
//! bytes of the opened file, typically memory-mapped) and the grow-only
//! `add` buffer holding every byte the user has ever inserted.

use crate::file::MappedSource;

/// Read-only source bytes. Either a memory-mapped file or, for scratch
/// documents and re-seated saves of in-memory content, an owned buffer.
#[derive(Debug)]
pub(crate) enum OriginalBuffer {
    Mapped(MappedSource),
    Owned(Vec<u8>),
}

impl OriginalBuffer {
    pub fn empty() -> Self {
        OriginalBuffer::Owned(Vec::new())
    }

    pub fn from_mapped(source: MappedSource) -> Self {
        OriginalBuffer::Mapped(source)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        OriginalBuffer::Owned(bytes)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            OriginalBuffer::Mapped(m) => m.as_bytes(),
            OriginalBuffer::Owned(v) => v.as_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// The add buffer is a plain, append-only byte vector. Nothing ever removes
/// or rewrites bytes already pushed onto it; deleted add-buffer pieces just
/// stop being referenced by the tree.
pub(crate) type AddBuffer = Vec<u8>;
