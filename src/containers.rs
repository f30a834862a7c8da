use memmap2::Mmap;
use std::{fs::File, io, sync::Arc};

struct Mapping {
    pos: usize,
    len: usize,
    mapping: Arc<Mmap>,
}

impl Mapping {
    pub fn as_bytes(&self) -> &[u8] {
        &self.mapping[self.pos..self.pos + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

enum BytesInner<'bytes> {
    Owned(Vec<u8>),
    Borrowed(&'bytes [u8]),
    Mapped(Mapping),
}

use BytesInner::*;

/// An immutable byte sequence, either borrowed from a caller's buffer or backed by a
/// read-only memory mapping whose lifetime it owns.
pub struct Bytes<'bytes> {
    inner: BytesInner<'bytes>,
}

impl<'bytes> Bytes<'bytes> {
    pub fn as_bytes(&self) -> &[u8] {
        match &self.inner {
            Owned(x) => x,
            Borrowed(x) => x,
            Mapped(x) => x.as_bytes(),
        }
    }

    pub fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            inner: Borrowed(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            Owned(x) => x.len(),
            Borrowed(x) => x.len(),
            Mapped(x) => x.len(),
        }
    }
}

impl Bytes<'static> {
    /// Maps the entire file read-only. The mapping is released when the last `Bytes`
    /// referring to it is dropped.
    pub fn from_file(file: &File) -> io::Result<Self> {
        let mapping = unsafe { Mmap::map(file)? };
        let len = mapping.len();
        Ok(Self {
            inner: Mapped(Mapping {
                pos: 0,
                len,
                mapping: Arc::new(mapping),
            }),
        })
    }
}

impl<'bytes> Default for Bytes<'bytes> {
    fn default() -> Self {
        Self {
            inner: Owned(Vec::new()),
        }
    }
}
