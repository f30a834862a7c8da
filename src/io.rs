use bstr::{BStr, ByteSlice as _};

/// A fault raised by the byte-range reader itself, before any format-level
/// interpretation: the requested range does not exist in the file.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("read of {needed} bytes at offset {offset:#x} is out of bounds for a buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("string starting at offset {offset:#x} is missing its null terminator")]
    MissingNullTerminator { offset: usize },
}

pub(crate) type Result<T> = core::result::Result<T, ReadError>;

/// Validates an absolute range against a buffer and returns the slice.
///
/// Every read in the crate funnels through here or [`Cursor`]; out-of-range
/// requests fail, they are never silently truncated.
pub(crate) fn slice_at(data: &[u8], offset: usize, needed: usize) -> Result<&[u8]> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(ReadError::OutOfBounds {
            offset,
            needed,
            len: data.len(),
        }),
    }
}

/// A little-endian positional reader over an in-memory byte slice.
pub(crate) struct Cursor<'bytes> {
    data: &'bytes [u8],
    pos: usize,
}

impl<'bytes> Cursor<'bytes> {
    pub fn new(data: &'bytes [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn seek_absolute(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn seek_relative(&mut self, offset: usize) {
        self.pos += offset;
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'bytes [u8]> {
        let result = slice_at(self.data, self.pos, len)?;
        self.pos += len;
        Ok(result)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    /// Reads a null-terminated string, leaving the cursor just past the terminator.
    pub fn read_zstring(&mut self) -> Result<&'bytes BStr> {
        let data = self.data;
        let start = self.pos;
        slice_at(data, start, 0)?;
        let tail = &data[start..];
        let Some(len) = tail.find_byte(0) else {
            return Err(ReadError::MissingNullTerminator { offset: start });
        };
        self.pos = start + len + 1;
        Ok(tail[..len].as_bstr())
    }

    /// Reads a length-prefixed, null-terminated string. The prefix counts the
    /// terminator but not itself.
    pub fn read_bzstring(&mut self) -> Result<&'bytes BStr> {
        let start = self.pos;
        let len = self.read_u8()?;
        let Some(len) = len.checked_sub(1) else {
            return Err(ReadError::MissingNullTerminator { offset: start });
        };
        let result = self.read_bytes(len.into())?;
        match self.read_u8()? {
            b'\0' => Ok(result.as_bstr()),
            _ => Err(ReadError::MissingNullTerminator { offset: start }),
        }
    }

    /// Reads a length-prefixed string with no terminator.
    pub fn read_bstring(&mut self) -> Result<&'bytes BStr> {
        let len = self.read_u8()?;
        Ok(self.read_bytes(len.into())?.as_bstr())
    }
}
