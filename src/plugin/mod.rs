//! Master and plugin files (`.esm`/`.esp`/`.esl`).
//!
//! A plugin file is a `TES4` root record followed by top-level `GRUP` containers, each
//! nesting the records of one type. Records carry tagged, length-prefixed fields and are
//! decoded lazily: field offsets are discovered by a single forward scan whose frontier
//! only ever advances, so repeated queries against one record never re-read its bytes.
//!
//! # Reading
//! ```no_run
//! use tesfile::{plugin::Plugin, prelude::*, Tag};
//! use std::path::Path;
//!
//! fn example() -> Option<()> {
//!     let path = Path::new("path/to/skyrim/Data/Skyrim.esm");
//!     let plugin = Plugin::read(path).ok()?;
//!     for book in plugin.records_by_type(Tag::new(b"BOOK")) {
//!         let book = book.ok()?;
//!         println!("{:?}", book.editor_id().ok()?);
//!     }
//!     Some(())
//! }
//! ```

mod field;
mod file;
mod group;
mod record;

pub use self::{
    field::{Field, Prim, Scalar, Schema, SchemaTable, Value},
    file::Plugin,
    group::{Group, GroupHeader, Records},
    record::{Fields, FieldsByTag, Record, RecordHeader},
};

use crate::Tag;
use core::fmt;
use std::io;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file does not start with a TES4 record: found {0}")]
    InvalidMagic(Tag),

    #[error("record tag at offset {offset:#x} is not ascii: {tag:?}")]
    InvalidRecordTag { offset: usize, tag: [u8; 4] },

    #[error("field tag at offset {offset:#x} is not ascii: {tag:?}")]
    InvalidFieldTag { offset: usize, tag: [u8; 4] },

    #[error("record {record} has no {tag} field")]
    FieldNotFound { record: Tag, tag: Tag },

    #[error("field {tag} holds {actual} bytes, but decoding needs {expected}")]
    FieldTooSmall {
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    #[error("group at offset {offset:#x} declares {size} bytes, less than its own header")]
    BadGroupSize { offset: usize, size: u32 },

    #[error("group at offset {offset:#x} overruns its container: {size} bytes declared, {available} remain")]
    GroupTooLarge {
        offset: usize,
        size: u32,
        available: usize,
    },

    #[error("record at offset {offset:#x} overruns its container: {size} bytes declared, {available} remain")]
    RecordTooLarge {
        offset: usize,
        size: u32,
        available: usize,
    },

    #[error("record at offset {offset:#x} is not a group")]
    NotAGroup { offset: usize },

    #[error("group label is only interpretable for top-level groups, not kind {kind}")]
    UnresolvedGroupLabel { kind: u32 },

    #[error("compressed record {record} is too short for its decompressed-length prefix")]
    TruncatedCompressedContent { record: Tag },

    #[error("record {record} content failed to decompress")]
    Decompress { record: Tag, source: io::Error },

    #[error("buffer failed to decompress to the expected size... expected {expected} bytes, but got {actual} bytes")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Decode(#[from] crate::DecodeError),

    #[error(transparent)]
    Read(#[from] crate::ReadError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

bitflags::bitflags! {
    /// The flag word of a record header.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RecordFlags: u32 {
        const MASTER = 1 << 0;
        const DELETED = 1 << 2;
        const DISABLED = 1 << 8;
        const LIGHT_MASTER = 1 << 9;
        const COMPRESSED = 1 << 18;
    }
}

impl RecordFlags {
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.contains(Self::MASTER)
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(Self::DELETED)
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.contains(Self::DISABLED)
    }

    #[must_use]
    pub fn is_light_master(&self) -> bool {
        self.contains(Self::LIGHT_MASTER)
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }
}

/// A compact identifier for one game object, distinct from the path hash used
/// by archives. The high byte indexes the master list; the rest is the object.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct FormId(pub u32);

impl FormId {
    #[must_use]
    pub fn mod_index(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[must_use]
    pub fn object_index(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl From<u32> for FormId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
