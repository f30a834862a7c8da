//! `BSA` resource archives (versions 104 and 105).
//!
//! Archives index folders and files by a 64-bit hash of their lower-cased path rather
//! than by a name lookup table. Folder and file tables are decoded up front, recomputing
//! and checking each folder's hash against the one stored on disk, while file payloads
//! stay untouched until a lookup asks for them.
//!
//! # Reading
//! ```no_run
//! use tesfile::{bsa::Archive, prelude::*};
//! use std::path::Path;
//!
//! fn example() -> Option<()> {
//!     let path = Path::new("path/to/skyrim/Data/Skyrim - Misc.bsa");
//!     let archive = Archive::read(path).ok()?;
//!     let payload = archive
//!         .file_by_path("Strings", "Skyrim_English.strings")
//!         .ok()?;
//!     println!("{} bytes", payload.len());
//!     Some(())
//! }
//! ```

mod archive;
mod hashing;

pub use self::{
    archive::{Archive, Folder},
    hashing::hash_path,
};

use bstr::BString;
use lzzzz::lz4f;
use std::io;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid magic read from archive header: {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("folder name {name} hashes to {actual:#018x}, but the folder record stores {expected:#018x}")]
    FolderHashMismatch {
        name: BString,
        expected: u64,
        actual: u64,
    },

    #[error("folder record {index} places its name table outside the archive")]
    BadFolderOffset { index: usize },

    #[error("folder {0} not found in the archive")]
    FolderNotFound(BString),

    #[error("file {name} not found under folder {folder}")]
    FileNotFound { folder: BString, name: BString },

    #[error("the header declares {names} file names, but the folder records hold {slots} files")]
    FileNameListMismatch { names: usize, slots: usize },

    #[error("file {name} is smaller than its embedded-name and length prefixes")]
    TruncatedPayload { name: BString },

    #[error("buffer failed to decompress to the expected size... expected {expected} bytes, but got {actual} bytes")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error("file {name} failed to decompress")]
    Decompress { name: BString, source: io::Error },

    #[error(transparent)]
    Lz4(#[from] lz4f::Error),

    #[error(transparent)]
    Read(#[from] crate::ReadError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// The archive version.
///
/// Each version shifts the abi of the folder-record table and picks the codec
/// compressed payloads use.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    #[default]
    v104 = 104,
    v105 = 105,
}

impl Version {
    /// Fallout 3, Fallout: New Vegas, and The Elder Scrolls V: Skyrim.
    pub const TES5: Self = Self::v104;
    /// The Elder Scrolls V: Skyrim - Special Edition.
    pub const SSE: Self = Self::v105;
}

bitflags::bitflags! {
    /// The archive-wide flag word.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Flags: u32 {
        const DIRECTORY_STRINGS = 1 << 0;
        const FILE_STRINGS = 1 << 1;
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        const EMBEDDED_FILE_NAMES = 1 << 8;
        const XBOX_COMPRESSED = 1 << 9;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::DIRECTORY_STRINGS | Self::FILE_STRINGS
    }
}

impl Flags {
    #[must_use]
    pub fn directory_strings(&self) -> bool {
        self.contains(Self::DIRECTORY_STRINGS)
    }

    #[must_use]
    pub fn file_strings(&self) -> bool {
        self.contains(Self::FILE_STRINGS)
    }

    /// Whether files are compressed unless their record flips the bit.
    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn embedded_file_names(&self) -> bool {
        self.contains(Self::EMBEDDED_FILE_NAMES)
    }
}

bitflags::bitflags! {
    /// Markers for the kinds of content an archive carries.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Types: u16 {
        const MESHES = 1 << 0;
        const TEXTURES = 1 << 1;
        const MENUS = 1 << 2;
        const SOUNDS = 1 << 3;
        const VOICES = 1 << 4;
        const SHADERS = 1 << 5;
        const TREES = 1 << 6;
        const FONTS = 1 << 7;
        const MISC = 1 << 8;
    }
}

impl Types {
    #[must_use]
    pub fn contains_meshes(&self) -> bool {
        self.contains(Self::MESHES)
    }

    #[must_use]
    pub fn contains_textures(&self) -> bool {
        self.contains(Self::TEXTURES)
    }
}
