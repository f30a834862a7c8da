//! Lazy readers for the two container formats used by Bethesda's engine: [`plugin`] files
//! (`.esp`/`.esm`/`.esl`, nested self-describing records) and [`bsa`] resource archives
//! (folder/file tables indexed by a 64-bit path hash). Both are decoded on demand over a
//! read-only memory mapping; nothing is copied until a payload actually needs inflating.

#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(
    unknown_lints,
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::struct_field_names
)]

mod containers;
mod derive;
mod guess;
mod io;
mod tag;
mod text;

pub mod bsa;
pub mod plugin;

pub use guess::{guess_format, FileFormat};
pub use io::ReadError;
pub use tag::Tag;
pub use text::DecodeError;

/// Makes a shallow copy of the input.
///
/// The lifetime of the result is tied to the input buffer.
pub struct Borrowed<'borrow>(pub &'borrow [u8]);

mod private {
    pub trait Sealed {}
}

use private::Sealed;

/// A trait that enables reading from various sources.
pub trait Reader<T>: Sealed {
    type Error;

    /// Reads an instance of `Self` from the given source.
    fn read(source: T) -> core::result::Result<Self, Self::Error>
    where
        Self: Sized;
}

pub use bstr::{BStr, BString, ByteSlice, ByteVec};

/// Convenience using statements for traits that are needed to work with the library.
pub mod prelude {
    pub use crate::Reader as _;
}
