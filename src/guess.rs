use crate::tag;
use core::mem;
use std::io::Read;

/// The container format a file appears to hold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileFormat {
    /// A master/plugin file (`.esm`/`.esp`/`.esl`).
    Plugin,
    /// A `BSA` resource archive.
    Archive,
}

const TES4: u32 = tag::make_four(b"TES4");
const BSA: u32 = tag::make_four(b"BSA");

/// Guesses the file format from its leading magic. Returns `None` when the
/// magic matches neither format or the source is too short.
#[allow(clippy::module_name_repetitions)]
pub fn guess_format<In>(source: &mut In) -> Option<FileFormat>
where
    In: ?Sized + Read,
{
    let mut buf = [0u8; mem::size_of::<u32>()];
    source.read_exact(&mut buf).ok()?;
    let magic = u32::from_le_bytes(buf);
    match magic {
        TES4 => Some(FileFormat::Plugin),
        BSA => Some(FileFormat::Archive),
        _ => None,
    }
}
