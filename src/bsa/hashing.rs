use bstr::{BStr, BString};

// Recognized extensions each contribute a distinct bit to the low half.
// Anything else stays part of the base name.
const EXTENSIONS: [(&[u8], u32); 4] = [
    (b".kf", 0x80),
    (b".nif", 0x8000),
    (b".dds", 0x8080),
    (b".wav", 0x8000_0000),
];

const MULTIPLIER: u32 = 0x1003F;

pub(crate) fn normalize_path(path: &mut BString) {
    for b in path.iter_mut() {
        if *b == b'/' {
            *b = b'\\';
        } else {
            b.make_ascii_lowercase();
        }
    }

    while path.last().is_some_and(|&x| x == b'\\') {
        path.pop();
    }

    while path.first().is_some_and(|&x| x == b'\\') {
        path.remove(0);
    }
}

fn running_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |hash, &b| {
        hash.wrapping_mul(MULTIPLIER).wrapping_add(b.into())
    })
}

fn split_extension(path: &[u8]) -> (&[u8], &[u8]) {
    for (extension, _) in EXTENSIONS {
        if path.ends_with(extension) {
            return path.split_at(path.len() - extension.len());
        }
    }
    (path, b"")
}

fn extension_bit(extension: &[u8]) -> Option<u32> {
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == extension)
        .map(|&(_, bit)| bit)
}

/// Computes the archive's 64-bit fingerprint of a path.
///
/// The path is lower-cased and separator-normalized first, so the result is a
/// pure, case-insensitive function of its input. The low half packs the base
/// name's last, second-to-last, and first bytes with its length and the
/// extension marker; the high half sums the `0x1003F` polynomial over the
/// base's interior bytes and over the extension. Bit-exact with the hashes
/// archives store on disk.
#[must_use]
pub fn hash_path<P>(path: P) -> u64
where
    P: AsRef<BStr>,
{
    let mut normalized: BString = path.as_ref().to_owned();
    normalize_path(&mut normalized);
    hash_normalized(&normalized)
}

pub(crate) fn hash_normalized(path: &[u8]) -> u64 {
    let (base, extension) = split_extension(path);
    let len = base.len();
    if len == 0 {
        return 0;
    }

    let mut low = u64::from(base[len - 1])
        | (if len > 2 { u64::from(base[len - 2]) } else { 0 }) << 8
        | (len as u64) << 16
        | u64::from(base[0]) << 24;
    if let Some(bit) = extension_bit(extension) {
        low |= u64::from(bit);
    }

    let interior = if len >= 3 { &base[1..len - 2] } else { &[][..] };
    let high = running_hash(interior).wrapping_add(running_hash(extension));

    (u64::from(high) << 32).wrapping_add(low)
}
