use crate::{
    bsa::{hashing, Error, Flags, Result, Types, Version},
    containers::Bytes,
    derive,
    io::{self, Cursor},
};
use bstr::{BStr, BString, ByteSlice as _};
use flate2::write::ZlibDecoder;
use lzzzz::lz4f;
use std::{borrow::Cow, collections::BTreeMap, io::Write as _};

mod constants {
    use crate::tag;

    pub const BSA: u32 = tag::make_four(b"BSA");

    pub const FILE_ENTRY_SIZE: usize = 0x10;

    pub const FILE_FLAG_COMPRESSION: u32 = 1 << 30;
    pub const FILE_FLAG_CHECKED: u32 = 1 << 31;
}

/// One folder of the archive: its hash, decoded name, and the file names
/// assigned to it, in file-record order.
pub struct Folder {
    name: BString,
    hash: u64,
    file_names: Vec<BString>,
    file_records_offset: usize,
}

impl Folder {
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn file_names(&self) -> impl Iterator<Item = &BStr> {
        self.file_names.iter().map(|name| name.as_bstr())
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.file_names.len()
    }
}

struct FileRecord {
    size: u32,
    offset: u32,
    compression_flipped: bool,
}

/// An open `BSA` archive.
///
/// Folder and file tables are decoded and integrity-checked at read time;
/// payload bytes are only touched by [`Self::file_by_path`].
pub struct Archive<'bytes> {
    bytes: Bytes<'bytes>,
    version: Version,
    flags: Flags,
    types: Types,
    folders: Vec<Folder>,
    by_hash: BTreeMap<u64, usize>,
}

derive::reader!(Archive);

impl<'bytes> Archive<'bytes> {
    fn do_read(bytes: Bytes<'bytes>) -> Result<Self> {
        let (version, flags, types, folders) = Self::parse(bytes.as_bytes())?;
        let by_hash = folders
            .iter()
            .enumerate()
            .map(|(index, folder)| (folder.hash, index))
            .collect();
        Ok(Self {
            bytes,
            version,
            flags,
            types,
            folders,
            by_hash,
        })
    }

    fn parse(data: &[u8]) -> Result<(Version, Flags, Types, Vec<Folder>)> {
        let mut source = Cursor::new(data);

        let magic = source.read_u32()?;
        if magic != constants::BSA {
            return Err(Error::InvalidMagic(magic));
        }
        let version = match source.read_u32()? {
            104 => Version::v104,
            105 => Version::v105,
            unsupported => return Err(Error::UnsupportedVersion(unsupported)),
        };
        let folder_table_offset = source.read_u32()?;
        let flags = Flags::from_bits_truncate(source.read_u32()?);
        let folder_count = source.read_u32()? as usize;
        let file_count = source.read_u32()? as usize;
        let _folder_names_len = source.read_u32()?;
        let file_names_len = source.read_u32()? as usize;
        let types = Types::from_bits_truncate(source.read_u16()?);

        source.seek_absolute(folder_table_offset as usize);
        let mut entries = Vec::with_capacity(folder_count);
        for _ in 0..folder_count {
            let hash = source.read_u64()?;
            let count = source.read_u32()? as usize;
            let offset = match version {
                Version::v104 => source.read_u32()?,
                Version::v105 => {
                    source.seek_relative(4);
                    let offset = source.read_u32()?;
                    source.seek_relative(4);
                    offset
                }
            };
            entries.push((hash, count, offset));
        }

        let mut folders = Vec::with_capacity(folder_count);
        let mut slots = 0usize;
        for (index, (hash, count, offset)) in entries.into_iter().enumerate() {
            // the bzstring name sits file_names_len bytes before the offset
            // the record declares, immediately ahead of the file records
            let name_pos = (offset as usize)
                .checked_sub(file_names_len)
                .ok_or(Error::BadFolderOffset { index })?;
            source.seek_absolute(name_pos);
            let name = source.read_bzstring()?;
            let file_records_offset = source.pos();

            let actual = hashing::hash_normalized(name);
            if actual != hash {
                return Err(Error::FolderHashMismatch {
                    name: name.to_owned(),
                    expected: hash,
                    actual,
                });
            }

            slots += count;
            folders.push((
                Folder {
                    name: name.to_owned(),
                    hash,
                    file_names: Vec::with_capacity(count),
                    file_records_offset,
                },
                count,
            ));
        }

        if slots != file_count {
            return Err(Error::FileNameListMismatch {
                names: file_count,
                slots,
            });
        }

        // the flat file-name list follows the last folder's file records;
        // partition it across folders in table order
        let names_start = folders
            .last()
            .map(|(folder, count)| folder.file_records_offset + count * constants::FILE_ENTRY_SIZE);
        if let Some(start) = names_start {
            source.seek_absolute(start);
            for (folder, count) in &mut folders {
                for _ in 0..*count {
                    folder.file_names.push(source.read_zstring()?.to_owned());
                }
            }
        }

        Ok((
            version,
            flags,
            types,
            folders.into_iter().map(|(folder, _)| folder).collect(),
        ))
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn types(&self) -> Types {
        self.types
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Folders in table order.
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.iter()
    }

    #[must_use]
    pub fn folder_by_hash(&self, hash: u64) -> Option<&Folder> {
        self.by_hash.get(&hash).map(|&index| &self.folders[index])
    }

    /// Looks a folder up by path, case-insensitively.
    pub fn folder<P>(&self, path: P) -> Result<&Folder>
    where
        P: AsRef<[u8]>,
    {
        let mut normalized = BString::from(path.as_ref());
        hashing::normalize_path(&mut normalized);
        self.folder_by_hash(hashing::hash_normalized(&normalized))
            .ok_or(Error::FolderNotFound(normalized))
    }

    /// Resolves a folder-and-file-name pair to the file's payload, inflating
    /// it when its net compression state says so. Uncompressed payloads are
    /// borrowed straight from the mapping.
    pub fn file_by_path<P, N>(&self, folder_path: P, file_name: N) -> Result<Cow<'_, [u8]>>
    where
        P: AsRef<[u8]>,
        N: AsRef<[u8]>,
    {
        let folder = self.folder(folder_path)?;
        let file_name = file_name.as_ref();
        let index = folder
            .file_names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(file_name))
            .ok_or_else(|| Error::FileNotFound {
                folder: folder.name.clone(),
                name: file_name.into(),
            })?;
        let record = self.file_record(folder, index)?;
        self.file_payload(folder.file_names[index].as_bstr(), &record)
    }

    /// Reads `len` bytes at the absolute file offset `offset`.
    pub fn read_range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        Ok(io::slice_at(self.bytes.as_bytes(), offset, len)?)
    }

    fn file_record(&self, folder: &Folder, index: usize) -> Result<FileRecord> {
        let mut source = Cursor::new(self.bytes.as_bytes());
        source.seek_absolute(folder.file_records_offset + index * constants::FILE_ENTRY_SIZE);
        let _hash = source.read_u64()?;
        let size = source.read_u32()?;
        let offset = source.read_u32()?;
        Ok(FileRecord {
            size: size & !(constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED),
            offset,
            compression_flipped: (size & constants::FILE_FLAG_COMPRESSION) != 0,
        })
    }

    fn file_payload(&self, name: &BStr, record: &FileRecord) -> Result<Cow<'_, [u8]>> {
        let mut source = Cursor::new(self.bytes.as_bytes());
        source.seek_absolute(record.offset as usize);
        let mut size = record.size as usize;

        if self.flags.embedded_file_names() {
            let embedded = source.read_bstring()?;
            size = size
                .checked_sub(embedded.len() + 1)
                .ok_or_else(|| Error::TruncatedPayload {
                    name: name.to_owned(),
                })?;
        }

        let compressed = self.flags.compressed() != record.compression_flipped;
        if !compressed {
            return Ok(Cow::Borrowed(source.read_bytes(size)?));
        }

        let expected = source.read_u32()? as usize;
        size = size
            .checked_sub(4)
            .ok_or_else(|| Error::TruncatedPayload {
                name: name.to_owned(),
            })?;
        let stream = source.read_bytes(size)?;

        let out = match self.version {
            Version::v104 => decompress_zlib(name, stream, expected)?,
            Version::v105 => decompress_lz4(stream, expected)?,
        };
        if out.len() == expected {
            Ok(Cow::Owned(out))
        } else {
            Err(Error::DecompressionSizeMismatch {
                expected,
                actual: out.len(),
            })
        }
    }
}

fn decompress_zlib(name: &BStr, stream: &[u8], expected: usize) -> Result<Vec<u8>> {
    let inflate = |e| Error::Decompress {
        name: name.to_owned(),
        source: e,
    };
    let mut decoder = ZlibDecoder::new(Vec::with_capacity(expected));
    decoder.write_all(stream).map_err(inflate)?;
    decoder.finish().map_err(inflate)
}

fn decompress_lz4(stream: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    lz4f::decompress_to_vec(stream, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use crate::{
        bsa::{hash_path, Archive, Error, Flags, Types, Version},
        Borrowed, Reader as _,
    };
    use flate2::{write::ZlibEncoder, Compression};
    use lzzzz::lz4f;
    use std::{io::Write as _, path::Path};

    const FILE_FLAG_COMPRESSION: u32 = 1 << 30;

    struct FixtureFile {
        name: &'static str,
        stored: Vec<u8>,
        size_bits: u32,
    }

    impl FixtureFile {
        fn raw(name: &'static str, payload: &[u8]) -> Self {
            Self {
                name,
                stored: payload.to_vec(),
                size_bits: 0,
            }
        }

        /// Stores a zlib stream with its decompressed-length prefix and the
        /// per-file compression flip set.
        fn zlib(name: &'static str, payload: &[u8]) -> Self {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload).unwrap();
            let mut stored = u32::try_from(payload.len()).unwrap().to_le_bytes().to_vec();
            stored.extend_from_slice(&encoder.finish().unwrap());
            Self {
                name,
                stored,
                size_bits: FILE_FLAG_COMPRESSION,
            }
        }

        fn lz4(name: &'static str, payload: &[u8]) -> Self {
            let mut stream = Vec::new();
            lz4f::compress_to_vec(payload, &mut stream, &lz4f::Preferences::default()).unwrap();
            let mut stored = u32::try_from(payload.len()).unwrap().to_le_bytes().to_vec();
            stored.extend_from_slice(&stream);
            Self {
                name,
                stored,
                size_bits: FILE_FLAG_COMPRESSION,
            }
        }
    }

    fn build(version: u32, flags: u32, folders: &[(&str, Vec<FixtureFile>)]) -> Vec<u8> {
        let folder_entry_size = if version >= 105 { 0x18 } else { 0x10 };
        let file_names_len: usize = folders
            .iter()
            .flat_map(|(_, files)| files)
            .map(|file| file.name.len() + 1)
            .sum();
        let folder_names_len: usize = folders.iter().map(|(name, _)| name.len() + 1).sum();
        let file_count: usize = folders.iter().map(|(_, files)| files.len()).sum();

        // name + file-record blocks follow the folder table
        let mut block_pos = 36 + folders.len() * folder_entry_size;
        let mut name_positions = Vec::new();
        for (name, files) in folders {
            name_positions.push(block_pos);
            block_pos += 1 + name.len() + 1 + files.len() * 0x10;
        }
        let file_name_block = block_pos;
        let mut payload_pos = file_name_block + file_names_len;

        let mut out = Vec::new();
        out.extend_from_slice(b"BSA\0");
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&36u32.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&u32::try_from(folders.len()).unwrap().to_le_bytes());
        out.extend_from_slice(&u32::try_from(file_count).unwrap().to_le_bytes());
        out.extend_from_slice(&u32::try_from(folder_names_len).unwrap().to_le_bytes());
        out.extend_from_slice(&u32::try_from(file_names_len).unwrap().to_le_bytes());
        out.extend_from_slice(&Types::MISC.bits().to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        for ((name, files), name_pos) in folders.iter().zip(&name_positions) {
            out.extend_from_slice(&hash_path(*name).to_le_bytes());
            out.extend_from_slice(&u32::try_from(files.len()).unwrap().to_le_bytes());
            let offset = u32::try_from(name_pos + file_names_len).unwrap();
            if version >= 105 {
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
            } else {
                out.extend_from_slice(&offset.to_le_bytes());
            }
        }

        for (name, files) in folders {
            out.push(u8::try_from(name.len() + 1).unwrap());
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            for file in files {
                out.extend_from_slice(&hash_path(file.name).to_le_bytes());
                let size = u32::try_from(file.stored.len()).unwrap() | file.size_bits;
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(&u32::try_from(payload_pos).unwrap().to_le_bytes());
                payload_pos += file.stored.len();
            }
        }

        for (_, files) in folders {
            for file in files {
                out.extend_from_slice(file.name.as_bytes());
                out.push(0);
            }
        }

        for (_, files) in folders {
            for file in files {
                out.extend_from_slice(&file.stored);
            }
        }

        out
    }

    fn sample() -> Vec<u8> {
        build(
            104,
            Flags::default().bits(),
            &[
                (
                    "meshes\\armor",
                    vec![
                        FixtureFile::raw("iron.nif", b"IRON GEOMETRY\0"),
                        FixtureFile::raw("steel.nif", b"STEEL GEOMETRY\0"),
                    ],
                ),
                ("strings", vec![FixtureFile::raw("skyrim_en.strings", b"STR\0")]),
            ],
        )
    }

    #[test]
    fn loads_and_resolves_by_path() -> anyhow::Result<()> {
        let data = sample();
        let bsa = Archive::read(Borrowed(&data))?;

        assert_eq!(bsa.version(), Version::v104);
        assert_eq!(bsa.len(), 2);
        assert!(bsa.types().contains(Types::MISC));

        // lookups are case-insensitive and separator-normalized
        let payload = bsa.file_by_path("Meshes/Armor", "Iron.NIF")?;
        assert_eq!(payload.as_ref(), b"IRON GEOMETRY\0");
        let payload = bsa.file_by_path("meshes\\armor", "steel.nif")?;
        assert_eq!(payload.as_ref(), b"STEEL GEOMETRY\0");
        Ok(())
    }

    #[test]
    fn folder_views_expose_names_in_order() -> anyhow::Result<()> {
        let data = sample();
        let bsa = Archive::read(Borrowed(&data))?;

        let folder = bsa.folder("MESHES/ARMOR")?;
        assert_eq!(folder.name(), "meshes\\armor");
        assert_eq!(folder.file_count(), 2);
        let names: Vec<_> = folder.file_names().collect();
        assert_eq!(names, ["iron.nif", "steel.nif"]);
        assert_eq!(bsa.folder_by_hash(folder.hash()).map(|f| f.name()), Some(folder.name()));
        Ok(())
    }

    #[test]
    fn v105_folder_records_are_24_bytes_wide() -> anyhow::Result<()> {
        let data = build(
            105,
            Flags::default().bits(),
            &[("textures", vec![FixtureFile::raw("a.dds", b"DDS")])],
        );
        let bsa = Archive::read(Borrowed(&data))?;
        assert_eq!(bsa.version(), Version::v105);
        assert_eq!(bsa.file_by_path("textures", "a.dds")?.as_ref(), b"DDS");
        Ok(())
    }

    #[test]
    fn invalid_magic() {
        let mut data = sample();
        data[..4].copy_from_slice(b"BSB\0");
        match Archive::read(Borrowed(&data)) {
            Err(Error::InvalidMagic(0x0042_5342)) => {}
            Err(err) => panic!("expected InvalidMagic, got {err}"),
            Ok(_) => panic!("read should have failed"),
        }
    }

    #[test]
    fn unsupported_versions_are_distinct_from_bad_magic() {
        for version in [103u32, 106] {
            let mut data = sample();
            data[4..8].copy_from_slice(&version.to_le_bytes());
            match Archive::read(Borrowed(&data)) {
                Err(Error::UnsupportedVersion(found)) => assert_eq!(found, version),
                Err(err) => panic!("expected UnsupportedVersion, got {err}"),
                Ok(_) => panic!("read should have failed"),
            }
        }
    }

    #[test]
    fn corrupt_folder_hashes_fail_loudly() {
        let mut data = sample();
        // flip a byte of the first folder record's stored hash
        data[36] ^= 0xFF;
        match Archive::read(Borrowed(&data)) {
            Err(Error::FolderHashMismatch {
                name,
                expected,
                actual,
            }) => {
                assert_eq!(name, "meshes\\armor");
                assert_ne!(expected, actual);
                assert_eq!(actual, hash_path("meshes\\armor"));
            }
            Err(err) => panic!("expected FolderHashMismatch, got {err}"),
            Ok(_) => panic!("read should have failed"),
        }
    }

    #[test]
    fn file_name_count_must_match_folder_slots() {
        let mut data = sample();
        // bump the header's file count past what the folder records hold
        let declared = u32::from_le_bytes(data[20..24].try_into().unwrap());
        data[20..24].copy_from_slice(&(declared + 1).to_le_bytes());
        match Archive::read(Borrowed(&data)) {
            Err(Error::FileNameListMismatch { names, slots }) => {
                assert_eq!(names, declared as usize + 1);
                assert_eq!(slots, declared as usize);
            }
            Err(err) => panic!("expected FileNameListMismatch, got {err}"),
            Ok(_) => panic!("read should have failed"),
        }
    }

    #[test]
    fn missing_folders_and_files_are_not_found() -> anyhow::Result<()> {
        let data = sample();
        let bsa = Archive::read(Borrowed(&data))?;

        match bsa.file_by_path("Sounds", "boom.wav") {
            Err(Error::FolderNotFound(name)) => assert_eq!(name, "sounds"),
            other => panic!("expected FolderNotFound, got {other:?}"),
        }
        match bsa.file_by_path("Strings", "Missing.txt") {
            Err(Error::FileNotFound { folder, name }) => {
                assert_eq!(folder, "strings");
                assert_eq!(name, "Missing.txt");
            }
            other => panic!("expected FileNotFound, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn per_file_compression_flip_inflates_zlib() -> anyhow::Result<()> {
        let payload = b"a payload long enough to be worth deflating, repeated and repeated";
        let data = build(
            104,
            Flags::default().bits(),
            &[("misc", vec![FixtureFile::zlib("blob.bin", payload)])],
        );
        let bsa = Archive::read(Borrowed(&data))?;
        let resolved = bsa.file_by_path("misc", "blob.bin")?;
        assert_eq!(resolved.as_ref(), payload);
        Ok(())
    }

    #[test]
    fn archive_default_compression_xors_with_the_flip() -> anyhow::Result<()> {
        // default-compressed archive, flip set: net state is uncompressed
        let mut file = FixtureFile::raw("plain.bin", b"NOT DEFLATED");
        file.size_bits = FILE_FLAG_COMPRESSION;
        let data = build(
            104,
            (Flags::default() | Flags::COMPRESSED).bits(),
            &[("misc", vec![file])],
        );
        let bsa = Archive::read(Borrowed(&data))?;
        assert_eq!(bsa.file_by_path("misc", "plain.bin")?.as_ref(), b"NOT DEFLATED");
        Ok(())
    }

    #[test]
    fn v105_compressed_payloads_use_lz4() -> anyhow::Result<()> {
        let payload = b"sse archives wrap their payloads in lz4 frames instead of zlib";
        let data = build(
            105,
            Flags::default().bits(),
            &[("misc", vec![FixtureFile::lz4("blob.bin", payload)])],
        );
        let bsa = Archive::read(Borrowed(&data))?;
        assert_eq!(bsa.file_by_path("misc", "blob.bin")?.as_ref(), payload);
        Ok(())
    }

    #[test]
    fn wrong_decompressed_length_prefix_fails() -> anyhow::Result<()> {
        let mut file = FixtureFile::zlib("blob.bin", b"some payload to deflate");
        file.stored[..4].copy_from_slice(&999u32.to_le_bytes());
        let data = build(104, Flags::default().bits(), &[("misc", vec![file])]);
        let bsa = Archive::read(Borrowed(&data))?;
        assert!(matches!(
            bsa.file_by_path("misc", "blob.bin"),
            Err(Error::DecompressionSizeMismatch { expected: 999, .. })
        ));
        Ok(())
    }

    #[test]
    fn embedded_file_names_are_skipped() -> anyhow::Result<()> {
        let mut stored = Vec::new();
        let embedded = b"misc\\readme.txt";
        stored.push(u8::try_from(embedded.len()).unwrap());
        stored.extend_from_slice(embedded);
        stored.extend_from_slice(b"ACTUAL BYTES");
        let file = FixtureFile {
            name: "readme.txt",
            stored,
            size_bits: 0,
        };
        let data = build(
            104,
            (Flags::default() | Flags::EMBEDDED_FILE_NAMES).bits(),
            &[("misc", vec![file])],
        );
        let bsa = Archive::read(Borrowed(&data))?;
        assert_eq!(bsa.file_by_path("misc", "readme.txt")?.as_ref(), b"ACTUAL BYTES");
        Ok(())
    }

    #[test]
    fn read_range_is_bounds_checked() -> anyhow::Result<()> {
        let data = sample();
        let bsa = Archive::read(Borrowed(&data))?;
        assert_eq!(bsa.read_range(0, 4)?, b"BSA\0");
        assert!(bsa.read_range(data.len() - 2, 4).is_err());
        Ok(())
    }

    #[test]
    fn missing_files_surface_not_found() {
        let path = Path::new("data/does_not_exist.bsa");
        match Archive::read(path) {
            Err(Error::Io(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
            }
            Err(err) => panic!("expected a NotFound io error, got {err}"),
            Ok(_) => panic!("read should have failed"),
        }
    }
}
