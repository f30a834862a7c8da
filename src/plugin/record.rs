use crate::{
    io,
    plugin::{field, Error, Field, FormId, RecordFlags, Result},
    Tag,
};
use core::cell::{OnceCell, RefCell};
use flate2::write::ZlibDecoder;
use std::{collections::BTreeMap, io::Write as _};

/// The size in bytes of a record header.
pub(crate) const HEADER_SIZE: usize = 24;

pub(crate) const GROUP: Tag = Tag::new(b"GRUP");

pub(crate) fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn tag_at(bytes: &[u8], offset: usize) -> Tag {
    Tag::from([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// The fixed 24-byte header preceding a record's content.
#[derive(Clone, Copy, Debug)]
pub struct RecordHeader {
    pub tag: Tag,
    pub size: u32,
    pub flags: RecordFlags,
    pub form_id: FormId,
    pub vc_info: u32,
    pub version: u16,
    pub unknown: u16,
}

impl RecordHeader {
    pub(crate) fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = io::slice_at(data, offset, HEADER_SIZE)?;
        let tag = tag_at(header, 0);
        if !tag.is_ascii() {
            return Err(Error::InvalidRecordTag {
                offset,
                tag: *tag.as_bytes(),
            });
        }
        Ok(Self {
            tag,
            size: u32_at(header, 4),
            flags: RecordFlags::from_bits_truncate(u32_at(header, 8)),
            form_id: FormId(u32_at(header, 12)),
            vc_info: u32_at(header, 16),
            version: u16_at(header, 20),
            unknown: u16_at(header, 22),
        })
    }
}

#[derive(Default, Debug)]
struct Scan {
    by_name: BTreeMap<Tag, Vec<u32>>,
    by_offset: Vec<(u32, Tag)>,
    frontier: u32,
    complete: bool,
}

impl Scan {
    fn register(&mut self, tag: Tag, pos: u32) {
        self.by_name.entry(tag).or_default().push(pos);
        self.by_offset.push((pos, tag));
    }
}

/// A record: a tagged block of fields, decoded lazily.
///
/// Field offsets are discovered by a forward scan whose frontier only ever
/// advances; every field passed over on the way to a query's target is
/// memoized, so across any sequence of queries the content bytes are visited
/// at most once. Once the frontier reaches the end, lookups of tags never
/// seen answer without touching the content again.
#[derive(Debug)]
pub struct Record<'bytes> {
    header: RecordHeader,
    offset: usize,
    raw: &'bytes [u8],
    decompressed: OnceCell<Vec<u8>>,
    scan: RefCell<Scan>,
}

impl<'bytes> Record<'bytes> {
    /// Decodes the record header at `offset` and captures its content range.
    pub(crate) fn parse(data: &'bytes [u8], offset: usize) -> Result<Self> {
        let header = RecordHeader::parse(data, offset)?;
        let raw = io::slice_at(data, offset + HEADER_SIZE, header.size as usize)?;
        Ok(Self {
            header,
            offset,
            raw,
            decompressed: OnceCell::new(),
            scan: RefCell::new(Scan::default()),
        })
    }

    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    #[must_use]
    pub fn tag(&self) -> Tag {
        self.header.tag
    }

    /// The declared content size, excluding the 24-byte header.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.header.size
    }

    /// The absolute offset of the record header within its file.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn flags(&self) -> RecordFlags {
        self.header.flags
    }

    #[must_use]
    pub fn form_id(&self) -> FormId {
        self.header.form_id
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.header.flags.is_compressed()
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.header.flags.is_deleted()
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.header.flags.is_disabled()
    }

    /// The record's content, inflating it on first access if the compressed
    /// flag is set. The decompressed buffer is computed once and kept.
    pub fn content(&self) -> Result<&[u8]> {
        if !self.is_compressed() {
            return Ok(self.raw);
        }
        if let Some(buffer) = self.decompressed.get() {
            return Ok(buffer);
        }
        let buffer = self.decompress()?;
        Ok(self.decompressed.get_or_init(|| buffer))
    }

    fn decompress(&self) -> Result<Vec<u8>> {
        let Some((prefix, stream)) = self.raw.split_first_chunk::<4>() else {
            return Err(Error::TruncatedCompressedContent {
                record: self.header.tag,
            });
        };
        let expected = u32::from_le_bytes(*prefix) as usize;
        let mut decoder = ZlibDecoder::new(Vec::with_capacity(expected));
        let inflate = |e| Error::Decompress {
            record: self.header.tag,
            source: e,
        };
        decoder.write_all(stream).map_err(inflate)?;
        let out = decoder.finish().map_err(inflate)?;
        if out.len() == expected {
            Ok(out)
        } else {
            Err(Error::DecompressionSizeMismatch {
                expected,
                actual: out.len(),
            })
        }
    }

    /// Returns the first field carrying `tag`, scanning forward from the
    /// current frontier only as far as needed.
    pub fn field_by_tag(&self, tag: Tag) -> Result<Field<'_>> {
        let content = self.content()?;
        let cached = self
            .scan
            .borrow()
            .by_name
            .get(&tag)
            .and_then(|positions| positions.first().copied());
        if let Some(pos) = cached {
            return Ok(Self::field_at(content, pos as usize));
        }
        loop {
            match self.scan_next(content)? {
                Some((found, pos)) if found == tag => {
                    return Ok(Self::field_at(content, pos as usize))
                }
                Some(_) => {}
                None => {
                    return Err(Error::FieldNotFound {
                        record: self.header.tag,
                        tag,
                    })
                }
            }
        }
    }

    /// All fields carrying `tag`, in on-disk order: cached occurrences first,
    /// then any found by resuming the scan.
    #[must_use]
    pub fn fields_by_tag(&self, tag: Tag) -> FieldsByTag<'_, 'bytes> {
        FieldsByTag {
            record: self,
            tag,
            index: 0,
            done: false,
        }
    }

    /// Every field of the record, in on-disk order. Drives the scan to
    /// completion; iterating again replays the cache without re-reading.
    #[must_use]
    pub fn fields(&self) -> Fields<'_, 'bytes> {
        Fields {
            record: self,
            index: 0,
            done: false,
        }
    }

    /// The `EDID` field decoded as text, or `None` when the record has none.
    pub fn editor_id(&self) -> Result<Option<String>> {
        self.optional_text(Tag::new(b"EDID"))
    }

    /// The `FULL` field decoded as text, or `None` when the record has none.
    pub fn full_name(&self) -> Result<Option<String>> {
        self.optional_text(Tag::new(b"FULL"))
    }

    pub(crate) fn optional_text(&self, tag: Tag) -> Result<Option<String>> {
        match self.field_by_tag(tag) {
            Ok(field) => Ok(Some(field.as_zstring()?)),
            Err(Error::FieldNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn field_at<'content>(content: &'content [u8], pos: usize) -> Field<'content> {
        let size = u16_at(content, pos + 4) as usize;
        Field {
            tag: tag_at(content, pos),
            data: &content[pos + field::HEADER_SIZE..pos + field::HEADER_SIZE + size],
        }
    }

    /// Advances the scan frontier over exactly one field, memoizing it.
    fn scan_next(&self, content: &[u8]) -> Result<Option<(Tag, u32)>> {
        let mut scan = self.scan.borrow_mut();
        if scan.complete {
            return Ok(None);
        }
        let pos = scan.frontier as usize;
        if pos >= content.len() {
            scan.complete = true;
            return Ok(None);
        }
        let header = io::slice_at(content, pos, field::HEADER_SIZE)?;
        let tag = tag_at(header, 0);
        if !tag.is_ascii() {
            return Err(Error::InvalidFieldTag {
                offset: pos,
                tag: *tag.as_bytes(),
            });
        }
        let size = u16_at(header, 4) as usize;
        io::slice_at(content, pos + field::HEADER_SIZE, size)?;
        let end = pos + field::HEADER_SIZE + size;
        scan.register(tag, pos as u32);
        scan.frontier = end as u32;
        if end == content.len() {
            scan.complete = true;
        }
        Ok(Some((tag, pos as u32)))
    }
}

/// Iterator over every occurrence of one tag; see [`Record::fields_by_tag`].
pub struct FieldsByTag<'this, 'bytes> {
    record: &'this Record<'bytes>,
    tag: Tag,
    index: usize,
    done: bool,
}

impl<'this, 'bytes> Iterator for FieldsByTag<'this, 'bytes> {
    type Item = Result<Field<'this>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let content = match self.record.content() {
            Ok(content) => content,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        loop {
            let cached = self
                .record
                .scan
                .borrow()
                .by_name
                .get(&self.tag)
                .and_then(|positions| positions.get(self.index).copied());
            if let Some(pos) = cached {
                self.index += 1;
                return Some(Ok(Record::field_at(content, pos as usize)));
            }
            match self.record.scan_next(content) {
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Iterator over every field in on-disk order; see [`Record::fields`].
pub struct Fields<'this, 'bytes> {
    record: &'this Record<'bytes>,
    index: usize,
    done: bool,
}

impl<'this, 'bytes> Iterator for Fields<'this, 'bytes> {
    type Item = Result<Field<'this>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let content = match self.record.content() {
            Ok(content) => content,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        loop {
            let cached = self
                .record
                .scan
                .borrow()
                .by_offset
                .get(self.index)
                .copied();
            if let Some((pos, _)) = cached {
                self.index += 1;
                return Some(Ok(Record::field_at(content, pos as usize)));
            }
            match self.record.scan_next(content) {
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
