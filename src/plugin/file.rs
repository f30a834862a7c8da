use crate::{
    containers::Bytes,
    derive, io,
    plugin::{
        field::{Scalar, Value},
        record, Error, Record, RecordHeader, Records, Result,
    },
    Tag,
};

const MAGIC: Tag = Tag::new(b"TES4");
const HEDR: Tag = Tag::new(b"HEDR");
const CNAM: Tag = Tag::new(b"CNAM");
const SNAM: Tag = Tag::new(b"SNAM");
const MAST: Tag = Tag::new(b"MAST");

/// An open master/plugin file.
///
/// The root `TES4` record's well-known fields are decoded up front; everything
/// after it is only touched when a scan walks over it.
pub struct Plugin<'bytes> {
    bytes: Bytes<'bytes>,
    header: RecordHeader,
    version: f32,
    record_count: u32,
    next_object_id: u32,
    author: Option<String>,
    description: Option<String>,
    masters: Vec<String>,
}

derive::reader!(Plugin);

impl<'bytes> Plugin<'bytes> {
    fn do_read(bytes: Bytes<'bytes>) -> Result<Self> {
        let (header, version, record_count, next_object_id, author, description, masters) = {
            let data = bytes.as_bytes();
            let magic = io::slice_at(data, 0, 4)?;
            if magic != MAGIC.as_bytes() {
                return Err(Error::InvalidMagic(Tag::from([
                    magic[0], magic[1], magic[2], magic[3],
                ])));
            }

            let root = Record::parse(data, 0)?;
            let hedr = root.field_by_tag(HEDR)?;
            let decoded = hedr.decode()?;
            let (version, record_count, next_object_id) = match decoded {
                Value::Tuple(ref scalars) => match scalars[..] {
                    [Scalar::F32(version), Scalar::U32(count), Scalar::U32(next)] => {
                        (version, count, next)
                    }
                    _ => {
                        return Err(Error::FieldTooSmall {
                            tag: HEDR,
                            expected: 12,
                            actual: hedr.size(),
                        })
                    }
                },
                _ => {
                    return Err(Error::FieldTooSmall {
                        tag: HEDR,
                        expected: 12,
                        actual: hedr.size(),
                    })
                }
            };

            let author = root.optional_text(CNAM)?;
            let description = root.optional_text(SNAM)?;
            let masters = root
                .fields_by_tag(MAST)
                .map(|master| master?.as_zstring())
                .collect::<Result<Vec<_>>>()?;

            (
                *root.header(),
                version,
                record_count,
                next_object_id,
                author,
                description,
                masters,
            )
        };

        Ok(Self {
            bytes,
            header,
            version,
            record_count,
            next_object_id,
            author,
            description,
            masters,
        })
    }

    /// The root `TES4` record's header.
    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// Re-decodes the root record for direct field access.
    pub fn header_record(&self) -> Result<Record<'_>> {
        Record::parse(self.bytes.as_bytes(), 0)
    }

    /// The file-format version declared by `HEDR`.
    #[must_use]
    pub fn version(&self) -> f32 {
        self.version
    }

    /// The record count declared by `HEDR`. For a well-formed file this
    /// equals the number of records an unfiltered [`Self::records`] scan yields.
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    #[must_use]
    pub fn next_object_id(&self) -> u32 {
        self.next_object_id
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The master-file dependencies, in on-disk order.
    #[must_use]
    pub fn masters(&self) -> &[String] {
        &self.masters
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.header.flags.is_master()
    }

    #[must_use]
    pub fn is_light_master(&self) -> bool {
        self.header.flags.is_light_master()
    }

    /// Every record after the root, flattened across top-level groups.
    #[must_use]
    pub fn records(&self) -> Records<'_> {
        self.scan(None)
    }

    /// Every record of one type. Groups labeled with any other type are
    /// skipped by their declared size without decoding their interior.
    #[must_use]
    pub fn records_by_type(&self, tag: Tag) -> Records<'_> {
        self.scan(Some(tag))
    }

    /// Reads `len` bytes at the absolute file offset `offset`.
    pub fn read_range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        Ok(io::slice_at(self.bytes.as_bytes(), offset, len)?)
    }

    fn scan(&self, filter: Option<Tag>) -> Records<'_> {
        let data = self.bytes.as_bytes();
        let start = record::HEADER_SIZE + self.header.size as usize;
        Records::new(data, start, data.len(), filter)
    }
}
