use crate::{
    io,
    plugin::{
        record::{self, tag_at, u16_at, u32_at},
        Error, Record, Result,
    },
    Tag,
};

/// The header of a `GRUP` container. In place of a record's flag word and
/// form id it carries a label, a group kind, and versioning scraps; its
/// declared size covers the header itself plus every nested byte.
#[derive(Clone, Copy, Debug)]
pub struct GroupHeader {
    pub size: u32,
    pub label: [u8; 4],
    pub kind: u32,
    pub stamp: u16,
    pub version: u16,
    pub unknown: u32,
}

impl GroupHeader {
    pub(crate) fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = io::slice_at(data, offset, record::HEADER_SIZE)?;
        if tag_at(header, 0) != record::GROUP {
            return Err(Error::NotAGroup { offset });
        }
        let size = u32_at(header, 4);
        if (size as usize) < record::HEADER_SIZE {
            return Err(Error::BadGroupSize { offset, size });
        }
        Ok(Self {
            size,
            label: [header[8], header[9], header[10], header[11]],
            kind: u32_at(header, 12),
            stamp: u16_at(header, 16),
            version: u16_at(header, 18),
            unknown: u32_at(header, 20),
        })
    }

    /// Whether the label names a record type. Other kinds (cell blocks and
    /// the like) carry parent references instead.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.kind == 0
    }

    /// The record-type tag a top-level group contains. Labels of other group
    /// kinds are not interpreted here; the encoding is not record-type data
    /// and asking for it fails rather than returning something wrong.
    pub fn label(&self) -> Result<Tag> {
        if self.is_top_level() {
            Ok(Tag::from(self.label))
        } else {
            Err(Error::UnresolvedGroupLabel { kind: self.kind })
        }
    }
}

/// A decoded `GRUP` container.
pub struct Group<'bytes> {
    header: GroupHeader,
    offset: usize,
    data: &'bytes [u8],
}

impl<'bytes> Group<'bytes> {
    pub(crate) fn parse(data: &'bytes [u8], offset: usize) -> Result<Self> {
        let header = GroupHeader::parse(data, offset)?;
        io::slice_at(data, offset, header.size as usize)?;
        Ok(Self {
            header,
            offset,
            data,
        })
    }

    #[must_use]
    pub fn header(&self) -> &GroupHeader {
        &self.header
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn label(&self) -> Result<Tag> {
        self.header.label()
    }

    /// Every record nested under this group, flattened.
    #[must_use]
    pub fn records(&self) -> Records<'bytes> {
        Records::new(
            self.data,
            self.offset + record::HEADER_SIZE,
            self.offset + self.header.size as usize,
            None,
        )
    }
}

/// A flattening, pruning walk over a byte range of records and groups.
///
/// Top-level groups matching the filter (or all of them, without one) are
/// descended into; everything else is skipped by its declared size without
/// decoding the interior. That pruning is what keeps a type-filtered pass
/// over a large file cheap. The iterator fuses after yielding an error.
pub struct Records<'bytes> {
    data: &'bytes [u8],
    filter: Option<Tag>,
    pos: usize,
    end: usize,
    stack: Vec<(usize, usize)>,
    failed: bool,
}

impl<'bytes> Records<'bytes> {
    pub(crate) fn new(data: &'bytes [u8], pos: usize, end: usize, filter: Option<Tag>) -> Self {
        Self {
            data,
            filter,
            pos,
            end,
            stack: Vec::new(),
            failed: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<Record<'bytes>>> {
        self.failed = true;
        Some(Err(err))
    }
}

impl<'bytes> Iterator for Records<'bytes> {
    type Item = Result<Record<'bytes>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            while self.pos >= self.end {
                let (pos, end) = self.stack.pop()?;
                self.pos = pos;
                self.end = end;
            }

            let tag = match io::slice_at(self.data, self.pos, 4) {
                Ok(bytes) => tag_at(bytes, 0),
                Err(err) => return self.fail(err.into()),
            };

            if tag == record::GROUP {
                let header = match GroupHeader::parse(self.data, self.pos) {
                    Ok(header) => header,
                    Err(err) => return self.fail(err),
                };
                let size = header.size as usize;
                if self.pos + size > self.end {
                    return self.fail(Error::GroupTooLarge {
                        offset: self.pos,
                        size: header.size,
                        available: self.end - self.pos,
                    });
                }
                let matches = header.is_top_level()
                    && self
                        .filter
                        .map_or(true, |filter| filter == Tag::from(header.label));
                if matches {
                    // descend just past the header; resume after the group later
                    self.stack.push((self.pos + size, self.end));
                    self.end = self.pos + size;
                    self.pos += record::HEADER_SIZE;
                } else {
                    self.pos += size;
                }
                continue;
            }

            let rec = match Record::parse(self.data, self.pos) {
                Ok(rec) => rec,
                Err(err) => return self.fail(err),
            };
            let total = record::HEADER_SIZE + rec.size() as usize;
            if self.pos + total > self.end {
                return self.fail(Error::RecordTooLarge {
                    offset: self.pos,
                    size: rec.size(),
                    available: self.end - self.pos,
                });
            }
            self.pos += total;
            if self.filter.map_or(true, |filter| filter == rec.tag()) {
                return Some(Ok(rec));
            }
        }
    }
}
