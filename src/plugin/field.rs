use crate::{
    plugin::{Error, Result},
    text, Tag,
};
use std::{collections::BTreeMap, sync::OnceLock};

/// The size in bytes of a field header: a 4-character tag and a 16-bit size.
pub(crate) const HEADER_SIZE: usize = 6;

/// The declared shape of a field's payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Schema {
    /// A null-terminated string.
    ZString,
    /// A fixed sequence of 4-byte primitives, in on-disk order.
    Tuple(Vec<Prim>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Prim {
    F32,
    U32,
}

/// A decoded field value. Tags absent from the schema table decode to
/// [`Value::Raw`], never to an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<'bytes> {
    String(String),
    Tuple(Vec<Scalar>),
    Raw(&'bytes [u8]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    F32(f32),
    U32(u32),
}

/// Maps field tags to payload schemas.
///
/// The built-in table is immutable process-wide state; callers wanting extra
/// entries register them on an owned copy and decode with that.
#[derive(Clone, Debug, Default)]
pub struct SchemaTable {
    map: BTreeMap<Tag, Schema>,
}

impl SchemaTable {
    /// The table of well-known tags.
    pub fn builtin() -> &'static Self {
        static TABLE: OnceLock<SchemaTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = Self::default();
            table.register(
                Tag::new(b"HEDR"),
                Schema::Tuple(vec![Prim::F32, Prim::U32, Prim::U32]),
            );
            for tag in [b"CNAM", b"SNAM", b"MAST", b"EDID", b"FULL"] {
                table.register(Tag::new(tag), Schema::ZString);
            }
            table
        })
    }

    /// Registers a schema for `tag`, replacing any existing entry.
    pub fn register(&mut self, tag: Tag, schema: Schema) {
        self.map.insert(tag, schema);
    }

    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&Schema> {
        self.map.get(&tag)
    }
}

/// One tagged chunk of a record's content. `data` is the payload only; the
/// 6-byte header has already been consumed.
#[derive(Clone, Copy, Debug)]
pub struct Field<'bytes> {
    pub(crate) tag: Tag,
    pub(crate) data: &'bytes [u8],
}

impl<'bytes> Field<'bytes> {
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    #[must_use]
    pub fn as_bytes(&self) -> &'bytes [u8] {
        self.data
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Decodes the payload against the built-in schema table.
    pub fn decode(&self) -> Result<Value<'bytes>> {
        self.decode_with(SchemaTable::builtin())
    }

    /// Decodes the payload against `table`. Tags without a schema come back raw.
    pub fn decode_with(&self, table: &SchemaTable) -> Result<Value<'bytes>> {
        match table.get(self.tag) {
            None => Ok(Value::Raw(self.data)),
            Some(Schema::ZString) => Ok(Value::String(self.as_zstring()?)),
            Some(Schema::Tuple(prims)) => {
                let mut values = Vec::with_capacity(prims.len());
                for (i, prim) in prims.iter().enumerate() {
                    let word = self.read_word(i * 4, prims.len() * 4)?;
                    values.push(match prim {
                        Prim::F32 => Scalar::F32(f32::from_le_bytes(word)),
                        Prim::U32 => Scalar::U32(u32::from_le_bytes(word)),
                    });
                }
                Ok(Value::Tuple(values))
            }
        }
    }

    /// Decodes the payload as terminated text.
    pub fn as_zstring(&self) -> Result<String> {
        Ok(text::decode_zstring(self.data)?)
    }

    /// Reads the leading 32-bit little-endian unsigned integer.
    pub fn as_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_word(0, 4)?))
    }

    /// Reads the leading 32-bit little-endian float.
    pub fn as_f32(&self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_word(0, 4)?))
    }

    fn read_word(&self, offset: usize, expected: usize) -> Result<[u8; 4]> {
        self.data
            .get(offset..offset + 4)
            .and_then(|x| x.try_into().ok())
            .ok_or(Error::FieldTooSmall {
                tag: self.tag,
                expected,
                actual: self.data.len(),
            })
    }
}
