//! Plugin files carry text in whatever codepage the authoring tool used; in practice
//! that means UTF-8 or Windows-1252. Decoding tries each in that order.

#[derive(Debug, thiserror::Error)]
#[error("byte {byte:#04x} at offset {offset} is not decodable as utf-8 or windows-1252")]
pub struct DecodeError {
    pub byte: u8,
    pub offset: usize,
}

// 0x80..=0x9F is where windows-1252 diverges from latin-1; 0 marks the five
// code points the codepage leaves undefined.
const C1: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, //
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

fn decode_windows_1252(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut result = String::with_capacity(bytes.len());
    for (offset, &byte) in bytes.iter().enumerate() {
        let code = match byte {
            0x80..=0x9F => C1[usize::from(byte - 0x80)],
            _ => byte.into(),
        };
        match char::from_u32(code.into()) {
            Some(c) if code != 0 || byte == 0 => result.push(c),
            _ => return Err(DecodeError { byte, offset }),
        }
    }
    Ok(result)
}

/// Decodes `bytes` with the first encoding that accepts them: UTF-8, then
/// Windows-1252.
pub(crate) fn decode(bytes: &[u8]) -> Result<String, DecodeError> {
    match core::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_owned()),
        Err(_) => decode_windows_1252(bytes),
    }
}

/// Decodes a zstring payload, dropping trailing null padding first.
pub(crate) fn decode_zstring(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut bytes = bytes;
    while let [head @ .., 0] = bytes {
        bytes = head;
    }
    decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_zstring};

    #[test]
    fn utf8_wins_when_valid() -> anyhow::Result<()> {
        assert_eq!(decode(b"Test Author")?, "Test Author");
        assert_eq!(decode("café".as_bytes())?, "café");
        Ok(())
    }

    #[test]
    fn falls_back_to_windows_1252() -> anyhow::Result<()> {
        // 0xE9 is é in 1252 but an invalid utf-8 continuation start
        assert_eq!(decode(b"caf\xE9")?, "café");
        // 0x99 is the trademark sign
        assert_eq!(decode(b"mod\x99")?, "mod\u{2122}");
        Ok(())
    }

    #[test]
    fn undefined_codepage_bytes_fail() {
        let err = decode(b"ab\x81cd").unwrap_err();
        assert_eq!(err.byte, 0x81);
        assert_eq!(err.offset, 2);
        assert!(decode(b"\x8D").is_err());
        assert!(decode(b"\x8F").is_err());
        assert!(decode(b"\x90").is_err());
        assert!(decode(b"\x9D").is_err());
    }

    #[test]
    fn zstrings_drop_trailing_padding() -> anyhow::Result<()> {
        assert_eq!(decode_zstring(b"Skyrim.esm\0")?, "Skyrim.esm");
        assert_eq!(decode_zstring(b"Skyrim.esm\0\0")?, "Skyrim.esm");
        assert_eq!(decode_zstring(b"")?, "");
        Ok(())
    }
}
