//! Text decoding for package entries.
//!
//! Report packages store their layout as UTF-16LE; everything this crate
//! writes back is UTF-8. Decoding never fails: malformed input is replaced
//! with U+FFFD the same way a browser `TextDecoder` would.

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
}

pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => decode_utf8(bytes),
        TextEncoding::Utf16Le => decode_utf16le(bytes),
    }
}

pub fn decode_utf8(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn decode_utf16le(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&UTF16LE_BOM).unwrap_or(bytes);
    let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));

    let mut text: String = char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();

    // Dangling half of a code unit.
    if bytes.len() % 2 == 1 {
        text.push(char::REPLACEMENT_CHARACTER);
    }

    text
}

pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
