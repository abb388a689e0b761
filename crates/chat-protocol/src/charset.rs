// crates/chat-protocol/src/charset.rs

//! ISO-8859-1 (Latin-1) character set.
//!
//! Every byte maps to the Unicode code point with the same value, so
//! decoding never fails. Encoding is lossy for anything above U+00FF:
//! such characters are written as [`REPLACEMENT_BYTE`].

/// Byte written for characters outside the Latin-1 range.
pub const REPLACEMENT_BYTE: u8 = b'?';

/// Decode Latin-1 bytes into a `String`.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode `text` as Latin-1, appending the bytes to `out`.
pub fn encode_into(text: &str, out: &mut Vec<u8>) {
    out.reserve(text.len());
    out.extend(
        text.chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE)),
    );
}

/// Encode `text` as Latin-1 into a fresh buffer.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    encode_into(text, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_high_bytes_as_latin1() {
        assert_eq!(decode(b"r\xe4ksm\xf6rg\xe5s"), "räksmörgås");
    }

    #[test]
    fn every_byte_survives_decode_then_encode() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(encode(&decode(&all)), all);
    }

    #[test]
    fn characters_outside_latin1_are_replaced() {
        assert_eq!(encode("5 €, 猫"), b"5 ?, ?".to_vec());
    }
}
