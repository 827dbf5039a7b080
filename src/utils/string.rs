//! String utility functions for text processing

/// Character set a byte buffer was read as by [`decode_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    /// Fallback: every byte maps to the code point of the same value.
    Latin1,
}

/// Best-effort conversion of bytes of unknown encoding into text.
///
/// Tries, in order: UTF-8 (with or without BOM), UTF-16 announced by a BOM,
/// UTF-16 guessed from the position of zero bytes, and finally Latin-1,
/// which accepts any input. ASCII structure such as JSON punctuation
/// survives every path, so callers can still attempt to parse the result.
pub fn decode_text(bytes: &[u8]) -> (String, TextEncoding) {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    // ASCII in UTF-16 is valid UTF-8 too, just full of NULs
    if !body.contains(&0) {
        if let Ok(text) = std::str::from_utf8(body) {
            return (text.to_string(), TextEncoding::Utf8);
        }
    }

    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        if let Some(text) = decode_utf16(rest, u16::from_le_bytes) {
            return (text, TextEncoding::Utf16Le);
        }
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        if let Some(text) = decode_utf16(rest, u16::from_be_bytes) {
            return (text, TextEncoding::Utf16Be);
        }
    }

    if let Some(little_endian) = guess_utf16(bytes) {
        let decoded = if little_endian {
            decode_utf16(bytes, u16::from_le_bytes).map(|t| (t, TextEncoding::Utf16Le))
        } else {
            decode_utf16(bytes, u16::from_be_bytes).map(|t| (t, TextEncoding::Utf16Be))
        };
        if let Some(decoded) = decoded {
            return decoded;
        }
    }

    if let Ok(text) = std::str::from_utf8(body) {
        return (text.to_string(), TextEncoding::Utf8);
    }

    (
        bytes.iter().map(|&b| char::from(b)).collect(),
        TextEncoding::Latin1,
    )
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Mostly-ASCII UTF-16 has a zero in every other byte. Returns the byte
/// order when at least half the code units look like that.
fn guess_utf16(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }
    let pairs = bytes.len() / 2;
    let (mut high_zero, mut low_zero) = (0usize, 0usize);
    for pair in bytes.chunks_exact(2) {
        if pair[0] != 0 && pair[1] == 0 {
            high_zero += 1;
        } else if pair[0] == 0 && pair[1] != 0 {
            low_zero += 1;
        }
    }

    if high_zero * 2 >= pairs {
        Some(true)
    } else if low_zero * 2 >= pairs {
        Some(false)
    } else {
        None
    }
}

/// Whether the string has any ASCII letter, i.e. looks like a hostname
/// rather than a bare IPv4 address.
pub fn contains_letters(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic())
}

/// Shorten `s` to at most `max` characters for log output.
pub fn snippet(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_utf8_and_bom() {
        assert_eq!(
            decode_text("{\"ps\":\"香港\"}".as_bytes()),
            ("{\"ps\":\"香港\"}".to_string(), TextEncoding::Utf8)
        );
        assert_eq!(decode_text(b"\xEF\xBB\xBFabc").0, "abc");
    }

    #[test]
    fn test_decode_text_utf16() {
        let le: Vec<u8> = "{\"a\":1}"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_text(&le), ("{\"a\":1}".to_string(), TextEncoding::Utf16Le));

        let mut be = vec![0xFE, 0xFF];
        be.extend("hi".encode_utf16().flat_map(|u| u.to_be_bytes()));
        assert_eq!(decode_text(&be), ("hi".to_string(), TextEncoding::Utf16Be));
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        let (text, encoding) = decode_text(b"{\"ps\":\"caf\xE9\"}");
        assert_eq!(encoding, TextEncoding::Latin1);
        assert_eq!(text, "{\"ps\":\"café\"}");
    }

    #[test]
    fn test_contains_letters() {
        assert!(contains_letters("example.com"));
        assert!(!contains_letters("1.2.3.4"));
        assert!(contains_letters("2001:db8::1"));
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("abcdef", 3), "abc...");
        assert_eq!(snippet("abc", 3), "abc");
    }
}
