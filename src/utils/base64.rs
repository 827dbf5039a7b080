use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{engine::general_purpose, DecodeError, Engine as _};

use crate::utils::string::decode_text;

const LENIENT_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// Standard alphabet, padding optional.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_CONFIG);

/// URL-safe alphabet, padding optional.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_CONFIG);

/// Encodes a string to Base64 format.
pub fn base64_encode(input: &str) -> String {
    general_purpose::STANDARD.encode(input)
}

/// Decodes Base64 into raw bytes, tolerating what subscription feeds get wrong.
///
/// Embedded whitespace and line breaks are ignored, padding may be missing or
/// present, and both the standard and the URL-safe alphabet are accepted.
pub fn base64_decode_bytes(input: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD_LENIENT
        .decode(&compact)
        .or_else(|_| URL_SAFE_LENIENT.decode(&compact))
}

/// Decodes a Base64 string to text.
///
/// # Arguments
/// * `input` - The Base64 encoded string.
///
/// # Returns
/// The decoded text, or `None` if the input is not Base64. Bytes that are not
/// valid UTF-8 go through charset detection instead of failing.
pub fn base64_decode(input: &str) -> Option<String> {
    base64_decode_bytes(input)
        .ok()
        .map(|bytes| decode_text(&bytes).0)
}
