//! Tells inline base64 image payloads apart from remote references.
//!
//! This is a heuristic, not a validator: a string counts as base64 exactly
//! when it decodes, and anything else is handed on as a URL.

use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurpose, GeneralPurposeConfig, DecodePaddingMode},
    Engine as _,
};

/// Standard alphabet, padding optional, trailing bits tolerated.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// What a string field turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Base64,
    UrlReference,
}

/// A classified string field, carrying the decoded bytes when it was base64
#[derive(PartialEq, Eq)]
pub enum Payload<'a> {
    Base64(Vec<u8>),
    Url(&'a str),
}

impl Payload<'_> {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Base64(_) => PayloadKind::Base64,
            Payload::Url(_) => PayloadKind::UrlReference,
        }
    }
}

impl std::fmt::Debug for Payload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Base64(bytes) => write!(f, "Base64(<{} bytes>)", bytes.len()),
            Payload::Url(url) => write!(f, "Url({url:?})"),
        }
    }
}

/// Classify a string without keeping the decoded bytes
pub fn classify(s: &str) -> PayloadKind {
    parse(s).kind()
}

/// Classify a string, decoding it if it is base64
pub fn parse(s: &str) -> Payload<'_> {
    match decode(s) {
        Some(bytes) => Payload::Base64(bytes),
        None => Payload::Url(s),
    }
}

/// Decode `s` as base64 after dropping any `data:...,` prefix
pub fn decode(s: &str) -> Option<Vec<u8>> {
    let data = strip_data_uri(s);
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT.decode(compact).ok()
}

fn strip_data_uri(s: &str) -> &str {
    match s.split_once(',') {
        Some((_, rest)) => rest,
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_base64() {
        assert_eq!(classify("aGVsbG8="), PayloadKind::Base64);
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_missing_padding() {
        assert_eq!(decode("aGVsbG8").unwrap(), b"hello");
    }

    #[test]
    fn test_data_uri_prefix() {
        let s = "data:image/jpeg;base64,/9j/4AAQ";
        assert_eq!(classify(s), PayloadKind::Base64);
        assert_eq!(decode(s).unwrap(), vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
    }

    #[test]
    fn test_wrapped_lines() {
        assert_eq!(decode("aGVs\nbG8=\r\n").unwrap(), b"hello");
    }

    #[test]
    fn test_urls_are_references() {
        for url in [
            "https://example.com/face.jpg",
            "http://localhost:8080/a/b/c.png?size=large",
        ] {
            assert_eq!(classify(url), PayloadKind::UrlReference, "{url}");
            assert_eq!(parse(url), Payload::Url(url));
        }
    }

    #[test]
    fn test_garbage_is_a_reference() {
        assert_eq!(classify("not base64!!"), PayloadKind::UrlReference);
    }

    #[test]
    fn test_empty_after_prefix_decodes() {
        // Heuristic: an empty payload still decodes
        assert_eq!(decode("data:image/png;base64,").unwrap(), Vec::<u8>::new());
    }
}
