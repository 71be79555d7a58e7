//! Embedded image helpers.

/// MIME type used when the image format is not recognized.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Sniff the MIME type of an image from its magic bytes.
pub fn detect_mime(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => "image/png",
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        _ => FALLBACK_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), "image/jpeg");
        assert_eq!(detect_mime(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(detect_mime(b"GIF89a...."), "image/gif");
        assert_eq!(detect_mime(b"GIF87a...."), "image/gif");
        assert_eq!(detect_mime(b"RIFF\x10\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(detect_mime(b"BM\x00\x00"), "image/bmp");
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(detect_mime(b"plain text"), FALLBACK_MIME);
        assert_eq!(detect_mime(b"RIFF\x10\x00\x00\x00WAVE"), FALLBACK_MIME);
        assert_eq!(detect_mime(&[]), FALLBACK_MIME);
    }
}
