use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use forge_logging::forge_warn;

/// A response body converted to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decodes a page body: BOM, then the Content-Type charset, then chardetng.
///
/// Malformed input never fails.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> DecodedText {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(encoding) = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\'']).to_string())
    })
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> DecodedText {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        forge_warn!("body was not valid {}; replaced malformed bytes", encoding.name());
    }
    DecodedText {
        text: text.into_owned(),
        encoding: encoding.name(),
        lossy: had_errors,
    }
}
