use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

use crate::FetchOutput;

/// Page markup decoded to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub html: String,
    pub encoding: &'static str,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bytes are not valid {encoding}")]
    Malformed { encoding: &'static str },
}

/// Decodes a fetched page using its `Content-Type` header as a hint.
pub fn decode_page(output: &FetchOutput) -> Result<PageText, DecodeError> {
    decode_html(&output.bytes, output.metadata.content_type.as_deref())
}

/// Picks an encoding (BOM, then header charset, then detection) and decodes.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<PageText, DecodeError> {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| guess_encoding(bytes));

    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::Malformed {
            encoding: actual.name(),
        });
    }
    Ok(PageText {
        html: text.into_owned(),
        encoding: actual.name(),
    })
}

fn guess_encoding(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_charset_is_respected() {
        let decoded = decode_html(b"caf\xe9", Some("text/html; Charset=\"ISO-8859-1\"")).unwrap();
        assert_eq!(decoded.html, "caf\u{e9}");
        assert_eq!(decoded.encoding, "windows-1252");
    }

    #[test]
    fn bom_wins_over_header() {
        let decoded = decode_html(b"\xEF\xBB\xBFhello", Some("text/html; charset=latin1")).unwrap();
        assert_eq!(decoded.html, "hello");
        assert_eq!(decoded.encoding, "UTF-8");
    }

    #[test]
    fn plain_utf8_without_hints_decodes() {
        let decoded = decode_html("<p>ol\u{e1}</p>".as_bytes(), None).unwrap();
        assert_eq!(decoded.html, "<p>ol\u{e1}</p>");
    }

    #[test]
    fn invalid_bytes_for_declared_charset_fail() {
        let err = decode_html(b"ok \xff\xfd", Some("text/html; charset=utf-8")).unwrap_err();
        assert_eq!(err, DecodeError::Malformed { encoding: "UTF-8" });
    }
}
