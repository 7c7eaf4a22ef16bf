//! Legacy page encodings.
//!
//! The groupware serves its pages in a legacy encoding (Shift_JIS by
//! default). [`decode`] turns the raw body into a `String` and refuses to
//! paper over malformed input with replacement characters.

use encoding_rs::Encoding;

use crate::error::{ProviderError, ProviderResult};

/// Resolves an encoding label such as `Shift_JIS` or `euc-jp`.
pub fn encoding_for_label(label: &str) -> ProviderResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        ProviderError::configuration(format!("unknown source encoding '{}'", label))
    })
}

/// Decodes a page body.
///
/// No BOM sniffing happens: the configured encoding is authoritative.
/// Malformed sequences yield a decode error naming the encoding.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> ProviderResult<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| {
            ProviderError::decode(format!(
                "page body is not valid {} ({} bytes)",
                encoding.name(),
                bytes.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    #[test]
    fn resolves_common_labels() {
        assert_eq!(encoding_for_label("Shift_JIS").unwrap().name(), "Shift_JIS");
        assert_eq!(encoding_for_label("sjis").unwrap().name(), "Shift_JIS");
        assert_eq!(encoding_for_label(" utf-8 ").unwrap().name(), "UTF-8");
        assert_eq!(encoding_for_label("euc-jp").unwrap().name(), "EUC-JP");
    }

    #[test]
    fn unknown_label_is_configuration_error() {
        let err = encoding_for_label("klingon").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Configuration);
    }

    #[test]
    fn decodes_shift_jis() {
        // "予定" in Shift_JIS
        let bytes = [0x97, 0x5c, 0x92, 0xe8];
        let text = decode(&bytes, encoding_rs::SHIFT_JIS).unwrap();
        assert_eq!(text, "予定");
    }

    #[test]
    fn ascii_passes_through() {
        let text = decode(b"<a class=\"event\">x</a>", encoding_rs::SHIFT_JIS).unwrap();
        assert_eq!(text, "<a class=\"event\">x</a>");
    }

    #[test]
    fn malformed_input_fails() {
        // Lead byte without a trail byte.
        let err = decode(&[0x41, 0x82], encoding_rs::SHIFT_JIS).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Decode);
        assert!(err.message().contains("Shift_JIS"));
    }
}
