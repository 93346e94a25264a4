//! Byte-to-text decoding for statement exports

use encoding_rs::{GBK, UTF_8};

use crate::types::TextEncoding;

/// Decode `bytes` with `encoding`, dropping a leading UTF-8 byte order mark.
///
/// Returns `None` when the input contains sequences invalid for the encoding.
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Option<String> {
    let codec = match encoding {
        TextEncoding::Utf8 => UTF_8,
        TextEncoding::Gbk => GBK,
    };
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    codec
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}
