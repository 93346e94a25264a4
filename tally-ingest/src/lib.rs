//! tally-ingest: statement export detection, decoding, and parsing into canonical records.

pub mod decode;
pub mod detect;
pub mod error;
pub mod parser;
pub mod types;

pub use detect::{detect_profile, DEFAULT_PROFILE};
pub use error::ParseError;
pub use parser::{parse_statement, parse_statement_text};
pub use types::{ColumnLayout, HeaderMarkers, Profile, TextEncoding, ALIPAY, WECHAT};
