//! Pick a parsing profile from the export's file name.
//!
//! Exports carry no self-describing schema, so detection is a fixed table of
//! file-name substrings checked in order. A new provider is one table entry
//! plus one `Profile` constant in `types`.

use std::path::Path;

use crate::types::{Profile, ALIPAY, WECHAT};

/// (file-name substring, profile); first match wins.
const PROFILE_TABLE: &[(&str, Profile)] = &[("alipay_record", ALIPAY)];

/// Used when no table entry matches.
pub const DEFAULT_PROFILE: Profile = WECHAT;

pub fn detect_profile(path: impl AsRef<Path>) -> Profile {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());

    PROFILE_TABLE
        .iter()
        .find(|(pattern, _)| name.contains(pattern))
        .map(|(_, profile)| *profile)
        .unwrap_or(DEFAULT_PROFILE)
}
