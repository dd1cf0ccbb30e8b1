//! Binary classifier
//!
//! The profile is chosen from the file name alone. Content only comes into
//! play afterwards, when the chosen profile is validated.

use crate::buffer::ByteBuffer;
use crate::profile::FileProfile;
use tracing::debug;

/// Result of classifying a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Known(FileProfile),
    Unknown,
}

impl Classification {
    pub fn profile(&self) -> Option<FileProfile> {
        match self {
            Self::Known(profile) => Some(*profile),
            Self::Unknown => None,
        }
    }
}

/// Extension of the last path component, lowercased
fn extension(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Map an extension to its profile
pub fn profile_for_extension(ext: &str) -> Option<FileProfile> {
    let ext = ext.to_ascii_lowercase();
    FileProfile::ALL
        .into_iter()
        .find(|profile| profile.extensions().contains(&ext.as_str()))
}

/// Work out which profile `filename_hint` names
///
/// Never fails: a missing or unmapped extension yields
/// [`Classification::Unknown`].
pub fn classify(filename_hint: &str, buffer: &ByteBuffer) -> Classification {
    let result = match extension(filename_hint).as_deref().and_then(profile_for_extension) {
        Some(profile) => Classification::Known(profile),
        None => Classification::Unknown,
    };

    debug!(
        "Classified {} ({} bytes) as {:?}",
        filename_hint,
        buffer.len(),
        result
    );
    result
}
