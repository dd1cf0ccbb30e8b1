//! Virtual roots
//!
//! Every staged path lives under one of a fixed set of top-level
//! directories. Nothing can be staged outside them.

use ww_core::error::StagingError;

/// Top-level staging directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualRoot {
    /// Bootable images (/roms)
    Roms,
    /// Game saves (/saves)
    Saves,
    /// Emulator save states (/states)
    States,
    /// User content such as WADs and NAND backups (/user)
    User,
    /// Scratch space (/tmp)
    Tmp,
}

impl VirtualRoot {
    pub const ALL: [VirtualRoot; 5] = [
        Self::Roms,
        Self::Saves,
        Self::States,
        Self::User,
        Self::Tmp,
    ];

    pub fn mount_point(&self) -> &'static str {
        match self {
            Self::Roms => "/roms",
            Self::Saves => "/saves",
            Self::States => "/states",
            Self::User => "/user",
            Self::Tmp => "/tmp",
        }
    }

    fn segment(&self) -> &'static str {
        &self.mount_point()[1..]
    }

    /// Root a normalized path lives under
    pub fn of(path: &str) -> Option<Self> {
        let first = path.trim_start_matches('/').split('/').next()?;
        Self::ALL.into_iter().find(|root| root.segment() == first)
    }
}

/// Normalize a virtual path, rejecting anything outside the fixed roots
///
/// Repeated slashes collapse and a trailing slash is dropped. `.` and `..`
/// segments, backslashes and NUL bytes are refused outright rather than
/// resolved, and a bare root with no name under it is not a valid target.
pub fn normalize_path(path: &str) -> Result<String, StagingError> {
    let invalid = || StagingError::InvalidPath(path.to_string());

    if !path.starts_with('/') || path.contains(['\\', '\0']) {
        return Err(invalid());
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 || segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(invalid());
    }

    if !VirtualRoot::ALL.iter().any(|root| root.segment() == segments[0]) {
        return Err(invalid());
    }

    Ok(format!("/{}", segments.join("/")))
}
