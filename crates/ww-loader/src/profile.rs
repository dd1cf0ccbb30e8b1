//! File profiles
//!
//! A profile is the structural contract a binary blob is checked against:
//! how small it may be, which leading words it is expected to start with,
//! and how far its length may drift from a fixed size.

use serde::Serialize;

/// Installable WAD header size, the first big-endian word of every WAD
pub const WAD_HEADER_SIZE: u32 = 0x0000_0020;

/// Offset of the first text section in a DOL header
pub const DOL_TEXT0_OFFSET: u32 = 0x0000_0100;

/// "\x7FELF"
pub const ELF_MAGIC: u32 = 0x7F45_4C46;

/// Size of a BootMii NAND backup (512 MiB)
pub const NAND_BACKUP_SIZE: u64 = 512 * 1024 * 1024;

/// Allowed drift of a NAND backup before a warning is raised (1 MiB)
pub const NAND_BACKUP_TOLERANCE: u64 = 1024 * 1024;

/// Multiple of the tolerance past which a NAND backup is rejected
pub const NAND_BACKUP_REJECT_FACTOR: u64 = 10;

/// Number of leading bytes inspected by the blank-image heuristic
pub const BLANK_SCAN_BYTES: usize = 1024;

/// How a profile treats buffer length beyond the minimum size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Any length at or above the minimum is fine
    AtLeastMinimum,
    /// Expected to be `exact` bytes long
    ///
    /// Drift above `tolerance` is a warning; drift above
    /// `tolerance * reject_factor` rejects the buffer.
    Tolerant {
        exact: u64,
        tolerance: u64,
        reject_factor: u64,
    },
}

/// Known binary profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileProfile {
    /// WAD channel/title archive
    ContainerArchive,
    /// DOL or ELF executable
    ExecutableImage,
    /// BootMii full NAND backup
    FullBackupImage,
}

impl FileProfile {
    pub const ALL: [FileProfile; 3] = [
        Self::ContainerArchive,
        Self::ExecutableImage,
        Self::FullBackupImage,
    ];

    /// Lowercase file extensions that select this profile
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::ContainerArchive => &["wad"],
            Self::ExecutableImage => &["dol", "elf"],
            Self::FullBackupImage => &["bin"],
        }
    }

    /// Smallest acceptable buffer
    pub fn min_size(&self) -> u64 {
        match self {
            Self::ContainerArchive => 64,
            Self::ExecutableImage => 0x100,
            Self::FullBackupImage => BLANK_SCAN_BYTES as u64,
        }
    }

    /// Accepted big-endian words at offset 0, in order; empty means unchecked
    pub fn signatures(&self) -> &'static [u32] {
        match self {
            Self::ContainerArchive => &[WAD_HEADER_SIZE],
            Self::ExecutableImage => &[DOL_TEXT0_OFFSET, ELF_MAGIC],
            Self::FullBackupImage => &[],
        }
    }

    pub fn size_policy(&self) -> SizePolicy {
        match self {
            Self::FullBackupImage => SizePolicy::Tolerant {
                exact: NAND_BACKUP_SIZE,
                tolerance: NAND_BACKUP_TOLERANCE,
                reject_factor: NAND_BACKUP_REJECT_FACTOR,
            },
            _ => SizePolicy::AtLeastMinimum,
        }
    }

    /// Whether an all-zero header should be flagged as a blank image
    pub fn checks_blank_header(&self) -> bool {
        matches!(self, Self::FullBackupImage)
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContainerArchive => "WAD archive",
            Self::ExecutableImage => "executable image",
            Self::FullBackupImage => "NAND backup",
        }
    }
}

impl std::fmt::Display for FileProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
