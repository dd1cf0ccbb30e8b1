//! Staging namespace
//!
//! Maps virtual paths to validated buffers. Staging a path that is already
//! taken replaces the old entry (last write wins). The namespace has no
//! internal locking; callers that share it across tasks must serialize
//! access themselves.

use crate::roots::{normalize_path, VirtualRoot};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::{debug, info};
use ww_core::config::StagingConfig;
use ww_core::error::StagingError;
use ww_loader::{ByteBuffer, FileProfile};

/// A validated buffer waiting under a virtual path
#[derive(Debug)]
pub struct StagedEntry {
    virtual_path: String,
    profile: FileProfile,
    buffer: ByteBuffer,
    created_at: SystemTime,
}

impl StagedEntry {
    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn profile(&self) -> FileProfile {
        self.profile
    }

    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn root(&self) -> Option<VirtualRoot> {
        VirtualRoot::of(&self.virtual_path)
    }

    /// Consume the entry, keeping only its bytes
    pub fn into_buffer(self) -> ByteBuffer {
        self.buffer
    }
}

/// Virtual directory tree of staged buffers
#[derive(Debug, Default)]
pub struct StagingNamespace {
    entries: HashMap<String, StagedEntry>,
    /// 0 means unlimited
    max_entries: usize,
}

impl StagingNamespace {
    /// Create an unbounded namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace holding at most `max_entries` paths (0 = unbounded)
    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::with_limit(config.max_entries)
    }

    /// Stage `buffer` under `virtual_path`, replacing whatever was there
    pub fn stage(
        &mut self,
        virtual_path: &str,
        profile: FileProfile,
        buffer: ByteBuffer,
    ) -> Result<&StagedEntry, StagingError> {
        let path = normalize_path(virtual_path)?;

        let replacing = self.entries.contains_key(&path);
        if !replacing && self.max_entries != 0 && self.entries.len() >= self.max_entries {
            return Err(StagingError::Full(self.max_entries));
        }

        info!(
            "Staging {} ({}, {} bytes){}",
            path,
            profile.label(),
            buffer.len(),
            if replacing { ", replacing previous entry" } else { "" }
        );

        let entry = StagedEntry {
            virtual_path: path.clone(),
            profile,
            buffer,
            created_at: SystemTime::now(),
        };
        let slot = match self.entries.entry(path) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(entry);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(entry),
        };
        Ok(slot)
    }

    /// Look up the entry staged at `virtual_path`
    pub fn get(&self, virtual_path: &str) -> Result<&StagedEntry, StagingError> {
        let path = normalize_path(virtual_path)?;
        self.entries.get(&path).ok_or(StagingError::NotFound(path))
    }

    pub fn contains(&self, virtual_path: &str) -> bool {
        self.get(virtual_path).is_ok()
    }

    /// Evict and return the entry at `virtual_path`
    pub fn take(&mut self, virtual_path: &str) -> Result<StagedEntry, StagingError> {
        let path = normalize_path(virtual_path)?;
        let entry = self
            .entries
            .remove(&path)
            .ok_or(StagingError::NotFound(path))?;
        debug!("Evicted {}", entry.virtual_path);
        Ok(entry)
    }

    /// Put back an entry previously returned by [`take`](Self::take)
    ///
    /// A newer entry staged at the same path in the meantime wins; the
    /// returned entry is dropped and `false` is returned.
    pub fn restore(&mut self, entry: StagedEntry) -> bool {
        if self.entries.contains_key(&entry.virtual_path) {
            debug!("Not restoring {}, path was restaged", entry.virtual_path);
            return false;
        }
        debug!("Restored {}", entry.virtual_path);
        self.entries.insert(entry.virtual_path.clone(), entry);
        true
    }

    /// Drop the entry at `virtual_path`, returning whether one was staged
    pub fn remove(&mut self, virtual_path: &str) -> bool {
        self.take(virtual_path).is_ok()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        info!("Clearing {} staged entries", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged paths in sorted order
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Sum of all staged buffer lengths
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.buffer.len()).sum()
    }
}

/// Where a file of `profile` named `filename` is staged by default
pub fn default_path_for(profile: FileProfile, filename: &str) -> Result<String, StagingError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dir = match profile {
        FileProfile::ExecutableImage => "/roms",
        FileProfile::ContainerArchive => "/user/wad",
        FileProfile::FullBackupImage => "/user/nand",
    };
    normalize_path(&format!("{}/{}", dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(byte: u8, len: usize) -> ByteBuffer {
        ByteBuffer::new(vec![byte; len])
    }

    #[test]
    fn test_stage_and_get() {
        let mut ns = StagingNamespace::new();
        let entry = ns
            .stage("/roms/game.dol", FileProfile::ExecutableImage, buf(1, 300))
            .unwrap();
        assert_eq!(entry.virtual_path(), "/roms/game.dol");
        assert_eq!(entry.root(), Some(VirtualRoot::Roms));

        let entry = ns.get("/roms//game.dol").unwrap();
        assert_eq!(entry.profile(), FileProfile::ExecutableImage);
        assert_eq!(entry.buffer().len(), 300);
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let mut ns = StagingNamespace::new();
        ns.stage("/roms/game.dol", FileProfile::ExecutableImage, buf(1, 300))
            .unwrap();
        ns.stage("/roms/game.dol", FileProfile::ExecutableImage, buf(2, 400))
            .unwrap();

        assert_eq!(ns.len(), 1);
        let entry = ns.get("/roms/game.dol").unwrap();
        assert_eq!(entry.buffer().len(), 400);
        assert!(entry.buffer().as_slice().iter().all(|b| *b == 2));
    }

    #[test]
    fn test_invalid_path_rejected() {
        let mut ns = StagingNamespace::new();
        for bad in ["/etc/game.dol", "roms/game.dol", "/roms/../etc/x"] {
            let err = ns
                .stage(bad, FileProfile::ExecutableImage, buf(1, 300))
                .unwrap_err();
            assert_eq!(err, StagingError::InvalidPath(bad.to_string()));
        }
        assert!(ns.is_empty());
    }

    #[test]
    fn test_get_missing() {
        let ns = StagingNamespace::new();
        assert_eq!(
            ns.get("/tmp/none").unwrap_err(),
            StagingError::NotFound("/tmp/none".to_string())
        );
        assert!(!ns.contains("/tmp/none"));
    }

    #[test]
    fn test_take_and_restore() {
        let mut ns = StagingNamespace::new();
        ns.stage("/user/wad/a.wad", FileProfile::ContainerArchive, buf(1, 64))
            .unwrap();
        let created = ns.get("/user/wad/a.wad").unwrap().created_at();

        let entry = ns.take("/user/wad/a.wad").unwrap();
        assert!(ns.is_empty());

        assert!(ns.restore(entry));
        assert_eq!(ns.get("/user/wad/a.wad").unwrap().created_at(), created);
    }

    #[test]
    fn test_remove() {
        let mut ns = StagingNamespace::new();
        ns.stage("/tmp/x.bin", FileProfile::FullBackupImage, buf(1, 2048))
            .unwrap();
        assert!(ns.remove("//tmp/x.bin"));
        assert!(!ns.remove("/tmp/x.bin"));
        assert!(!ns.remove("../x.bin"));
        assert!(ns.is_empty());
    }

    #[test]
    fn test_restore_does_not_clobber_newer() {
        let mut ns = StagingNamespace::new();
        ns.stage("/tmp/a.wad", FileProfile::ContainerArchive, buf(1, 64))
            .unwrap();
        let old = ns.take("/tmp/a.wad").unwrap();
        ns.stage("/tmp/a.wad", FileProfile::ContainerArchive, buf(2, 128))
            .unwrap();

        assert!(!ns.restore(old));
        assert_eq!(ns.get("/tmp/a.wad").unwrap().buffer().len(), 128);
    }

    #[test]
    fn test_clear() {
        let mut ns = StagingNamespace::new();
        ns.stage("/roms/a.dol", FileProfile::ExecutableImage, buf(1, 300))
            .unwrap();
        ns.stage("/saves/b.bin", FileProfile::FullBackupImage, buf(1, 2000))
            .unwrap();
        assert_eq!(ns.total_bytes(), 2300);
        assert_eq!(ns.paths(), vec!["/roms/a.dol", "/saves/b.bin"]);

        ns.clear();
        assert!(ns.is_empty());
        assert_eq!(ns.total_bytes(), 0);
    }

    #[test]
    fn test_entry_limit() {
        let mut ns = StagingNamespace::with_limit(1);
        ns.stage("/roms/a.dol", FileProfile::ExecutableImage, buf(1, 300))
            .unwrap();
        assert_eq!(
            ns.stage("/roms/b.dol", FileProfile::ExecutableImage, buf(1, 300))
                .unwrap_err(),
            StagingError::Full(1)
        );
        // Overwriting never counts against the limit
        ns.stage("/roms/a.dol", FileProfile::ExecutableImage, buf(2, 300))
            .unwrap();
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(
            default_path_for(FileProfile::ExecutableImage, "boot.dol").unwrap(),
            "/roms/boot.dol"
        );
        assert_eq!(
            default_path_for(FileProfile::ContainerArchive, "C:\\dl\\title.wad").unwrap(),
            "/user/wad/title.wad"
        );
        assert_eq!(
            default_path_for(FileProfile::FullBackupImage, "nand.bin").unwrap(),
            "/user/nand/nand.bin"
        );
        assert!(default_path_for(FileProfile::ExecutableImage, "..").is_err());
        assert!(default_path_for(FileProfile::ExecutableImage, "").is_err());
    }
}
