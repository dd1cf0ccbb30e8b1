//! Consent flags
//!
//! The front end keeps acceptance flags (the emulator disclaimer, mostly)
//! in a key-value store. Only the in-memory store lives here; the browser
//! side persists its own.

use std::collections::HashMap;

/// Key recording that the user accepted the emulator disclaimer
pub const DISCLAIMER_KEY: &str = "webwii.disclaimer.accepted";

/// Key-value store of acceptance flags
pub trait ConsentStore: Send {
    fn get(&self, key: &str) -> Option<bool>;
    fn set(&mut self, key: &str, accepted: bool);

    fn is_accepted(&self, key: &str) -> bool {
        self.get(key).unwrap_or(false)
    }
}

/// Consent flags held for the lifetime of the process
#[derive(Debug, Default, Clone)]
pub struct MemoryConsentStore {
    flags: HashMap<String, bool>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the disclaimer already accepted
    pub fn accepted() -> Self {
        let mut store = Self::new();
        store.set(DISCLAIMER_KEY, true);
        store
    }
}

impl ConsentStore for MemoryConsentStore {
    fn get(&self, key: &str) -> Option<bool> {
        self.flags.get(key).copied()
    }

    fn set(&mut self, key: &str, accepted: bool) {
        self.flags.insert(key.to_string(), accepted);
    }
}
