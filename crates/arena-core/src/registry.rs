//! Asset registry: interns `(filename, width, height)` descriptors into dense
//! integer codes.
//!
//! Codes are assigned in first-use order starting at zero. Registering a
//! descriptor that is structurally equal to an existing one (same filename
//! and both sizes) returns the existing code, so a run that reloads the same
//! descriptors ends up with the same codes.
//!
//! When a registry is rebuilt from a command log, entries arrive with their
//! codes already fixed and possibly out of order. [`AssetRegistry::add_entry_with_index`]
//! pads any gap with placeholders and refuses to overwrite a real entry.
//!
//! All operations go through one mutex so agents may be constructed and
//! registered from several threads during setup.
//!
//! # Example
//!
//! ```
//! use arena_core::registry::{AssetEntry, AssetRegistry, AssetCode};
//!
//! let registry = AssetRegistry::new();
//! let hare = registry.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
//! let lynx = registry.add_entry(AssetEntry::new("lynx.png", 1.0, 1.0));
//! let again = registry.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
//!
//! assert_eq!(hare, AssetCode(0));
//! assert_eq!(lynx, AssetCode(1));
//! assert_eq!(again, hare);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// AssetCode
// ---------------------------------------------------------------------------

/// A stable integer naming one registered asset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetCode(pub u32);

impl AssetCode {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetCode({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetEntry
// ---------------------------------------------------------------------------

/// A drawable asset: the image file and its size in arena units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub filename: String,
    pub size_x: f64,
    pub size_y: f64,
}

impl AssetEntry {
    pub fn new(filename: impl Into<String>, size_x: f64, size_y: f64) -> Self {
        Self {
            filename: filename.into(),
            size_x,
            size_y,
        }
    }

    /// The filler written into gaps left by out-of-order loading.
    pub fn placeholder() -> Self {
        Self::new(String::new(), 0.0, 0.0)
    }

    /// An entry with an empty filename is a placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.filename.is_empty()
    }

    /// Hashable identity: filename plus the bit patterns of both sizes.
    fn key(&self) -> (String, u64, u64) {
        (
            self.filename.clone(),
            self.size_x.to_bits(),
            self.size_y.to_bits(),
        )
    }
}

// ---------------------------------------------------------------------------
// AssetRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryInner {
    /// Entries indexed by code. Gaps hold placeholders.
    entries: Vec<AssetEntry>,
    /// Reverse lookup for de-duplication.
    codes: HashMap<(String, u64, u64), AssetCode>,
}

/// Thread-safe, bidirectional map between [`AssetEntry`] and [`AssetCode`].
#[derive(Debug, Default)]
pub struct AssetRegistry {
    inner: Mutex<RegistryInner>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `entry`, returning its code.
    ///
    /// A structurally equal entry that is already registered keeps its code.
    pub fn add_entry(&self, entry: AssetEntry) -> AssetCode {
        let mut inner = self.lock();
        let key = entry.key();
        if let Some(code) = inner.codes.get(&key) {
            return *code;
        }
        let code = AssetCode(inner.entries.len() as u32);
        inner.entries.push(entry);
        inner.codes.insert(key, code);
        code
    }

    /// Register `entry` at a fixed `code`, as when loading from a log.
    ///
    /// Slots below `code` that do not exist yet are filled with placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AssetSlotOccupied`] if the slot already holds a
    /// real (non-placeholder) entry.
    pub fn add_entry_with_index(&self, entry: AssetEntry, code: AssetCode) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let index = code.index();
        while inner.entries.len() <= index {
            inner.entries.push(AssetEntry::placeholder());
        }
        let existing = &inner.entries[index];
        if !existing.is_placeholder() {
            tracing::warn!(
                code = code.0,
                existing = %existing.filename,
                incoming = %entry.filename,
                "asset slot already populated"
            );
            return Err(CoreError::AssetSlotOccupied {
                code: code.0,
                existing: existing.filename.clone(),
            });
        }
        if !entry.is_placeholder() {
            inner.codes.insert(entry.key(), code);
        }
        inner.entries[index] = entry;
        Ok(())
    }

    /// The entry registered under `code`, if any. Placeholders are reported
    /// as absent.
    pub fn get(&self, code: AssetCode) -> Option<AssetEntry> {
        self.lock()
            .entries
            .get(code.index())
            .filter(|e| !e.is_placeholder())
            .cloned()
    }

    /// The code of an already registered entry.
    pub fn code_of(&self, entry: &AssetEntry) -> Option<AssetCode> {
        self.lock().codes.get(&entry.key()).copied()
    }

    /// A copy of every slot in code order, placeholders included.
    pub fn entries(&self) -> Vec<AssetEntry> {
        self.lock().entries.clone()
    }

    /// Number of slots, placeholders included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.codes.clear();
    }
}

impl Clone for AssetRegistry {
    fn clone(&self) -> Self {
        let inner = self.lock();
        Self {
            inner: Mutex::new(RegistryInner {
                entries: inner.entries.clone(),
                codes: inner.codes.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn codes_are_dense_and_ordered() {
        let r = AssetRegistry::new();
        for i in 0..5 {
            let code = r.add_entry(AssetEntry::new(format!("a{i}.png"), 1.0, 1.0));
            assert_eq!(code, AssetCode(i));
        }
        assert_eq!(r.len(), 5);
    }

    #[test]
    fn size_participates_in_identity() {
        let r = AssetRegistry::new();
        let small = r.add_entry(AssetEntry::new("hare.png", 0.5, 0.5));
        let big = r.add_entry(AssetEntry::new("hare.png", 1.0, 0.5));
        assert_ne!(small, big);
        assert_eq!(r.code_of(&AssetEntry::new("hare.png", 1.0, 0.5)), Some(big));
    }

    #[test]
    fn index_insert_pads_gaps() {
        let r = AssetRegistry::new();
        r.add_entry_with_index(AssetEntry::new("late.png", 2.0, 2.0), AssetCode(3))
            .unwrap();
        assert_eq!(r.len(), 4);
        assert!(r.get(AssetCode(1)).is_none());
        assert_eq!(r.get(AssetCode(3)).unwrap().filename, "late.png");

        // Filling a placeholder is allowed.
        r.add_entry_with_index(AssetEntry::new("early.png", 1.0, 1.0), AssetCode(1))
            .unwrap();
        assert_eq!(r.get(AssetCode(1)).unwrap().filename, "early.png");
    }

    #[test]
    fn index_insert_over_real_entry_fails() {
        let r = AssetRegistry::new();
        r.add_entry(AssetEntry::new("a.png", 1.0, 1.0));
        let err = r
            .add_entry_with_index(AssetEntry::new("b.png", 1.0, 1.0), AssetCode(0))
            .unwrap_err();
        assert!(matches!(err, CoreError::AssetSlotOccupied { code: 0, .. }));
    }

    #[test]
    fn add_after_index_load_reuses_code() {
        let r = AssetRegistry::new();
        r.add_entry_with_index(AssetEntry::new("x.png", 1.0, 1.0), AssetCode(2))
            .unwrap();
        assert_eq!(r.add_entry(AssetEntry::new("x.png", 1.0, 1.0)), AssetCode(2));
        // New descriptors append after the padded tail.
        assert_eq!(r.add_entry(AssetEntry::new("y.png", 1.0, 1.0)), AssetCode(3));
    }

    #[test]
    fn concurrent_registration_is_consistent() {
        let r = Arc::new(AssetRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let r = Arc::clone(&r);
                std::thread::spawn(move || {
                    (0..20)
                        .map(|i| r.add_entry(AssetEntry::new(format!("{}.png", (i + t) % 10), 1.0, 1.0)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(r.len(), 10);
        for i in 0..10 {
            let code = r.code_of(&AssetEntry::new(format!("{i}.png"), 1.0, 1.0)).unwrap();
            assert_eq!(r.get(code).unwrap().filename, format!("{i}.png"));
        }
    }

    #[test]
    fn clear_resets_codes() {
        let r = AssetRegistry::new();
        r.add_entry(AssetEntry::new("a.png", 1.0, 1.0));
        r.clear();
        assert!(r.is_empty());
        assert_eq!(r.add_entry(AssetEntry::new("b.png", 1.0, 1.0)), AssetCode(0));
    }
}
