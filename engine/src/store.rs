//! Captured-original and current-spoof identifier storage.

use std::sync::{Mutex, MutexGuard};

use idveil_protocol::{OriginalIdentifiers, SpoofedIdentifiers};

/// Holds the original identifier set (captured once per target) and the
/// current spoof set.
///
/// Interception handlers read through [`spoofed_snapshot`], which clones
/// the set under the lock: concurrent readers never observe a half-written
/// update and never hold a live reference into controller state. No
/// validation happens here — an empty category string is the caller's
/// signal to skip that category.
///
/// [`spoofed_snapshot`]: IdentifierStore::spoofed_snapshot
#[derive(Debug, Default)]
pub struct IdentifierStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    original: Option<OriginalIdentifiers>,
    spoofed: Option<SpoofedIdentifiers>,
}

impl IdentifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the captured original set, replacing any previous capture.
    pub fn set_original(&self, set: OriginalIdentifiers) {
        self.lock().original = Some(set);
    }

    /// The captured original set, if any.
    pub fn original(&self) -> Option<OriginalIdentifiers> {
        self.lock().original.clone()
    }

    /// Stage a spoof set as current, replacing any previous one.
    pub fn set_spoofed(&self, set: SpoofedIdentifiers) {
        self.lock().spoofed = Some(set);
    }

    /// Independent copy of the current spoof set.
    pub fn spoofed_snapshot(&self) -> Option<SpoofedIdentifiers> {
        self.lock().spoofed.clone()
    }

    /// Clear the active flag on the current spoof set, if any.
    pub fn deactivate_spoofed(&self) {
        if let Some(set) = self.lock().spoofed.as_mut() {
            set.active = false;
        }
    }

    /// Drop the current spoof set, keeping the captured original.
    pub fn clear_spoofed(&self) {
        self.lock().spoofed = None;
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.original = None;
        inner.spoofed = None;
    }
}
