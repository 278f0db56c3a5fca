//! Enable/disable state document (spec §3.4): one per kind, tracking which
//! registered paths are enabled vs. disabled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnableDisableState {
    pub enabled: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
}

impl EnableDisableState {
    pub fn contains(&self, path: &str) -> bool {
        self.enabled.contains(path) || self.disabled.contains(path)
    }

    pub fn is_enabled(&self, path: &str) -> bool {
        self.enabled.contains(path)
    }

    /// Registers a path into `disabled` (spec §3.4: new entities start disabled).
    pub fn insert_new(&mut self, path: &str) {
        self.enabled.remove(path);
        self.disabled.insert(path.to_string());
    }

    /// Moves `path` between lists. Idempotent (spec §4.C3 `toggle`).
    pub fn set_enabled(&mut self, path: &str, enabled: bool) {
        if enabled {
            self.disabled.remove(path);
            self.enabled.insert(path.to_string());
        } else {
            self.enabled.remove(path);
            self.disabled.insert(path.to_string());
        }
    }

    pub fn remove(&mut self, path: &str) {
        self.enabled.remove(path);
        self.disabled.remove(path);
    }

    /// Checks the universal invariant (spec §8 #1): `enabled` and
    /// `disabled` are disjoint.
    pub fn is_consistent(&self) -> bool {
        self.enabled.is_disjoint(&self.disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_true_twice_is_idempotent() {
        let mut s = EnableDisableState::default();
        s.insert_new("/x");
        s.set_enabled("/x", true);
        s.set_enabled("/x", true);
        assert!(s.is_enabled("/x"));
        assert!(s.is_consistent());
    }

    #[test]
    fn enabled_and_disabled_stay_disjoint() {
        let mut s = EnableDisableState::default();
        s.insert_new("/x");
        s.set_enabled("/x", true);
        s.set_enabled("/x", false);
        assert!(s.is_consistent());
        assert!(!s.is_enabled("/x"));
    }
}
