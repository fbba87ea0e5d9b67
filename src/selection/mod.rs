//! The selection store: outputs chosen to fund a payment, and outputs locked against spending.
//!
//! The store only tracks references. It never checks them against a coin list; that is
//! done by the estimator, which holds the fresh candidate snapshot and prunes stale
//! selections on every run.

mod lock_file;

pub use lock_file::{LockFile, DEFAULT_LOCK_FILE};

use std::collections::BTreeSet;

use bitcoin::OutPoint;

/// Selected and locked output sets for one payment-construction session.
///
/// Invariant: no outpoint is ever in both sets at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStore {
    selected: BTreeSet<OutPoint>,
    locked: BTreeSet<OutPoint>,
}

impl SelectionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a previously persisted lock set and nothing selected.
    pub fn with_locked(locked: impl IntoIterator<Item = OutPoint>) -> Self {
        Self {
            selected: BTreeSet::new(),
            locked: locked.into_iter().collect(),
        }
    }

    /// Selects an outpoint. Returns `true` only if it was newly added.
    ///
    /// Locked outpoints are never selected.
    pub fn select(&mut self, outpoint: OutPoint) -> bool {
        if self.locked.contains(&outpoint) {
            log::debug!("Ignoring selection of locked output {outpoint}");
            return false;
        }
        self.selected.insert(outpoint)
    }

    /// Unselects an outpoint. Returns `true` if it was selected.
    pub fn unselect(&mut self, outpoint: &OutPoint) -> bool {
        self.selected.remove(outpoint)
    }

    /// Clears the selection. The lock set is untouched.
    pub fn unselect_all(&mut self) {
        self.selected.clear();
    }

    /// Whether the outpoint is currently selected.
    pub fn is_selected(&self, outpoint: &OutPoint) -> bool {
        self.selected.contains(outpoint)
    }

    /// All selected outpoints, in outpoint order.
    pub fn list_selected(&self) -> &BTreeSet<OutPoint> {
        &self.selected
    }

    /// Number of selected outpoints.
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Locks an outpoint, unselecting it in the same step. Returns `true` if newly locked.
    pub fn lock(&mut self, outpoint: OutPoint) -> bool {
        self.selected.remove(&outpoint);
        self.locked.insert(outpoint)
    }

    /// Unlocks an outpoint. It stays unselected. Returns `true` if it was locked.
    pub fn unlock(&mut self, outpoint: &OutPoint) -> bool {
        self.locked.remove(outpoint)
    }

    /// Whether the outpoint is locked.
    pub fn is_locked(&self, outpoint: &OutPoint) -> bool {
        self.locked.contains(outpoint)
    }

    /// All locked outpoints, in outpoint order.
    pub fn list_locked(&self) -> &BTreeSet<OutPoint> {
        &self.locked
    }

    /// Number of locked outpoints, as shown in the "(N locked)" hint.
    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }
}
