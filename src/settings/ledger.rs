/// Per-key ledger of in-flight preference mutations
///
/// Every optimistic change registers the value each of its keys held before
/// the change. When a remote persist resolves, the ledger decides what a
/// rollback may still touch, so overlapping changes to the same key never
/// restore a value that a newer change already replaced.

use crate::settings::{PendingPreferenceMutation, PreferenceKey, PreferencePatch, PreferenceValue};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct LedgerEntry {
    mutation_id: Uuid,
    before: PreferenceValue,
}

/// What a failed mutation is allowed to undo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackPlan {
    /// Keys to restore in local state, with the value to restore
    pub restore: PreferencePatch,
    /// Keys whose baseline was handed to a newer in-flight mutation
    pub handed_down: Vec<PreferenceKey>,
    /// Keys already settled by a newer successful mutation
    pub stale: Vec<PreferenceKey>,
}

impl RollbackPlan {
    /// True when nothing in local state needs to change
    pub fn is_noop(&self) -> bool {
        self.restore.is_empty()
    }
}

/// Ordered in-flight mutations per preference key, oldest first
#[derive(Debug, Default)]
pub struct MutationLedger {
    entries: HashMap<PreferenceKey, Vec<LedgerEntry>>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly applied mutation
    pub fn record(&mut self, mutation: &PendingPreferenceMutation) {
        for (key, before) in mutation.before.iter() {
            self.entries.entry(key).or_default().push(LedgerEntry {
                mutation_id: mutation.id,
                before: before.clone(),
            });
        }
    }

    /// Settle a mutation whose persist succeeded.
    ///
    /// Older in-flight entries for the same keys are settled too: the newer
    /// value reached the server, so their outcome no longer matters.
    pub fn commit(&mut self, mutation: &PendingPreferenceMutation) {
        for key in mutation.keys() {
            let Some(queue) = self.entries.get_mut(&key) else {
                continue;
            };
            if let Some(index) = queue.iter().position(|e| e.mutation_id == mutation.id) {
                queue.drain(..=index);
            }
            if queue.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Settle a mutation whose persist failed and plan its rollback
    pub fn fail(&mut self, mutation: &PendingPreferenceMutation) -> RollbackPlan {
        let mut plan = RollbackPlan::default();

        for key in mutation.keys() {
            let queue = self.entries.get_mut(&key);
            let index = queue
                .as_ref()
                .and_then(|q| q.iter().position(|e| e.mutation_id == mutation.id));

            let (Some(queue), Some(index)) = (queue, index) else {
                plan.stale.push(key);
                continue;
            };

            let entry = queue.remove(index);
            match queue.get_mut(index) {
                // A newer change is still in flight; it now owns the baseline
                Some(newer) => {
                    newer.before = entry.before;
                    plan.handed_down.push(key);
                }
                None => plan.restore.insert(key, entry.before),
            }

            if queue.is_empty() {
                self.entries.remove(&key);
            }
        }

        plan
    }

    /// Number of in-flight mutations touching `key`
    pub fn in_flight(&self, key: PreferenceKey) -> usize {
        self.entries.get(&key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything; pending rollbacks become stale
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PreferenceState;

    fn toggle(state: &mut PreferenceState) -> PendingPreferenceMutation {
        let next = !state.open_new_tab;
        PendingPreferenceMutation::apply(state, PreferencePatch::single(PreferenceKey::OpenNewTab, next))
            .unwrap()
    }

    #[test]
    fn test_single_failure_restores_before() {
        let mut state = PreferenceState::default();
        let mut ledger = MutationLedger::new();

        let first = toggle(&mut state);
        ledger.record(&first);
        assert_eq!(ledger.in_flight(PreferenceKey::OpenNewTab), 1);

        let plan = ledger.fail(&first);
        assert_eq!(plan.restore.get(PreferenceKey::OpenNewTab), Some(&PreferenceValue::Bool(true)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_older_failure_hands_baseline_to_newer() {
        let mut state = PreferenceState::default();
        let mut ledger = MutationLedger::new();

        let first = toggle(&mut state); // true -> false
        ledger.record(&first);
        let second = toggle(&mut state); // false -> true
        ledger.record(&second);

        let plan = ledger.fail(&first);
        assert!(plan.is_noop());
        assert_eq!(plan.handed_down, vec![PreferenceKey::OpenNewTab]);

        // The newer mutation now rolls back to the original value
        let plan = ledger.fail(&second);
        assert_eq!(plan.restore.get(PreferenceKey::OpenNewTab), Some(&PreferenceValue::Bool(true)));
    }

    #[test]
    fn test_failure_after_newer_success_is_stale() {
        let mut state = PreferenceState::default();
        let mut ledger = MutationLedger::new();

        let first = toggle(&mut state);
        ledger.record(&first);
        let second = toggle(&mut state);
        ledger.record(&second);

        ledger.commit(&second);
        let plan = ledger.fail(&first);
        assert!(plan.is_noop());
        assert_eq!(plan.stale, vec![PreferenceKey::OpenNewTab]);
    }

    #[test]
    fn test_clear_makes_rollbacks_stale() {
        let mut state = PreferenceState::default();
        let mut ledger = MutationLedger::new();

        let first = toggle(&mut state);
        ledger.record(&first);
        ledger.clear();

        assert!(ledger.fail(&first).is_noop());
    }
}
