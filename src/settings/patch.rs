/// Partial preference updates and the bookkeeping for one optimistic change

use crate::{
    error::{Error, Result},
    settings::{PreferenceKey, PreferenceState, PreferenceValue},
};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A subset of preference keys with their new values.
///
/// Serializes as a flat object keyed by remote field name, which is the
/// payload of a remote persist call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PreferencePatch {
    values: BTreeMap<PreferenceKey, PreferenceValue>,
}

impl PreferencePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch with a single key
    pub fn single(key: PreferenceKey, value: impl Into<PreferenceValue>) -> Self {
        let mut patch = Self::new();
        patch.insert(key, value);
        patch
    }

    /// Patch carrying every key of `state`
    pub fn full(state: &PreferenceState) -> Self {
        PreferenceKey::ALL
            .iter()
            .map(|key| (*key, state.get(*key)))
            .collect()
    }

    /// Decode a flat JSON object, validating every key and value
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(Error::Json("preference patch must be an object".to_string()));
        };

        let mut patch = Self::new();
        for (name, raw) in map {
            let key: PreferenceKey = name.parse()?;
            patch.values.insert(key, PreferenceValue::decode(key, raw)?);
        }
        Ok(patch)
    }

    pub fn insert(&mut self, key: PreferenceKey, value: impl Into<PreferenceValue>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: PreferenceKey) -> Option<&PreferenceValue> {
        self.values.get(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = PreferenceKey> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PreferenceKey, &PreferenceValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Validate every value against its key
    pub fn check(&self) -> Result<()> {
        self.values.iter().try_for_each(|(key, value)| value.check(*key))
    }

    /// Apply on top of `state`, leaving keys outside the patch untouched
    pub fn apply_to(&self, state: &mut PreferenceState) -> Result<()> {
        self.check()?;
        for (key, value) in &self.values {
            state.set(*key, value.clone())?;
        }
        Ok(())
    }
}

impl FromIterator<(PreferenceKey, PreferenceValue)> for PreferencePatch {
    fn from_iter<I: IntoIterator<Item = (PreferenceKey, PreferenceValue)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// One user-triggered change that is being persisted remotely
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPreferenceMutation {
    /// Mutation identifier, used by the per-key ledger
    pub id: Uuid,
    /// Values the keys held before the change
    pub before: PreferencePatch,
    /// Values the change applied
    pub after: PreferencePatch,
}

impl PendingPreferenceMutation {
    /// Apply `after` to `state`, capturing the previous values
    pub fn apply(state: &mut PreferenceState, after: PreferencePatch) -> Result<Self> {
        after.check()?;

        let mut before = PreferencePatch::new();
        for (key, value) in after.iter() {
            let previous = state.set(key, value.clone())?;
            before.insert(key, previous);
        }

        Ok(Self { id: Uuid::new_v4(), before, after })
    }

    pub fn keys(&self) -> impl Iterator<Item = PreferenceKey> + '_ {
        self.after.keys()
    }
}
