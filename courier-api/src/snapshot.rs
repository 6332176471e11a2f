//! # Pending-input snapshots
//!
//! A [`Snapshot`] maps action ids to the last input requested for each
//! in-flight action. The scheduler produces one on `backup()` and consumes one
//! at construction, re-applying every entry so the work that was in flight
//! before a teardown resumes with the same inputs.
//!
//! Snapshots are in-memory values. Persisting them (for example into saved
//! UI state) is the host's business; the entries stay type-erased and are
//! recovered with [`Snapshot::get`].

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use crate::types::{ActionId, BoxedPayload, Payload};

/// Saved pending inputs, ordered by action id.
#[derive(Default)]
pub struct Snapshot {
    entries: BTreeMap<ActionId, BoxedPayload>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `input` for `id`, returning the input it replaced.
    pub fn insert<I: Payload>(&mut self, id: ActionId, input: I) -> Option<BoxedPayload> {
        self.insert_boxed(id, Box::new(input))
    }

    pub fn insert_boxed(&mut self, id: ActionId, input: BoxedPayload) -> Option<BoxedPayload> {
        self.entries.insert(id, input)
    }

    /// Typed view of the input saved for `id`; `None` when absent or of a
    /// different type.
    pub fn get<I: Payload>(&self, id: ActionId) -> Option<&I> {
        self.entries.get(&id).and_then(|input| input.downcast_ref::<I>())
    }

    pub fn get_boxed(&self, id: ActionId) -> Option<&dyn Payload> {
        self.entries.get(&id).map(|input| &**input)
    }

    pub fn remove(&mut self, id: ActionId) -> Option<BoxedPayload> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ids present in the snapshot, ascending.
    pub fn ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &dyn Payload)> + '_ {
        self.entries.iter().map(|(id, input)| (*id, &**input))
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(id, input)| (*id, input.clone_payload()))
            .collect();
        Self { entries }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a_id, a), (b_id, b))| a_id == b_id && a.eq_payload(&**b))
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl FromIterator<(ActionId, BoxedPayload)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (ActionId, BoxedPayload)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl IntoIterator for Snapshot {
    type Item = (ActionId, BoxedPayload);
    type IntoIter = btree_map::IntoIter<ActionId, BoxedPayload>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
