//! Explicit subscriptions.
//!
//! Components subscribe on mount and drop the guard on unmount. A derived
//! cell lives as long as somebody subscribes to it.

use std::rc::{Rc, Weak};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::Shared;
use super::extras::CellKey;

pub type Notify = Rc<dyn Fn()>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Topic {
    /// Every context of a plain or url variable.
    Leaf(Arc<str>),
    Cell(CellKey),
}

#[derive(Default)]
pub(super) struct Subscribers {
    next_id: u64,
    entries: FxHashMap<u64, (Topic, Notify)>,
}

impl Subscribers {
    pub fn insert(&mut self, topic: Topic, notify: Notify) -> u64 {
        self.next_id += 1;
        self.entries.insert(self.next_id, (topic, notify));
        self.next_id
    }

    pub fn remove(&mut self, id: u64) -> Option<Topic> {
        self.entries.remove(&id).map(|(topic, _)| topic)
    }

    pub fn has_cell(&self, key: &CellKey) -> bool {
        self.entries
            .values()
            .any(|(topic, _)| matches!(topic, Topic::Cell(watched) if watched == key))
    }

    pub fn for_leaf(&self, uid: &str) -> Vec<Notify> {
        self.matching(|topic| matches!(topic, Topic::Leaf(watched) if &**watched == uid))
    }

    pub fn for_cell(&self, key: &CellKey) -> Vec<Notify> {
        self.matching(|topic| matches!(topic, Topic::Cell(watched) if watched == key))
    }

    /// Cells with at least one subscriber, each listed once.
    pub fn watched_cells(&self) -> Vec<CellKey> {
        let mut cells: Vec<CellKey> = Vec::new();
        for (topic, _) in self.entries.values() {
            if let Topic::Cell(key) = topic {
                if !cells.contains(key) {
                    cells.push(key.clone());
                }
            }
        }
        cells
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn matching(&self, predicate: impl Fn(&Topic) -> bool) -> Vec<Notify> {
        self.entries
            .values()
            .filter(|(topic, _)| predicate(topic))
            .map(|(_, notify)| notify.clone())
            .collect()
    }
}

/// Unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    store: Weak<Shared>,
}

impl Subscription {
    pub(super) fn new(id: u64, store: Weak<Shared>) -> Self {
        Self { id, store }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.store.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
