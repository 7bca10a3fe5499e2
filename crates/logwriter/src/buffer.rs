use crate::entry::{Entry, GroupKey};

use std::collections::HashMap;

/// The groups taken out of a [`PendingBuffer`] in one go, in the order they were first seen.
pub type Snapshot = Vec<(GroupKey, Vec<Entry>)>;

/// Entries waiting to be flushed, grouped by their [`GroupKey`].
///
/// Groups keep the order in which they were first seen and entries keep the order in which they
/// were appended. A group never holds an empty list: groups only come into existence by
/// appending to them and leave the buffer as a whole when it is drained.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    groups: Vec<(GroupKey, Vec<Entry>)>,
    index: HashMap<GroupKey, usize>,
    entry_count: usize,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the entries to the group's list, creating the group at the back if it is new.
    pub fn append(&mut self, key: GroupKey, mut entries: Vec<Entry>) {
        if entries.is_empty() {
            return;
        }
        self.entry_count += entries.len();
        match self.index.get(&key) {
            Some(&pos) => self.groups[pos].1.append(&mut entries),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, entries));
            }
        }
    }

    /// Takes out every group, leaving the buffer empty.
    pub fn drain(&mut self) -> Snapshot {
        self.index.clear();
        self.entry_count = 0;
        std::mem::take(&mut self.groups)
    }

    /// The number of entries held over all groups.
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &[Entry])> {
        self.groups
            .iter()
            .map(|(key, entries)| (key, entries.as_slice()))
    }
}
