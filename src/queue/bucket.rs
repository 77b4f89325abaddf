use std::collections::{HashMap, VecDeque};
use tracing::warn;
use crate::update::Update;
use super::key::MergeKey;

/// Result of buffering an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended at the tail of the bucket
    Queued,
    /// Folded into an already pending update; it will never run on its own
    Merged,
}

struct Entry {
    seq: i64,
    key: Option<MergeKey>,
    update: Update,
}

/// FIFO of pending updates for one stage, with a merge registry
///
/// - Insertion order = execution order
/// - Mergeable updates are indexed by `MergeKey` so enqueue finds an earlier
///   pending update of the same kind/key without scanning the bucket
/// - A merge keeps the absorbing (earliest) update's position
/// - Sequence numbers increase front to back; requeued updates take
///   numbers below the current front
#[derive(Default)]
pub struct StageBucket {
    entries: VecDeque<Entry>,
    /// merge key -> sequence number of the pending update holding it
    registry: HashMap<MergeKey, i64>,
    next_seq: i64,
    front_seq: i64,
}

impl StageBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `update`, merging it into a pending update with the same key
    pub fn push(&mut self, update: Update) -> EnqueueOutcome {
        let key = update.merge_key();
        match self.try_merge(key.as_ref(), update) {
            Ok(()) => EnqueueOutcome::Merged,
            Err(update) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.insert(seq, key, update);
                EnqueueOutcome::Queued
            }
        }
    }

    /// Put a popped update back at the head of the bucket, where it runs next
    ///
    /// A pending update with the same merge key absorbs it instead.
    pub fn push_front(&mut self, update: Update) -> EnqueueOutcome {
        let key = update.merge_key();
        match self.try_merge(key.as_ref(), update) {
            Ok(()) => EnqueueOutcome::Merged,
            Err(update) => {
                self.front_seq -= 1;
                self.insert(self.front_seq, key, update);
                EnqueueOutcome::Queued
            }
        }
    }

    fn try_merge(&mut self, key: Option<&MergeKey>, update: Update) -> Result<(), Update> {
        let Some(seq) = key.and_then(|k| self.registry.get(k).copied()) else {
            return Err(update);
        };
        let Some(pos) = self.position(seq) else {
            return Err(update);
        };
        self.entries[pos].update.absorb(update).map_err(|update| {
            warn!(kind = update.kind(), "merge key matched a non-mergeable update");
            update
        })
    }

    fn insert(&mut self, seq: i64, key: Option<MergeKey>, update: Update) {
        if let Some(k) = key.as_ref() {
            self.registry.insert(k.clone(), seq);
        }
        let entry = Entry { seq, key, update };
        match self.entries.front() {
            Some(front) if seq < front.seq => self.entries.push_front(entry),
            _ => self.entries.push_back(entry),
        }
    }

    fn position(&self, seq: i64) -> Option<usize> {
        self.entries.binary_search_by_key(&seq, |e| e.seq).ok()
    }

    fn unregister(registry: &mut HashMap<MergeKey, i64>, entry: &Entry) {
        if let Some(k) = entry.key.as_ref() {
            if registry.get(k) == Some(&entry.seq) {
                registry.remove(k);
            }
        }
    }

    /// Remove and return the oldest pending update
    pub fn pop_front(&mut self) -> Option<Update> {
        let entry = self.entries.pop_front()?;
        Self::unregister(&mut self.registry, &entry);
        Some(entry.update)
    }

    /// Remove every update matching `pred`, preserving the order of both halves
    pub fn extract_matching<F>(&mut self, mut pred: F) -> Vec<Update>
    where
        F: FnMut(&Update) -> bool,
    {
        let mut kept = VecDeque::with_capacity(self.entries.len());
        let mut taken = Vec::new();

        for entry in self.entries.drain(..) {
            if pred(&entry.update) {
                Self::unregister(&mut self.registry, &entry);
                taken.push(entry.update);
            } else {
                kept.push_back(entry);
            }
        }

        self.entries = kept;
        taken
    }

    /// Remove all pending updates in FIFO order
    pub fn take_all(&mut self) -> Vec<Update> {
        self.registry.clear();
        self.entries.drain(..).map(|e| e.update).collect()
    }

    pub fn clear(&mut self) {
        self.registry.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds of the pending updates, in execution order
    pub fn kinds(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.update.kind().to_string()).collect()
    }
}
