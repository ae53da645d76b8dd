//! Ordered, id-unique collection of one entity kind
//!
//! Newest entries sit at the front. Every method is synchronous: callers
//! compose them into single store transitions.

use shared::{EntityId, Record};

/// How a create response was folded into the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateReconciliation {
    /// The temporary entry was replaced in place
    Replaced,
    /// The canonical id was already present; the temporary entry was dropped
    Merged,
    /// Neither entry was present any more; nothing was written
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Record> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a fetched list, keeping the first occurrence of each id
    pub fn from_records(records: Vec<T>) -> Self {
        let mut items: Vec<T> = Vec::with_capacity(records.len());
        for record in records {
            if !items.iter().any(|existing| existing.id() == record.id()) {
                items.push(record);
            }
        }
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Prepend unless the id is already present; existence check and insert are one step
    pub fn insert_if_absent(&mut self, record: T) -> bool {
        if self.contains(record.id()) {
            return false;
        }
        self.items.insert(0, record);
        true
    }

    /// Replace the entry with the same id, returning the previous value
    pub fn replace(&mut self, record: T) -> Option<T> {
        let index = self.position(record.id())?;
        Some(std::mem::replace(&mut self.items[index], record))
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<(usize, T)> {
        let index = self.position(id)?;
        Some((index, self.items.remove(index)))
    }

    /// Remove every entry matching `predicate`, returning them with their
    /// original positions in ascending order
    pub fn extract_where<F>(&mut self, mut predicate: F) -> Vec<(usize, T)>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for (index, item) in std::mem::take(&mut self.items).into_iter().enumerate() {
            if predicate(&item) {
                removed.push((index, item));
            } else {
                kept.push(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Put a removed entry back at its former position unless its id came back meanwhile
    pub fn restore(&mut self, index: usize, record: T) -> bool {
        if self.contains(record.id()) {
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, record);
        true
    }

    /// Fold the server's answer to an optimistic create into the collection.
    /// When the change feed delivered the canonical entity first, the newer
    /// copy by `updated_at` wins and the temporary entry disappears.
    pub fn reconcile_created(&mut self, temporary_id: &EntityId, canonical: T) -> CreateReconciliation {
        match (self.position(canonical.id()), self.position(temporary_id)) {
            (Some(existing), temporary) => {
                if canonical.updated_at() >= self.items[existing].updated_at() {
                    self.items[existing] = canonical;
                }
                if let Some(index) = temporary {
                    self.items.remove(index);
                }
                CreateReconciliation::Merged
            }
            (None, Some(index)) => {
                self.items[index] = canonical;
                CreateReconciliation::Replaced
            }
            (None, None) => CreateReconciliation::Dropped,
        }
    }
}
