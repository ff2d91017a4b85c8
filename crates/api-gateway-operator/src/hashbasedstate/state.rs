use std::collections::{BTreeMap, btree_map::Entry};

use super::{Hashable, Result, hash_key};

/// The objects generated from an APIRule, keyed by hash key.
#[derive(Debug)]
pub struct Desired<H> {
    pub(super) hashables: BTreeMap<String, H>,
}

impl<H> Default for Desired<H> {
    fn default() -> Self {
        Self {
            hashables: BTreeMap::new(),
        }
    }
}

impl<H: Hashable> Desired<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object with identity labels. An object with the same hash key
    /// replaces the previous one.
    pub fn add(&mut self, hashable: H) -> Result<()> {
        let key = hash_key(&hashable)?;
        self.hashables.insert(key, hashable);

        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.hashables.contains_key(key)
    }

    /// Iterates over all entries ordered by hash key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &H)> {
        self.hashables.iter().map(|(key, h)| (key.as_str(), h))
    }

    pub fn len(&self) -> usize {
        self.hashables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashables.is_empty()
    }
}

/// The objects found in the cluster for an APIRule.
///
/// Objects without hash or index label, and every object after the first
/// with the same hash key, are kept separately and are always deleted, see
/// [`get_changes`][super::get_changes].
#[derive(Debug)]
pub struct Actual<H> {
    pub(super) hashables: BTreeMap<String, H>,
    pub(super) marked_for_deletion: Vec<H>,
}

impl<H> Default for Actual<H> {
    fn default() -> Self {
        Self {
            hashables: BTreeMap::new(),
            marked_for_deletion: Vec::new(),
        }
    }
}

impl<H: Hashable> Actual<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object found in the cluster. Objects without identity and
    /// duplicates of an already added key are marked for deletion.
    pub fn add(&mut self, hashable: H) {
        match hash_key(&hashable) {
            Ok(key) => match self.hashables.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(hashable);
                }
                Entry::Occupied(entry) => {
                    tracing::debug!(
                        key = %entry.key(),
                        "duplicate object is marked for deletion"
                    );
                    self.marked_for_deletion.push(hashable);
                }
            },
            Err(error) => {
                tracing::debug!(%error, "object without identity is marked for deletion");
                self.marked_for_deletion.push(hashable);
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.hashables.contains_key(key)
    }

    /// Iterates over all keyed entries ordered by hash key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &H)> {
        self.hashables.iter().map(|(key, h)| (key.as_str(), h))
    }

    pub fn marked_for_deletion(&self) -> &[H] {
        &self.marked_for_deletion
    }
}
