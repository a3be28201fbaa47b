//! The set of components marked for removal, versioned for cache keys.
use std::collections::BTreeSet;
use std::sync::Arc;

/// Mutable exclusion set. Every mutation bumps `version`, including a toggle
/// that restores an earlier membership, so versions never repeat.
#[derive(Debug, Clone, Default)]
pub struct ExclusionState {
    members: BTreeSet<usize>,
    version: u64,
}

impl ExclusionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with an initial set (version 0).
    pub fn with_excluded(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            members: indices.into_iter().collect(),
            version: 0,
        }
    }

    /// Flip membership of `component`; returns the new version.
    pub fn toggle(&mut self, component: usize) -> u64 {
        if !self.members.remove(&component) {
            self.members.insert(component);
        }
        self.version += 1;
        self.version
    }

    pub fn contains(&self, component: usize) -> bool {
        self.members.contains(&component)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Excluded indices in ascending order.
    pub fn excluded(&self) -> Vec<usize> {
        self.members.iter().copied().collect()
    }

    pub fn snapshot(&self) -> Fingerprint {
        Fingerprint {
            members: Arc::new(self.members.clone()),
            version: self.version,
        }
    }
}

/// Immutable view of an [`ExclusionState`] at one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    members: Arc<BTreeSet<usize>>,
    version: u64,
}

impl Fingerprint {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn members(&self) -> &BTreeSet<usize> {
        &self.members
    }

    pub fn contains(&self, component: usize) -> bool {
        self.members.contains(&component)
    }

    /// Members plus an optional extra candidate.
    pub fn with_candidate(&self, candidate: Option<usize>) -> BTreeSet<usize> {
        let mut set = (*self.members).clone();
        set.extend(candidate);
        set
    }
}
