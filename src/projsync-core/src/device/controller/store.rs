// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Last-known property values.
//!
//! The store is owned by the poller and mutated once per successful cycle.
//! Consumers only ever see [`StateSnapshot`] copies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::device::value::{PropertyName, Value};

/// Successful reads collected during one cycle.
pub type Delta = BTreeMap<PropertyName, Value>;

/// Read-only projection of the store shared with consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Bumped on every commit that changed at least one entry.
    pub version: u64,
    pub values: BTreeMap<PropertyName, Value>,
}

impl StateSnapshot {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

#[derive(Debug, Default)]
pub struct StateStore {
    values: BTreeMap<PropertyName, Value>,
    version: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge a cycle's reads and return the keys whose value changed.
    pub fn apply_delta(&mut self, delta: &Delta) -> BTreeSet<PropertyName> {
        let mut changed = BTreeSet::new();
        for (name, value) in delta {
            if self.values.get(name) != Some(value) {
                self.values.insert(name.clone(), value.clone());
                changed.insert(name.clone());
            }
        }
        if !changed.is_empty() {
            self.version += 1;
        }
        changed
    }

    /// Drop every entry not named in `core`, returning the removed keys.
    pub fn invalidate_non_core(&mut self, core: &BTreeSet<PropertyName>) -> BTreeSet<PropertyName> {
        let removed: BTreeSet<PropertyName> = self
            .values
            .keys()
            .filter(|name| !core.contains(*name))
            .cloned()
            .collect();
        if !removed.is_empty() {
            self.values.retain(|name, _| core.contains(name));
            self.version += 1;
        }
        removed
    }

    /// Apply an optional invalidation followed by a delta as one step.
    ///
    /// The version advances at most once per commit.
    pub fn commit(
        &mut self,
        invalidate: Option<&BTreeSet<PropertyName>>,
        delta: &Delta,
    ) -> BTreeSet<PropertyName> {
        let before = self.version;
        let mut changed = match invalidate {
            Some(core) => self.invalidate_non_core(core),
            None => BTreeSet::new(),
        };
        changed.extend(self.apply_delta(delta));
        if !changed.is_empty() {
            self.version = before + 1;
        }
        changed
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            version: self.version,
            values: self.values.clone(),
        }
    }

    /// Forget everything, used when the device is torn down.
    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.version += 1;
        }
    }
}
