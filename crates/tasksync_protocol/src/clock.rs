//! Vector clocks.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every component is equal.
    Equal,
    /// `self` happened before `other`.
    Before,
    /// `self` happened after `other`.
    After,
    /// Neither dominates the other.
    Concurrent,
}

/// A vector clock: one monotonically non-decreasing counter per device.
///
/// Missing devices count as zero. The map is ordered so that encoded
/// clocks are byte-stable.
///
/// # Example
///
/// ```
/// use tasksync_protocol::{ClockOrdering, VectorClock};
///
/// let mut a = VectorClock::new();
/// a.increment("laptop");
/// let b = a.incremented("phone");
///
/// assert_eq!(a.compare(&b), ClockOrdering::Before);
/// assert_eq!(a.merged(&b), b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    /// Creates an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter for a device (zero if absent).
    pub fn get(&self, device_id: &str) -> u64 {
        self.0.get(device_id).copied().unwrap_or(0)
    }

    /// Bumps the counter for `device_id` by one, starting at 1.
    pub fn increment(&mut self, device_id: &str) {
        let counter = self.0.entry(device_id.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    /// Returns a copy of this clock with `device_id` incremented.
    #[must_use]
    pub fn incremented(&self, device_id: &str) -> Self {
        let mut next = self.clone();
        next.increment(device_id);
        next
    }

    /// Merges `other` into this clock (elementwise max over the key union).
    pub fn merge(&mut self, other: &VectorClock) {
        for (device, &counter) in &other.0 {
            let entry = self.0.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Returns the merge of this clock and `other`.
    #[must_use]
    pub fn merged(&self, other: &VectorClock) -> Self {
        let mut next = self.clone();
        next.merge(other);
        next
    }

    /// Compares two clocks component by component.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for device in self.0.keys().chain(other.0.keys()) {
            match self.get(device).cmp(&other.get(device)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Returns true if neither clock dominates the other.
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Returns true if no device has ticked yet.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&c| c == 0)
    }

    /// Number of devices tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over `(device, counter)` pairs in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(d, &c)| (d.as_str(), c))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(d, c)| (d.into(), c)).collect())
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }
}
