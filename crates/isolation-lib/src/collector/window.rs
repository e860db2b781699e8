//! Fixed-capacity rolling history for one tenant
//!
//! Snapshots live in a preallocated slot vector indexed by a moving
//! head, so retained history never grows past `capacity` and the oldest
//! entry is overwritten first.

use crate::models::ResourceSnapshot;

/// Default number of snapshots retained per tenant
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// Ring buffer of snapshots ordered by strictly increasing timestamp
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    slots: Vec<ResourceSnapshot>,
    /// Index of the oldest entry once the buffer has wrapped
    head: usize,
    capacity: usize,
}

impl MetricsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest when full
    ///
    /// Returns false (and stores nothing) if the timestamp does not
    /// advance past the newest retained entry.
    pub fn push(&mut self, snapshot: ResourceSnapshot) -> bool {
        if let Some(latest) = self.latest() {
            if snapshot.timestamp <= latest.timestamp {
                return false;
            }
        }

        if self.slots.len() < self.capacity {
            self.slots.push(snapshot);
        } else {
            self.slots[self.head] = snapshot;
            self.head = (self.head + 1) % self.capacity;
        }
        true
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    pub fn latest(&self) -> Option<&ResourceSnapshot> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots.get(idx)
    }

    /// Copy every snapshot taken at or after `timestamp`
    pub fn since(&self, timestamp: f64) -> Vec<ResourceSnapshot> {
        self.iter()
            .filter(|s| s.timestamp >= timestamp)
            .cloned()
            .collect()
    }

    pub fn to_vec(&self) -> Vec<ResourceSnapshot> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: ts,
            tenant_id: "t1".to_string(),
            cpu_percent: ts,
            memory_mb: 100.0,
            thread_count: 1,
            fd_count: 1,
        }
    }

    #[test]
    fn test_push_until_full_then_evict_fifo() {
        let mut window = MetricsWindow::new(3);
        for ts in 1..=5 {
            assert!(window.push(at(ts as f64)));
        }

        assert_eq!(window.len(), 3);
        let timestamps: Vec<f64> = window.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![3.0, 4.0, 5.0]);
        assert_eq!(window.latest().unwrap().timestamp, 5.0);
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let mut window = MetricsWindow::new(4);
        assert!(window.push(at(10.0)));
        assert!(!window.push(at(10.0)));
        assert!(!window.push(at(9.0)));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_since_filters_by_timestamp() {
        let mut window = MetricsWindow::new(10);
        for ts in 1..=6 {
            window.push(at(ts as f64));
        }
        let recent = window.since(4.0);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 4.0);
    }

    #[test]
    fn test_empty_window() {
        let window = MetricsWindow::default();
        assert!(window.is_empty());
        assert!(window.latest().is_none());
        assert_eq!(window.capacity(), DEFAULT_WINDOW_CAPACITY);
        assert!(window.since(0.0).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = MetricsWindow::new(0);
        window.push(at(1.0));
        window.push(at(2.0));
        assert_eq!(window.len(), 1);
        assert_eq!(window.latest().unwrap().timestamp, 2.0);
    }
}
