//! Pending quantity changes awaiting confirmation by the server.

use std::collections::BTreeMap;

use farm_market_core::LineId;

use crate::api::QuantityUpdate;

/// Latest desired quantity per basket line, not yet confirmed by the server.
///
/// Holds at most one entry per line: recording a line again overwrites the
/// previous value, so a burst of taps collapses into a single update. A
/// quantity of 0 asks the server to delete the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChangeSet {
    changes: BTreeMap<LineId, u32>,
}

impl PendingChangeSet {
    /// Create an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest desired quantity for a line.
    pub fn record(&mut self, line_id: LineId, quantity: u32) {
        self.changes.insert(line_id, quantity);
    }

    /// Desired quantity for a line, if it has a pending change.
    #[must_use]
    pub fn get(&self, line_id: LineId) -> Option<u32> {
        self.changes.get(&line_id).copied()
    }

    /// Number of lines with pending changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Pending entries in line order.
    pub fn iter(&self) -> impl Iterator<Item = (LineId, u32)> + '_ {
        self.changes.iter().map(|(line_id, quantity)| (*line_id, *quantity))
    }

    /// Drop every pending change.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Move all entries out, leaving this set empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Put back entries from an earlier snapshot.
    ///
    /// Entries recorded since the snapshot was taken are newer and win.
    pub fn restore(&mut self, earlier: Self) {
        for (line_id, quantity) in earlier.changes {
            self.changes.entry(line_id).or_insert(quantity);
        }
    }

    /// The batch request body for these changes.
    #[must_use]
    pub fn to_updates(&self) -> Vec<QuantityUpdate> {
        self.iter()
            .map(|(id, quantity)| QuantityUpdate { id, quantity })
            .collect()
    }
}

impl FromIterator<(LineId, u32)> for PendingChangeSet {
    fn from_iter<I: IntoIterator<Item = (LineId, u32)>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i32) -> LineId {
        LineId::new(id)
    }

    #[test]
    fn test_record_keeps_latest_value_only() {
        let mut pending = PendingChangeSet::new();
        pending.record(line(1), 3);
        pending.record(line(1), 4);
        pending.record(line(1), 2);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(line(1)), Some(2));
    }

    #[test]
    fn test_take_empties_source() {
        let mut pending: PendingChangeSet = [(line(1), 3), (line(2), 0)].into_iter().collect();
        let snapshot = pending.take();

        assert!(pending.is_empty());
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_restore_prefers_newer_entries() {
        let mut pending = PendingChangeSet::new();
        pending.record(line(1), 3);
        pending.record(line(2), 1);
        let snapshot = pending.take();

        // Edited while the snapshot was in flight.
        pending.record(line(2), 5);
        pending.restore(snapshot);

        assert_eq!(pending.get(line(1)), Some(3));
        assert_eq!(pending.get(line(2)), Some(5));
    }

    #[test]
    fn test_to_updates_is_ordered_by_line() {
        let pending: PendingChangeSet = [(line(9), 1), (line(2), 0), (line(5), 4)]
            .into_iter()
            .collect();

        let ids: Vec<i32> = pending
            .to_updates()
            .iter()
            .map(|update| update.id.as_i32())
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
