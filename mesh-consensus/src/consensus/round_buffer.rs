use std::collections::{BTreeMap, BTreeSet, HashMap};

use mesh_common::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First value for this (round, sender) slot.
    Recorded,
    /// Slot already held a value; it was replaced, not added.
    Overwritten,
    /// The round was already consumed; the value is discarded.
    Retired,
}

/// Values received from neighbours, keyed by round then sender.
///
/// Early arrivals for future rounds are kept until the engine reaches them.
/// Once a round is retired its slots are gone and late values for it (or any
/// earlier round) are refused, so they can never leak into a later round.
#[derive(Debug, Default, Clone)]
pub struct RoundBuffer {
    rounds: BTreeMap<u64, HashMap<NodeId, f64>>,
    // Every round < this has been consumed.
    next_live: u64,
}

impl RoundBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, round: u64, src: NodeId, value: f64) -> RecordOutcome {
        if self.is_retired(round) {
            return RecordOutcome::Retired;
        }
        match self.rounds.entry(round).or_default().insert(src, value) {
            Some(_) => RecordOutcome::Overwritten,
            None => RecordOutcome::Recorded,
        }
    }

    /// Number of `neighbors` with a value buffered for `round`.
    pub fn received_from(&self, round: u64, neighbors: &BTreeSet<NodeId>) -> usize {
        self.rounds
            .get(&round)
            .map(|slots| neighbors.iter().filter(|n| slots.contains_key(*n)).count())
            .unwrap_or(0)
    }

    pub fn has_all(&self, round: u64, neighbors: &BTreeSet<NodeId>) -> bool {
        self.received_from(round, neighbors) == neighbors.len()
    }

    pub fn get(&self, round: u64, src: &NodeId) -> Option<f64> {
        self.rounds.get(&round).and_then(|slots| slots.get(src)).copied()
    }

    /// Consumes `round`, returning its values. Rounds before it are dropped too.
    pub fn retire(&mut self, round: u64) -> HashMap<NodeId, f64> {
        let taken = self.rounds.remove(&round).unwrap_or_default();
        if round >= self.next_live {
            self.next_live = round + 1;
            self.rounds = self.rounds.split_off(&self.next_live);
        }
        taken
    }

    pub fn is_retired(&self, round: u64) -> bool {
        round < self.next_live
    }

    /// Forgets every slot and reopens round 0 for a new run.
    pub fn reset(&mut self) {
        self.rounds.clear();
        self.next_live = 0;
    }

    /// Rounds with at least one buffered value.
    pub fn pending_rounds(&self) -> Vec<u64> {
        self.rounds.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbors(ids: &[&str]) -> BTreeSet<NodeId> {
        ids.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn test_duplicate_slot_is_not_double_counted() {
        let mut buf = RoundBuffer::new();
        let n = neighbors(&["A", "C"]);

        assert_eq!(buf.record(0, "A".into(), 1.0), RecordOutcome::Recorded);
        assert_eq!(buf.record(0, "A".into(), 2.0), RecordOutcome::Overwritten);

        assert_eq!(buf.received_from(0, &n), 1);
        assert!(!buf.has_all(0, &n));
        assert_eq!(buf.get(0, &"A".into()), Some(2.0));
    }

    #[test]
    fn test_non_neighbors_do_not_fill_the_round() {
        let mut buf = RoundBuffer::new();
        let n = neighbors(&["A"]);
        buf.record(0, "Z".into(), 5.0);

        assert_eq!(buf.received_from(0, &n), 0);
        buf.record(0, "A".into(), 5.0);
        assert!(buf.has_all(0, &n));
    }

    #[test]
    fn test_early_values_wait_for_their_round() {
        let mut buf = RoundBuffer::new();
        let n = neighbors(&["A"]);

        buf.record(3, "A".into(), 7.0);
        assert_eq!(buf.received_from(0, &n), 0);

        buf.retire(0);
        buf.retire(1);
        buf.retire(2);
        assert!(buf.has_all(3, &n));
        assert_eq!(buf.retire(3).get(&NodeId::from("A")), Some(&7.0));
    }

    #[test]
    fn test_late_value_never_reaches_next_round() {
        let mut buf = RoundBuffer::new();
        let n = neighbors(&["A"]);

        buf.retire(0);
        assert_eq!(buf.record(0, "A".into(), 9.0), RecordOutcome::Retired);
        assert_eq!(buf.received_from(1, &n), 0);
        assert!(buf.pending_rounds().is_empty());
    }

    #[test]
    fn test_retire_drops_skipped_rounds() {
        let mut buf = RoundBuffer::new();
        buf.record(1, "A".into(), 1.0);
        buf.record(2, "A".into(), 2.0);
        buf.record(5, "A".into(), 5.0);

        buf.retire(2);
        assert!(buf.is_retired(1));
        assert_eq!(buf.pending_rounds(), vec![5]);
    }

    #[test]
    fn test_reset_reopens_round_zero() {
        let mut buf = RoundBuffer::new();
        let n = neighbors(&["A"]);
        buf.record(0, "A".into(), 1.0);
        buf.retire(0);
        buf.record(4, "A".into(), 4.0);

        buf.reset();
        assert!(!buf.is_retired(0));
        assert!(buf.pending_rounds().is_empty());
        assert_eq!(buf.record(0, "A".into(), 2.0), RecordOutcome::Recorded);
        assert!(buf.has_all(0, &n));
    }

    #[test]
    fn test_empty_neighbor_set_is_always_complete() {
        let buf = RoundBuffer::new();
        assert!(buf.has_all(0, &BTreeSet::new()));
    }
}
