use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

// ============================================================================
// Offset Tracking
// ============================================================================
//
// Messages from one partition are handled concurrently and can finish out of
// order. Kafka only stores one offset per partition, so the committed offset
// may only advance to the lowest message still in flight; everything below
// it has reached a terminal disposition.
//
// ============================================================================

#[derive(Default)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    highest_done: Option<i64>,
    committed: Option<i64>,
}

#[derive(Default)]
pub struct OffsetTracker {
    partitions: Mutex<HashMap<(String, i32), PartitionState>>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called in receive order, before the message is handled.
    pub fn begin(&self, topic: &str, partition: i32, offset: i64) {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        partitions
            .entry((topic.to_string(), partition))
            .or_default()
            .in_flight
            .insert(offset);
    }

    /// Mark a message done. Returns the next offset to commit when the safe
    /// commit point moved forward.
    pub fn complete(&self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        let state = partitions.get_mut(&(topic.to_string(), partition))?;

        if !state.in_flight.remove(&offset) {
            return None;
        }
        state.highest_done = state.highest_done.max(Some(offset));

        let next = match state.in_flight.first() {
            Some(&lowest) => lowest,
            None => state.highest_done? + 1,
        };

        if state.committed.map_or(true, |committed| next > committed) {
            state.committed = Some(next);
            Some(next)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        let partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        partitions.values().map(|p| p.in_flight.len()).sum()
    }
}
