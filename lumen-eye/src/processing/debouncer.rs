//! Occupancy debouncing: report a room only when its occupancy flips

use chrono::{DateTime, Utc};
use lumen_core::DeviceState;
use serde::Serialize;

/// Emitted once per occupancy edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyTransition {
    pub room_id: String,
    /// `None` on the first observation of a room
    pub previous: Option<bool>,
    pub occupied: bool,
    pub person_count: usize,
    /// Device state after the energy policy was applied for this edge
    pub devices: DeviceState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OccupancyDebouncer {
    room_id: String,
    previous_occupied: Option<bool>,
    person_count: usize,
}

impl OccupancyDebouncer {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            previous_occupied: None,
            person_count: 0,
        }
    }

    /// Record the latest person count. Returns a transition on the first
    /// observation and whenever `count > 0` differs from the last one.
    pub fn observe(&mut self, count: usize) -> Option<OccupancyTransition> {
        self.person_count = count;
        let occupied = count > 0;
        if self.previous_occupied == Some(occupied) {
            return None;
        }

        let previous = self.previous_occupied.replace(occupied);
        Some(OccupancyTransition {
            room_id: self.room_id.clone(),
            previous,
            occupied,
            person_count: count,
            devices: DeviceState::default(),
            timestamp: Utc::now(),
        })
    }

    pub fn person_count(&self) -> usize {
        self.person_count
    }

    pub fn occupied(&self) -> Option<bool> {
        self.previous_occupied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_observation_fires() {
        let mut debouncer = OccupancyDebouncer::new("Lab");
        let event = debouncer.observe(0).unwrap();
        assert_eq!(event.previous, None);
        assert!(!event.occupied);
        assert_eq!(event.room_id, "Lab");
    }

    #[test]
    fn test_edge_sequence() {
        let mut debouncer = OccupancyDebouncer::new("A");
        let events: Vec<Option<OccupancyTransition>> =
            [0, 0, 2, 2, 0].iter().map(|&c| debouncer.observe(c)).collect();

        // index 0 is the initial "unknown" edge
        assert!(events[1].is_none());
        assert!(events[3].is_none());

        let rise = events[2].as_ref().unwrap();
        assert!(rise.occupied);
        assert_eq!(rise.person_count, 2);
        assert_eq!(rise.previous, Some(false));

        let fall = events[4].as_ref().unwrap();
        assert!(!fall.occupied);
        assert_eq!(fall.person_count, 0);
        assert_eq!(fall.previous, Some(true));
    }

    #[test]
    fn test_count_updates_without_transition() {
        let mut debouncer = OccupancyDebouncer::new("A");
        debouncer.observe(1);
        assert!(debouncer.observe(4).is_none());
        assert_eq!(debouncer.person_count(), 4);
        assert_eq!(debouncer.occupied(), Some(true));
    }

    proptest! {
        #[test]
        fn prop_fires_iff_occupancy_changes(counts in prop::collection::vec(0usize..5, 0..64)) {
            let mut debouncer = OccupancyDebouncer::new("P");
            let mut last: Option<bool> = None;
            for count in counts {
                let occupied = count > 0;
                let event = debouncer.observe(count);
                prop_assert_eq!(event.is_some(), last != Some(occupied));
                if let Some(event) = event {
                    prop_assert_eq!(event.previous, last);
                    prop_assert_eq!(event.occupied, occupied);
                    prop_assert_eq!(event.person_count, count);
                }
                last = Some(occupied);
            }
        }
    }
}
