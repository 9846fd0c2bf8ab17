//! Time-ordered event queue.

use rti_core::Event;
use rti_messages::Message;
use rti_types::FederateId;
use std::collections::BTreeMap;
use std::time::Duration;

/// Position of an event in the queue.
///
/// Events at the same simulated time run in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub sequence: u64,
}

/// Something that happens at a point in simulated time.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// A federate process starts and connects.
    Start(FederateId),
    /// Input for the coordinator.
    ToRti(Event),
    /// A message arrives at a federate.
    ToFederate {
        federate: FederateId,
        message: Message,
    },
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, SimEvent>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Duration, event: SimEvent) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.events.insert(key, event);
        key
    }

    /// Remove and return the earliest event.
    pub fn pop(&mut self) -> Option<(EventKey, SimEvent)> {
        self.events.pop_first()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_time_then_schedule_order() {
        let mut queue = EventQueue::new();
        queue.push(Duration::from_millis(5), SimEvent::Start(FederateId(0)));
        queue.push(Duration::from_millis(1), SimEvent::Start(FederateId(1)));
        queue.push(Duration::from_millis(5), SimEvent::Start(FederateId(2)));

        let order: Vec<FederateId> = std::iter::from_fn(|| queue.pop())
            .map(|(_, event)| match event {
                SimEvent::Start(id) => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![FederateId(1), FederateId(0), FederateId(2)]);
        assert!(queue.is_empty());
    }
}
