//! Send/receive events and the time-ordered scheduler.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ls_error::SimError;
use crate::ls_interface::{
    NodeId, Observation, PacketId, SimTime, BROADCAST, RECEIVE_EVENT, SEND_EVENT,
};
use crate::ls_packet::Packet;
use crate::ls_simulation::Simulation;

/// Who sends what to whom; the data every built-in event is made from
#[derive(Debug)]
pub struct Transmission {
    pub sender: NodeId,
    pub receiver: NodeId,
    pub packet: Option<Packet>,
}

impl Transmission {
    pub fn new(sender: NodeId, receiver: NodeId, packet: Packet) -> Self {
        Self {
            sender,
            receiver,
            packet: Some(packet),
        }
    }

    fn packet_id(&self) -> Option<PacketId> {
        self.packet.as_ref().map(Packet::id)
    }

    fn trace(&self, tag: &'static str) -> Observation {
        let routing = self.packet.as_ref().map(|p| *p.routing()).unwrap_or_default();
        Observation::EventTriggered {
            tag,
            sender: self.sender,
            receiver: self.receiver,
            packet: self.packet_id(),
            src: routing.src,
            dst: routing.dst,
            prev: routing.prev,
            next: routing.next,
        }
    }
}

/// Stable tie-break for events sharing a trigger time
///
/// Hash of `(time, sender, receiver, packet)`; identical inputs give the same
/// value on every run and platform.
pub fn tie_break(time: SimTime, sender: NodeId, receiver: NodeId, packet: Option<PacketId>) -> u64 {
    let packet = packet.map_or_else(|| "-".to_string(), |p| p.to_string());
    let key = format!("{}:{}:{}:{}", time, sender, receiver, packet);
    let hash = blake3::hash(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

pub trait Event {
    fn type_tag(&self) -> &'static str;

    fn trigger_time(&self) -> SimTime;

    /// Same-time ordering key; larger fires first
    fn priority(&self) -> u64;

    /// The node this event acts on
    fn actor(&self) -> NodeId;

    /// Trace record emitted just before the event fires
    fn trace(&self) -> Observation;

    fn trigger(self: Box<Self>, sim: &mut Simulation) -> Result<(), SimError>;
}

/// Hand a packet to the sender's send path
#[derive(Debug)]
pub struct SendEvent {
    time: SimTime,
    transmission: Transmission,
}

impl SendEvent {
    pub fn new(time: SimTime, transmission: Transmission) -> Self {
        Self { time, transmission }
    }

    pub fn boxed(time: SimTime, transmission: Transmission) -> Box<dyn Event> {
        Box::new(Self::new(time, transmission))
    }
}

impl Event for SendEvent {
    fn type_tag(&self) -> &'static str {
        SEND_EVENT
    }

    fn trigger_time(&self) -> SimTime {
        self.time
    }

    fn priority(&self) -> u64 {
        let t = &self.transmission;
        tie_break(self.time, t.sender, t.receiver, t.packet_id())
    }

    fn actor(&self) -> NodeId {
        self.transmission.sender
    }

    fn trace(&self) -> Observation {
        self.transmission.trace(SEND_EVENT)
    }

    fn trigger(mut self: Box<Self>, sim: &mut Simulation) -> Result<(), SimError> {
        let t = &mut self.transmission;
        let result = match t.packet.as_ref() {
            Some(packet) => sim.deliver_send(t.sender, packet),
            None => Err(SimError::MissingPacket { tag: SEND_EVENT }),
        };
        Packet::discard(&mut t.packet);
        result
    }
}

/// Deliver a packet to the receiver's protocol handler
#[derive(Debug)]
pub struct ReceiveEvent {
    time: SimTime,
    transmission: Transmission,
}

impl ReceiveEvent {
    pub fn new(time: SimTime, transmission: Transmission) -> Self {
        Self { time, transmission }
    }

    pub fn boxed(time: SimTime, transmission: Transmission) -> Box<dyn Event> {
        Box::new(Self::new(time, transmission))
    }
}

impl Event for ReceiveEvent {
    fn type_tag(&self) -> &'static str {
        RECEIVE_EVENT
    }

    fn trigger_time(&self) -> SimTime {
        self.time
    }

    fn priority(&self) -> u64 {
        let t = &self.transmission;
        tie_break(self.time, t.sender, t.receiver, t.packet_id())
    }

    fn actor(&self) -> NodeId {
        self.transmission.receiver
    }

    fn trace(&self) -> Observation {
        self.transmission.trace(RECEIVE_EVENT)
    }

    fn trigger(mut self: Box<Self>, sim: &mut Simulation) -> Result<(), SimError> {
        let t = &mut self.transmission;
        let result = match t.packet.as_mut() {
            Some(packet) => sim.deliver_receive(t.sender, t.receiver, packet),
            None => Err(SimError::MissingPacket { tag: RECEIVE_EVENT }),
        };
        Packet::discard(&mut t.packet);
        result
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// An event waiting in the queue
struct Queued {
    time: SimTime,
    priority: u64,
    seq: u64,
    event: Box<dyn Event>,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap pops the greatest: earliest time, then larger priority,
    // then first inserted
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered event queue and the simulation clock
pub struct Scheduler {
    queue: BinaryHeap<Queued>,
    now: SimTime,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            now: 0,
            next_seq: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn add(&mut self, event: Box<dyn Event>) {
        let queued = Queued {
            time: event.trigger_time(),
            priority: event.priority(),
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        self.queue.push(queued);
    }

    /// Trigger time of the next event, if any
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|q| q.time)
    }

    /// Pop the next event due at or before `end_time` and advance the clock
    ///
    /// Events past `end_time` stay queued. An event older than the clock is
    /// popped and reported as a fatal [`SimError::TimeOrderViolation`].
    pub fn pop_due(&mut self, end_time: SimTime) -> Result<Option<Box<dyn Event>>, SimError> {
        match self.queue.peek() {
            Some(next) if next.time <= end_time => {}
            _ => return Ok(None),
        }
        let Some(queued) = self.queue.pop() else {
            return Ok(None);
        };
        if queued.time < self.now {
            return Err(SimError::TimeOrderViolation {
                now: self.now,
                event: queued.time,
            });
        }
        self.now = queued.time;
        Ok(Some(queued.event))
    }

    /// Drain every pending event in firing order without triggering it
    pub fn flush(&mut self) -> Vec<Box<dyn Event>> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(queued) = self.queue.pop() {
            drained.push(queued.event);
        }
        drained
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Transmission {
    fn default() -> Self {
        Self {
            sender: BROADCAST,
            receiver: BROADCAST,
            packet: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(time: SimTime, sender: NodeId, receiver: NodeId) -> Box<dyn Event> {
        ReceiveEvent::boxed(
            time,
            Transmission {
                sender,
                receiver,
                packet: None,
            },
        )
    }

    #[test]
    fn test_tie_break_is_stable() {
        assert_eq!(tie_break(10, 1, 2, Some(3)), tie_break(10, 1, 2, Some(3)));
        assert_ne!(tie_break(10, 1, 2, Some(3)), tie_break(10, 2, 1, Some(3)));
        assert_ne!(tie_break(10, 1, 2, Some(3)), tie_break(10, 1, 2, None));
    }

    #[test]
    fn test_earlier_time_first() {
        let mut scheduler = Scheduler::new();
        scheduler.add(empty(30, 0, 1));
        scheduler.add(empty(10, 0, 2));
        scheduler.add(empty(20, 0, 3));

        let mut order = Vec::new();
        while let Some(event) = scheduler.pop_due(SimTime::MAX).unwrap() {
            order.push((event.trigger_time(), event.actor()));
        }
        assert_eq!(order, vec![(10, 2), (20, 3), (30, 1)]);
        assert_eq!(scheduler.now(), 30);
    }

    #[test]
    fn test_same_time_larger_priority_first() {
        let mut scheduler = Scheduler::new();
        let events: Vec<_> = (0..6).map(|r| empty(5, 0, r)).collect();
        let mut expected: Vec<_> = events.iter().map(|e| (e.priority(), e.actor())).collect();
        expected.sort_by(|a, b| b.0.cmp(&a.0));

        for event in events {
            scheduler.add(event);
        }
        let mut fired = Vec::new();
        while let Some(event) = scheduler.pop_due(5).unwrap() {
            fired.push((event.priority(), event.actor()));
        }
        assert_eq!(fired, expected);
    }

    #[test]
    fn test_identical_keys_fire_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.add(SendEvent::boxed(1, Transmission::default()));
        scheduler.add(ReceiveEvent::boxed(1, Transmission::default()));

        let first = scheduler.pop_due(1).unwrap().unwrap();
        let second = scheduler.pop_due(1).unwrap().unwrap();
        assert_eq!(first.type_tag(), SEND_EVENT);
        assert_eq!(second.type_tag(), RECEIVE_EVENT);
    }

    #[test]
    fn test_end_time_leaves_events_queued() {
        let mut scheduler = Scheduler::new();
        scheduler.add(empty(10, 0, 1));
        scheduler.add(empty(50, 0, 1));

        assert!(scheduler.pop_due(20).unwrap().is_some());
        assert!(scheduler.pop_due(20).unwrap().is_none());
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.peek_time(), Some(50));
        assert_eq!(scheduler.now(), 10);
    }

    #[test]
    fn test_time_order_violation() {
        let mut scheduler = Scheduler::new();
        scheduler.add(empty(40, 0, 1));
        scheduler.pop_due(100).unwrap();

        scheduler.add(empty(15, 0, 1));
        assert_eq!(
            scheduler.pop_due(100).err(),
            Some(SimError::TimeOrderViolation { now: 40, event: 15 })
        );
        assert_eq!(scheduler.now(), 40);
    }

    #[test]
    fn test_flush_drains_in_order() {
        let mut scheduler = Scheduler::new();
        scheduler.add(empty(9, 0, 1));
        scheduler.add(empty(3, 0, 2));
        let drained = scheduler.flush();
        assert_eq!(
            drained.iter().map(|e| e.trigger_time()).collect::<Vec<_>>(),
            vec![3, 9]
        );
        assert!(scheduler.is_empty());
    }
}
