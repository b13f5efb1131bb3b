use std::any::Any;
use std::collections::BTreeSet;

use crate::ls_error::SimError;
use crate::ls_interface::{NodeId, Observation, SimTime, BROADCAST};
use crate::ls_packet::Packet;
use crate::ls_topology::Topology;

/// Per-variant protocol logic plugged into a [`Node`]
pub trait NodeHandler {
    fn type_tag(&self) -> &'static str;

    /// Called once the links are fixed and before any packet arrives
    fn on_topology_fixed(&mut self, _id: NodeId, _topology: &Topology) {}

    /// Handle one delivered packet. The packet is dropped by the caller
    /// after this returns; anything to forward goes through `ctx.send`.
    fn on_receive(&mut self, ctx: &mut HandlerContext<'_>, packet: &mut Packet)
        -> Result<(), SimError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// What a handler may touch while it runs
pub struct HandlerContext<'a> {
    id: NodeId,
    now: SimTime,
    neighbors: &'a BTreeSet<NodeId>,
    outbox: &'a mut Vec<Packet>,
    observations: &'a mut Vec<Observation>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        id: NodeId,
        now: SimTime,
        neighbors: &'a BTreeSet<NodeId>,
        outbox: &'a mut Vec<Packet>,
        observations: &'a mut Vec<Observation>,
    ) -> Self {
        Self {
            id,
            now,
            neighbors,
            outbox,
            observations,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        self.neighbors
    }

    /// Queue a replica of `packet` for the send path; routed by its
    /// `prev`/`next` fields. The caller keeps its own copy.
    pub fn send(&mut self, packet: &Packet) {
        self.outbox.push(packet.replicate());
    }

    pub fn report(&mut self, observation: Observation) {
        self.observations.push(observation);
    }
}

/// A simulated network node: identity, neighbor set and a protocol handler
pub struct Node {
    id: NodeId,
    neighbors: BTreeSet<NodeId>,
    handler: Box<dyn NodeHandler>,
}

impl Node {
    pub fn new(id: NodeId, handler: Box<dyn NodeHandler>) -> Self {
        Self {
            id,
            neighbors: BTreeSet::new(),
            handler,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn type_tag(&self) -> &'static str {
        self.handler.type_tag()
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    /// Directed link to `other`. Self-links and duplicates are ignored.
    pub fn add_neighbor(&mut self, other: NodeId) -> bool {
        if other == self.id {
            return false;
        }
        self.neighbors.insert(other)
    }

    pub fn remove_neighbor(&mut self, other: NodeId) -> bool {
        self.neighbors.remove(&other)
    }

    /// Neighbors a packet addressed to `next` reaches from here
    pub fn fan_out(&self, next: NodeId) -> Vec<NodeId> {
        self.neighbors
            .iter()
            .copied()
            .filter(|&n| next == BROADCAST || n == next)
            .collect()
    }

    pub fn prepare(&mut self, topology: &Topology) {
        self.handler.on_topology_fixed(self.id, topology);
    }

    /// Run the handler on a delivered packet
    pub fn receive(
        &mut self,
        now: SimTime,
        packet: &mut Packet,
        outbox: &mut Vec<Packet>,
        observations: &mut Vec<Observation>,
    ) -> Result<(), SimError> {
        let mut ctx = HandlerContext::new(self.id, now, &self.neighbors, outbox, observations);
        self.handler.on_receive(&mut ctx, packet)
    }

    pub fn handler(&self) -> &dyn NodeHandler {
        self.handler.as_ref()
    }

    pub fn handler_as<H: NodeHandler + 'static>(&self) -> Option<&H> {
        self.handler.as_any().downcast_ref::<H>()
    }

    pub fn handler_as_mut<H: NodeHandler + 'static>(&mut self) -> Option<&mut H> {
        self.handler.as_any_mut().downcast_mut::<H>()
    }
}
