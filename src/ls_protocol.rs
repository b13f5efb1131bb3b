//! LS3D rendezvous protocol
//!
//! A publish or query packet performs a depth-first walk over the density
//! landscape (density = size of a node's 2-hop neighborhood). Climbing from
//! any node leads to a local density maximum, the hilltop, where publishers
//! leave a `host -> proxy` record and queries look it up.
//!
//! Order used everywhere: a neighbor with the same density but a larger id
//! counts as denser.

use std::any::Any;
use std::collections::BTreeMap;

use log::{debug, trace};

use crate::ls_config::{DuplicateHilltop, SimConfig};
use crate::ls_error::SimError;
use crate::ls_interface::{
    Density, NodeId, Observation, PacketId, WalkEnd, BROADCAST, LS3D_HEADER, LS3D_NODE,
    LS3D_PACKET, LS3D_PAYLOAD,
};
use crate::ls_node::{HandlerContext, NodeHandler};
use crate::ls_packet::{Header, Packet, Payload, Routing};
use crate::ls_registry::{Catalog, HeaderCtor, NodeCtor, PacketCtor, PayloadCtor};
use crate::ls_topology::Topology;
use crate::ls_walk::{Direction, WalkState};

/// Register the LS3D header, payload, packet and node variants
pub fn register(catalog: &mut Catalog) {
    catalog
        .headers
        .register(LS3D_HEADER, Ls3dHeader::boxed as HeaderCtor);
    catalog
        .payloads
        .register(LS3D_PAYLOAD, Ls3dPayload::boxed as PayloadCtor);
    catalog
        .packets
        .register(LS3D_PACKET, new_ls3d_packet as PacketCtor);
    catalog.nodes.register(LS3D_NODE, Ls3dNode::boxed as NodeCtor);
}

fn new_ls3d_packet(catalog: &Catalog, id: PacketId) -> Result<Packet, SimError> {
    catalog.assemble(LS3D_PACKET, id, LS3D_HEADER, LS3D_PAYLOAD)
}

// ============================================================================
// Header & Payload
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Intent {
    Publish,
    #[default]
    Query,
}

#[derive(Clone, Debug, Default)]
pub struct Ls3dHeader {
    pub routing: Routing,
    pub intent: Intent,
    pub walk: WalkState,
}

impl Ls3dHeader {
    fn boxed() -> Box<dyn Header> {
        Box::new(Self::default())
    }

    pub fn is_publish(&self) -> bool {
        self.intent == Intent::Publish
    }
}

impl Header for Ls3dHeader {
    fn type_tag(&self) -> &'static str {
        LS3D_HEADER
    }

    fn routing(&self) -> &Routing {
        &self.routing
    }

    fn routing_mut(&mut self) -> &mut Routing {
        &mut self.routing
    }

    fn clone_box(&self) -> Box<dyn Header> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ls3dPayload {
    /// publisher: itself; subscriber: the host being looked up
    pub host: NodeId,
    /// publisher's proxy; unused by queries
    pub proxy: NodeId,
}

impl Default for Ls3dPayload {
    fn default() -> Self {
        Self {
            host: BROADCAST,
            proxy: 0,
        }
    }
}

impl Ls3dPayload {
    fn boxed() -> Box<dyn Payload> {
        Box::new(Self::default())
    }
}

impl Payload for Ls3dPayload {
    fn type_tag(&self) -> &'static str {
        LS3D_PAYLOAD
    }

    fn clone_box(&self) -> Box<dyn Payload> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fill a fresh LS3D packet for a seeded publish or query
///
/// Publishes carry `host = BROADCAST` and record under the source id, the
/// same way the stored key is the packet's `src`.
pub fn prepare_request(
    packet: &mut Packet,
    intent: Intent,
    source: NodeId,
    host: NodeId,
    proxy: NodeId,
) -> Result<(), SimError> {
    let (header, payload) = packet.parts_mut::<Ls3dHeader, Ls3dPayload>()?;
    header.routing = Routing {
        src: source,
        dst: host,
        prev: source,
        next: source,
    };
    header.intent = intent;
    header.walk = WalkState::new();
    payload.host = host;
    payload.proxy = proxy;
    Ok(())
}

// ============================================================================
// Proxy Store
// ============================================================================

/// host -> proxy records kept by a node; the first record for a host wins
#[derive(Clone, Debug, Default)]
pub struct ProxyStore {
    records: BTreeMap<NodeId, NodeId>,
}

impl ProxyStore {
    /// Returns false when the host already had a record
    pub fn insert(&mut self, host: NodeId, proxy: NodeId) -> bool {
        match self.records.entry(host) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(proxy);
                true
            }
        }
    }

    pub fn get(&self, host: NodeId) -> Option<NodeId> {
        self.records.get(&host).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.records.iter().map(|(h, p)| (*h, *p))
    }
}

// ============================================================================
// Landscape
// ============================================================================

/// A node's local view: its own density and each neighbor's
#[derive(Clone, Debug)]
pub struct Landscape {
    me: NodeId,
    density: Density,
    neighbors: Vec<(NodeId, Density)>,
}

impl Landscape {
    pub fn new(me: NodeId, density: Density, neighbors: Vec<(NodeId, Density)>) -> Self {
        Self {
            me,
            density,
            neighbors,
        }
    }

    fn is_denser(&self, (id, density): (NodeId, Density)) -> bool {
        (density, id) > (self.density, self.me)
    }

    fn is_sparser(&self, (id, density): (NodeId, Density)) -> bool {
        (density, id) < (self.density, self.me)
    }

    pub fn denser(&self) -> Vec<NodeId> {
        self.neighbors
            .iter()
            .filter(|&&n| self.is_denser(n))
            .map(|&(id, _)| id)
            .collect()
    }

    pub fn sparser(&self) -> Vec<NodeId> {
        self.neighbors
            .iter()
            .filter(|&&n| self.is_sparser(n))
            .map(|&(id, _)| id)
            .collect()
    }

    /// No neighbor is denser
    pub fn is_hilltop(&self) -> bool {
        !self.neighbors.iter().any(|&n| self.is_denser(n))
    }

    /// No neighbor is sparser
    pub fn is_valley(&self) -> bool {
        !self.neighbors.iter().any(|&n| self.is_sparser(n))
    }

    /// All neighbors, sparsest first
    pub fn ascending(&self) -> Vec<NodeId> {
        let mut ranked = self.neighbors.clone();
        ranked.sort_by_key(|&(id, density)| (density, id));
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    /// All neighbors, densest first
    pub fn descending(&self) -> Vec<NodeId> {
        let mut ranked = self.ascending();
        ranked.reverse();
        ranked
    }
}

// ============================================================================
// Walk Step
// ============================================================================

/// Result of one hop of the walk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Forward the packet to this neighbor
    Forward(NodeId),
    /// The walk is over
    Finish(Outcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A second hilltop on the way up kept the publisher's record
    Stored,
    /// A query got its answer (or definitive miss) at a hilltop
    Answered(Option<NodeId>),
    /// The walk stopped without a hilltop answer
    Ended(WalkEnd),
}

/// Side effects of a step besides the forwarding decision
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepEffects {
    /// A new record was written into this node's store
    pub stored: Option<(NodeId, NodeId)>,
}

/// Decide the next hop for a packet that just arrived at `landscape.me`
///
/// Mutates the walk state in `header` and, for publishes at hilltops, the
/// node's proxy store.
pub fn step(
    landscape: &Landscape,
    header: &mut Ls3dHeader,
    payload: &Ls3dPayload,
    store: &mut ProxyStore,
    policy: DuplicateHilltop,
    effects: &mut StepEffects,
) -> Step {
    let me = landscape.me;
    header.walk.push(me);
    let walked = header.walk.walked();
    let first_unwalked =
        |ranked: Vec<NodeId>| ranked.into_iter().find(|n| !walked.contains(n));

    let hilltop = landscape.is_hilltop();

    if hilltop && header.walk.hilltop_once {
        match header.walk.direction {
            Direction::Down => {
                header.walk.hilltop_once = false;
                if policy == DuplicateHilltop::Stop {
                    return Step::Finish(Outcome::Ended(WalkEnd::DuplicateHilltop));
                }
                // Resume: handled as a first visit below
            }
            Direction::Up if header.is_publish() => {
                if store.insert(header.routing.src, payload.proxy) {
                    effects.stored = Some((header.routing.src, payload.proxy));
                }
                return Step::Finish(Outcome::Stored);
            }
            Direction::Up => {
                return Step::Finish(Outcome::Answered(store.get(payload.host)));
            }
        }
    }

    if hilltop {
        if header.is_publish() {
            if store.insert(header.routing.src, payload.proxy) {
                effects.stored = Some((header.routing.src, payload.proxy));
            }
        } else if let Some(proxy) = store.get(payload.host) {
            return Step::Finish(Outcome::Answered(Some(proxy)));
        }

        if let Some(next) = first_unwalked(landscape.ascending()) {
            header.walk.hilltop_once = true;
            header.walk.direction = Direction::Down;
            return Step::Forward(next);
        }
        return backtrack(header, |walk| {
            walk.hilltop_once = false;
            walk.direction = Direction::Up;
        });
    }

    if landscape.is_valley() {
        if let Some(next) = first_unwalked(landscape.descending()) {
            header.walk.direction = Direction::Up;
            return Step::Forward(next);
        }
        return backtrack(header, |walk| walk.direction = Direction::Down);
    }

    let ranked = match header.walk.direction {
        Direction::Up => landscape.descending(),
        Direction::Down => landscape.ascending(),
    };
    if let Some(next) = first_unwalked(ranked) {
        return Step::Forward(next);
    }
    backtrack(header, |_| {})
}

fn backtrack(header: &mut Ls3dHeader, adjust: impl FnOnce(&mut WalkState)) -> Step {
    match header.walk.backtrack() {
        Some(target) => {
            adjust(&mut header.walk);
            Step::Forward(target)
        }
        None => Step::Finish(Outcome::Ended(WalkEnd::Exhausted)),
    }
}

// ============================================================================
// Node
// ============================================================================

/// LS3D node state: densities learned from the topology plus the proxy store
#[derive(Clone, Debug, Default)]
pub struct Ls3dNode {
    two_hop: hashbrown::HashSet<NodeId>,
    neighbor_density: BTreeMap<NodeId, Density>,
    store: ProxyStore,
    policy: DuplicateHilltop,
}

impl Ls3dNode {
    pub fn new(policy: DuplicateHilltop) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    fn boxed(_id: NodeId, config: &SimConfig) -> Box<dyn NodeHandler> {
        Box::new(Self::new(config.duplicate_hilltop))
    }

    pub fn density(&self) -> Density {
        self.two_hop.len()
    }

    pub fn neighbor_density(&self, neighbor: NodeId) -> Option<Density> {
        self.neighbor_density.get(&neighbor).copied()
    }

    pub fn store(&self) -> &ProxyStore {
        &self.store
    }

    /// Record a mapping directly, bypassing the walk
    pub fn add_node_proxy(&mut self, host: NodeId, proxy: NodeId) -> bool {
        self.store.insert(host, proxy)
    }

    pub fn get_node_proxy(&self, host: NodeId) -> Option<NodeId> {
        self.store.get(host)
    }

    fn landscape(&self, me: NodeId, neighbors: impl Iterator<Item = NodeId>) -> Landscape {
        let neighbors = neighbors
            .map(|n| (n, self.neighbor_density.get(&n).copied().unwrap_or(0)))
            .collect();
        Landscape::new(me, self.density(), neighbors)
    }
}

impl NodeHandler for Ls3dNode {
    fn type_tag(&self) -> &'static str {
        LS3D_NODE
    }

    fn on_topology_fixed(&mut self, id: NodeId, topology: &Topology) {
        self.two_hop = topology.two_hop(id).into_iter().collect();
        self.neighbor_density = topology
            .neighbors(id)
            .map(|n| (n, topology.density(n)))
            .collect();
        trace!("node {} density {}", id, self.density());
    }

    fn on_receive(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        packet: &mut Packet,
    ) -> Result<(), SimError> {
        let me = ctx.id();
        let landscape = self.landscape(me, ctx.neighbors().iter().copied());
        let packet_id = packet.id();

        let mut effects = StepEffects::default();
        let (decision, intent, host) = {
            let (header, payload) = packet.parts_mut::<Ls3dHeader, Ls3dPayload>()?;
            let decision = step(
                &landscape,
                header,
                payload,
                &mut self.store,
                self.policy,
                &mut effects,
            );
            if let Step::Forward(next) = decision {
                header.routing.prev = me;
                header.routing.next = next;
            }
            (decision, header.intent, payload.host)
        };

        if let Some((host, proxy)) = effects.stored {
            debug!("node {} stores proxy {} for host {}", me, proxy, host);
            ctx.report(Observation::ProxyStored { host, proxy });
        }

        match decision {
            Step::Forward(next) => {
                trace!("node {} forwards packet {} to {}", me, packet_id, next);
                ctx.send(packet);
            }
            Step::Finish(Outcome::Stored) => {}
            Step::Finish(Outcome::Answered(Some(proxy))) => {
                ctx.report(Observation::ProxyFound { host, proxy });
            }
            Step::Finish(Outcome::Answered(None)) => {
                ctx.report(Observation::ProxyNotFound { host });
            }
            Step::Finish(Outcome::Ended(reason)) => {
                debug!("walk of packet {} ended at node {}: {}", packet_id, me, reason);
                if intent == Intent::Query {
                    // a query always ends with exactly one answer
                    match (reason, self.store.get(host)) {
                        (WalkEnd::DuplicateHilltop, Some(proxy)) => {
                            ctx.report(Observation::ProxyFound { host, proxy })
                        }
                        _ => ctx.report(Observation::ProxyNotFound { host }),
                    }
                } else {
                    ctx.report(Observation::WalkFinished {
                        packet: packet_id,
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
