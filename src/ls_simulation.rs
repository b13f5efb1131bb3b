// Simulation context
//
// Owns every node, the scheduler, the packet id source and the observation
// sink. Events get `&mut Simulation` when they fire, which is the only way
// node state is ever touched during a run.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, trace, warn};

use crate::ls_config::SimConfig;
use crate::ls_error::SimError;
use crate::ls_event::{Scheduler, Transmission};
use crate::ls_interface::{
    NodeId, NoOpSink, Observation, ObservationSink, PacketId, SimTime, BROADCAST, RECEIVE_EVENT,
    SEND_EVENT,
};
use crate::ls_node::Node;
use crate::ls_packet::{Packet, PacketIds};
use crate::ls_protocol::{prepare_request, Intent};
use crate::ls_registry::Catalog;
use crate::ls_topology::Topology;

/// Counters for a run, in the spirit of a post-run report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Simulated time when the run stopped
    pub final_time: SimTime,
    pub events_triggered: usize,
    pub sends: usize,
    pub receives: usize,
    /// Non-fatal errors reported while triggering events
    pub errors: usize,
    pub proxies_stored: usize,
    pub proxies_found: usize,
    pub proxies_not_found: usize,
    pub walks_finished: usize,
    /// Events still queued past the end time
    pub pending_events: usize,
    pub packets_created: PacketId,
}

impl RunSummary {
    pub fn print_summary(&self) {
        println!("Simulation summary:");
        println!("  Final time:        {}", self.final_time);
        println!(
            "  Events triggered:  {} (send: {}, recv: {})",
            self.events_triggered, self.sends, self.receives
        );
        println!("  Packets created:   {}", self.packets_created);
        println!("  Proxies stored:    {}", self.proxies_stored);
        println!(
            "  Queries answered:  {} found, {} not found",
            self.proxies_found, self.proxies_not_found
        );
        println!("  Walks finished:    {}", self.walks_finished);
        println!("  Errors:            {}", self.errors);
        println!("  Pending events:    {}", self.pending_events);
    }
}

pub struct Simulation {
    config: SimConfig,
    catalog: Catalog,
    nodes: BTreeMap<NodeId, Node>,
    scheduler: Scheduler,
    packet_ids: PacketIds,
    sink: Box<dyn ObservationSink>,
    topology_fixed: bool,
    summary: RunSummary,
}

impl Simulation {
    /// Create a simulation with the built-in types registered
    pub fn new(config: SimConfig) -> Self {
        Self::with_catalog(config, Catalog::with_defaults())
    }

    pub fn with_catalog(config: SimConfig, catalog: Catalog) -> Self {
        Self {
            config,
            catalog,
            nodes: BTreeMap::new(),
            scheduler: Scheduler::new(),
            packet_ids: PacketIds::new(),
            sink: Box::new(NoOpSink),
            topology_fixed: false,
            summary: RunSummary::default(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ObservationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn ObservationSink>) {
        self.sink = sink;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    // ========================================================================
    // Nodes & links
    // ========================================================================

    /// Add a node of the configured node type
    pub fn add_node(&mut self, id: NodeId) -> Result<(), SimError> {
        let tag = self.config.node_type.clone();
        self.add_node_of(&tag, id)
    }

    pub fn add_node_of(&mut self, tag: &str, id: NodeId) -> Result<(), SimError> {
        if id == BROADCAST {
            return Err(SimError::ReservedNodeId(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(SimError::DuplicateNode(id));
        }
        let handler = self.catalog.create_node_handler(tag, id, &self.config)?;
        self.nodes.insert(id, Node::new(id, handler));
        self.topology_fixed = false;
        Ok(())
    }

    /// Add nodes `0..count` of the configured node type
    pub fn add_nodes(&mut self, count: NodeId) -> Result<(), SimError> {
        for id in 0..count {
            self.add_node(id)?;
        }
        Ok(())
    }

    /// Remove a node; links pointing at it from other nodes stay in place
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let removed = self.nodes.remove(&id);
        if removed.is_some() {
            self.topology_fixed = false;
        }
        removed
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Directed link `from -> to`
    ///
    /// `Ok(false)` when `to` does not exist, is `from` itself, or is already
    /// a neighbor.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> Result<bool, SimError> {
        if !self.nodes.contains_key(&to) {
            return Ok(false);
        }
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(SimError::DanglingReference { node: from })?;
        let added = node.add_neighbor(to);
        if added {
            self.topology_fixed = false;
        }
        Ok(added)
    }

    /// Undirected link, i.e. both directed links
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<bool, SimError> {
        let forward = self.link(a, b)?;
        let backward = self.link(b, a)?;
        Ok(forward || backward)
    }

    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        if let Some(node) = self.nodes.get_mut(&a) {
            node.remove_neighbor(b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.remove_neighbor(a);
        }
        self.topology_fixed = false;
    }

    /// Adjacency snapshot of the current links
    pub fn topology(&self) -> Topology {
        let adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = self
            .nodes
            .iter()
            .map(|(id, node)| (*id, node.neighbors().clone()))
            .collect();
        Topology::from_adjacency(adjacency)
    }

    /// Let every node learn its 2-hop neighborhood. Runs automatically before
    /// the first run and after any topology change.
    pub fn fix_topology(&mut self) {
        let topology = self.topology();
        for node in self.nodes.values_mut() {
            node.prepare(&topology);
        }
        self.topology_fixed = true;
        debug!("topology fixed: {} nodes", topology.len());
    }

    // ========================================================================
    // Packets & events
    // ========================================================================

    /// A fresh packet of the given variant with a new id
    pub fn new_packet(&mut self, tag: &str) -> Result<Packet, SimError> {
        let ctor = self.catalog.packets.get(tag)?;
        ctor(&self.catalog, self.packet_ids.allocate())
    }

    /// A fresh packet built from explicit header and payload variants
    pub fn assemble_packet(
        &mut self,
        tag: &'static str,
        header: &str,
        payload: &str,
    ) -> Result<Packet, SimError> {
        self.catalog.headers.get(header)?;
        self.catalog.payloads.get(payload)?;
        self.catalog
            .assemble(tag, self.packet_ids.allocate(), header, payload)
    }

    /// Queue an event of the given registered type
    pub fn schedule(
        &mut self,
        tag: &str,
        time: SimTime,
        transmission: Transmission,
    ) -> Result<(), SimError> {
        let event = self.catalog.create_event(tag, time, transmission)?;
        self.scheduler.add(event);
        Ok(())
    }

    /// Seed a publish request: `source` announces `proxy` as its proxy
    pub fn seed_publish(
        &mut self,
        time: SimTime,
        source: NodeId,
        proxy: NodeId,
    ) -> Result<PacketId, SimError> {
        self.seed_request(Intent::Publish, time, source, BROADCAST, proxy)
    }

    /// Seed a subscribe request: `source` asks for the proxy of `host`
    pub fn seed_query(
        &mut self,
        time: SimTime,
        source: NodeId,
        host: NodeId,
    ) -> Result<PacketId, SimError> {
        self.seed_request(Intent::Query, time, source, host, 0)
    }

    fn seed_request(
        &mut self,
        intent: Intent,
        time: SimTime,
        source: NodeId,
        host: NodeId,
        proxy: NodeId,
    ) -> Result<PacketId, SimError> {
        if !self.nodes.contains_key(&source) {
            return Err(SimError::DanglingReference { node: source });
        }
        if host != BROADCAST && !self.nodes.contains_key(&host) {
            return Err(SimError::DanglingReference { node: host });
        }
        let packet_type = self.config.packet_type.clone();
        let mut packet = self.new_packet(&packet_type)?;
        prepare_request(&mut packet, intent, source, host, proxy)?;
        let id = packet.id();
        self.schedule(RECEIVE_EVENT, time, Transmission::new(source, source, packet))?;
        debug!("seeded {:?} packet {} at node {} (t={})", intent, id, source, time);
        Ok(id)
    }

    // ========================================================================
    // Delivery (called by events)
    // ========================================================================

    /// Fan a packet out to the sender's neighbors matching its `next` field,
    /// one independent replica per neighbor, one hop delay later. The event
    /// discards the original afterwards.
    pub fn deliver_send(&mut self, sender: NodeId, packet: &Packet) -> Result<(), SimError> {
        let node = self
            .nodes
            .get(&sender)
            .ok_or(SimError::DanglingReference { node: sender })?;
        let receivers = node.fan_out(packet.routing().next);
        let now = self.now();
        let arrival = now
            .checked_add(self.config.hop_delay)
            .ok_or(SimError::TimeOverflow {
                now,
                delay: self.config.hop_delay,
            })?;

        for receiver in receivers {
            trace!("node {} sends packet {} to {}", sender, packet.id(), receiver);
            self.schedule(
                RECEIVE_EVENT,
                arrival,
                Transmission::new(sender, receiver, packet.replicate()),
            )?;
        }
        Ok(())
    }

    /// Run the receiver's handler on the packet; the event discards the
    /// packet afterwards whatever the handler did
    pub fn deliver_receive(
        &mut self,
        sender: NodeId,
        receiver: NodeId,
        packet: &mut Packet,
    ) -> Result<(), SimError> {
        let now = self.now();
        let node = self
            .nodes
            .get_mut(&receiver)
            .ok_or(SimError::DanglingReference { node: receiver })?;

        trace!("node {} receives packet {} from {}", receiver, packet.id(), sender);
        let mut outbox = Vec::new();
        let mut observations = Vec::new();
        let handled = node.receive(now, packet, &mut outbox, &mut observations);

        for observation in observations {
            self.record(now, receiver, observation);
        }
        for outgoing in outbox {
            let routing = *outgoing.routing();
            self.schedule(
                SEND_EVENT,
                now,
                Transmission::new(routing.prev, routing.next, outgoing),
            )?;
        }
        handled
    }

    fn record(&mut self, time: SimTime, node: NodeId, observation: Observation) {
        match &observation {
            Observation::ProxyStored { .. } => self.summary.proxies_stored += 1,
            Observation::ProxyFound { .. } => self.summary.proxies_found += 1,
            Observation::ProxyNotFound { .. } => self.summary.proxies_not_found += 1,
            Observation::WalkFinished { .. } => self.summary.walks_finished += 1,
            Observation::Failure { .. } => self.summary.errors += 1,
            Observation::EventTriggered { .. } => {}
        }
        self.sink.observe(time, node, observation);
    }

    // ========================================================================
    // Run
    // ========================================================================

    /// Trigger events in order until the queue is empty or the next event is
    /// later than `end_time`
    ///
    /// Only a time-order violation aborts the run; other errors are logged,
    /// reported to the sink and counted.
    pub fn run(&mut self, end_time: SimTime) -> Result<RunSummary, SimError> {
        if !self.topology_fixed {
            self.fix_topology();
        }
        info!(
            "simulation start: {} nodes, {} events queued, t={} until {}",
            self.nodes.len(),
            self.scheduler.len(),
            self.now(),
            end_time
        );

        loop {
            let event = match self.scheduler.pop_due(end_time) {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    error!("{}", err);
                    return Err(err);
                }
            };

            let now = self.now();
            let actor = event.actor();
            let tag = event.type_tag();
            self.summary.events_triggered += 1;
            match tag {
                SEND_EVENT => self.summary.sends += 1,
                RECEIVE_EVENT => self.summary.receives += 1,
                _ => {}
            }
            let trace = event.trace();
            debug!("time {:>11} {} {:?}", now, tag, trace);
            self.sink.observe(now, actor, trace);

            if let Err(err) = event.trigger(self) {
                if err.is_fatal() {
                    error!("{}", err);
                    return Err(err);
                }
                warn!("{} error: {}", tag, err);
                self.record(now, actor, Observation::Failure { error: err });
            }
        }

        let summary = self.summary();
        info!(
            "simulation stop: t={} events={} errors={} pending={}",
            summary.final_time, summary.events_triggered, summary.errors, summary.pending_events
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            final_time: self.now(),
            pending_events: self.scheduler.len(),
            packets_created: self.packet_ids.issued(),
            ..self.summary.clone()
        }
    }

    /// End of the simulation: pending events and their packets are dropped
    pub fn teardown(mut self) -> RunSummary {
        let summary = self.summary();
        let dropped = self.scheduler.flush();
        if !dropped.is_empty() {
            debug!("teardown drops {} pending events", dropped.len());
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::ls_config::DuplicateHilltop;
    use crate::ls_interface::{WalkEnd, LS3D_HEADER, LS3D_PACKET, LS3D_PAYLOAD};
    use crate::ls_node::{HandlerContext, NodeHandler};
    use crate::ls_protocol::Ls3dNode;
    use crate::ls_registry::NodeCtor;
    use crate::ls_sinks::RecordingSink;

    fn line(n: NodeId) -> (Simulation, RecordingSink) {
        let sink = RecordingSink::new();
        let mut sim = Simulation::new(SimConfig::default()).with_sink(Box::new(sink.clone()));
        sim.add_nodes(n).unwrap();
        for i in 1..n {
            sim.connect(i - 1, i).unwrap();
        }
        (sim, sink)
    }

    fn grid(width: NodeId, height: NodeId) -> (Simulation, RecordingSink) {
        let sink = RecordingSink::new();
        let mut sim = Simulation::new(SimConfig::default()).with_sink(Box::new(sink.clone()));
        sim.add_nodes(width * height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let id = y * width + x;
                if x + 1 < width {
                    sim.connect(id, id + 1).unwrap();
                }
                if y + 1 < height {
                    sim.connect(id, id + width).unwrap();
                }
            }
        }
        (sim, sink)
    }

    fn store_of(sim: &Simulation, node: NodeId, host: NodeId) -> Option<NodeId> {
        sim.node(node)
            .and_then(|n| n.handler_as::<Ls3dNode>())
            .and_then(|h| h.get_node_proxy(host))
    }

    #[test]
    fn test_publish_then_query_on_line() {
        let (mut sim, sink) = line(5);
        sim.seed_publish(0, 0, 99).unwrap();
        sim.seed_query(100, 4, 0).unwrap();

        let summary = sim.run(1000).unwrap();

        assert_eq!(store_of(&sim, 2, 0), Some(99));
        for other in [0, 1, 3, 4] {
            assert_eq!(store_of(&sim, other, 0), None);
        }
        assert_eq!(sink.output_lines(), vec!["The proxy of node 0 is 99".to_string()]);
        assert_eq!(summary.proxies_found, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.pending_events, 0);
        assert_eq!(summary.packets_created, 2);

        // answered by the hilltop two hops away
        let found: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| matches!(r.observation, Observation::ProxyFound { .. }))
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, 2);
        assert_eq!(found[0].time, 120);
    }

    #[test]
    fn test_densities_after_fix() {
        let (mut sim, _) = line(5);
        sim.fix_topology();
        let densities: Vec<_> = (0..5)
            .map(|id| sim.node(id).unwrap().handler_as::<Ls3dNode>().unwrap().density())
            .collect();
        assert_eq!(densities, vec![2, 3, 4, 3, 2]);
    }

    #[test]
    fn test_query_without_publish_reports_not_found() {
        let (mut sim, sink) = line(5);
        sim.seed_query(0, 4, 0).unwrap();

        let summary = sim.run(10_000).unwrap();

        assert_eq!(sink.output_lines(), vec!["The proxy of node 0 not found!".to_string()]);
        assert_eq!(summary.proxies_not_found, 1);
        assert_eq!(summary.pending_events, 0);
        // one receive per DFS step, bounded by the number of nodes
        assert!(summary.receives <= 2 * 5 + 1);
    }

    #[test]
    fn test_query_not_found_with_resume_policy() {
        let config = SimConfig {
            duplicate_hilltop: DuplicateHilltop::Resume,
            ..SimConfig::default()
        };
        let sink = RecordingSink::new();
        let mut sim = Simulation::new(config).with_sink(Box::new(sink.clone()));
        sim.add_nodes(5).unwrap();
        for i in 1..5 {
            sim.connect(i - 1, i).unwrap();
        }
        sim.seed_query(0, 4, 0).unwrap();
        sim.run(10_000).unwrap();

        assert_eq!(sink.output_lines(), vec!["The proxy of node 0 not found!".to_string()]);
    }

    #[test]
    fn test_publish_walk_finishes() {
        let (mut sim, sink) = line(5);
        sim.seed_publish(0, 0, 99).unwrap();
        let summary = sim.run(1000).unwrap();

        assert_eq!(summary.proxies_stored, 1);
        assert_eq!(summary.walks_finished, 1);
        assert!(sink.records().iter().any(|r| r.observation
            == Observation::WalkFinished {
                packet: 0,
                reason: WalkEnd::DuplicateHilltop
            }));
        // nothing user visible for a publish
        assert!(sink.output_lines().is_empty());
    }

    #[test]
    fn test_grid_publish_and_queries() {
        let (mut sim, sink) = grid(4, 4);
        sim.seed_publish(0, 0, 77).unwrap();
        sim.seed_publish(0, 15, 88).unwrap();
        for source in [3, 12, 6] {
            sim.seed_query(1000, source, 0).unwrap();
            sim.seed_query(1000, source, 15).unwrap();
        }
        let summary = sim.run(100_000).unwrap();

        assert_eq!(summary.errors, 0);
        assert_eq!(summary.pending_events, 0);
        let lines = sink.output_lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines.iter().filter(|l| *l == "The proxy of node 0 is 77").count(),
            3
        );
        assert_eq!(
            lines.iter().filter(|l| *l == "The proxy of node 15 is 88").count(),
            3
        );
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run_once = || {
            let (mut sim, sink) = grid(3, 3);
            // same-time requests exercise the tie-break
            sim.seed_publish(0, 0, 5).unwrap();
            sim.seed_publish(0, 8, 6).unwrap();
            sim.seed_query(0, 4, 0).unwrap();
            sim.seed_query(0, 2, 8).unwrap();
            sim.run(10_000).unwrap();
            (sink.trace(), sink.output_lines())
        };

        let (trace_a, out_a) = run_once();
        let (trace_b, out_b) = run_once();
        assert!(!trace_a.is_empty());
        assert_eq!(trace_a, trace_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_trigger_times_never_go_backwards() {
        let (mut sim, sink) = grid(3, 3);
        sim.seed_publish(30, 0, 5).unwrap();
        sim.seed_query(0, 8, 0).unwrap();
        sim.seed_query(200, 8, 0).unwrap();
        sim.run(10_000).unwrap();

        let times: Vec<_> = sink.trace().into_iter().map(|t| t.0).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_end_time_bounds_the_run() {
        let (mut sim, _) = line(5);
        sim.seed_publish(0, 0, 99).unwrap();

        let partial = sim.run(15).unwrap();
        assert_eq!(partial.final_time, 10);
        // receive at node 2 (t=20) waits
        assert_eq!(partial.pending_events, 1);
        assert_eq!(store_of(&sim, 2, 0), None);

        let rest = sim.run(1000).unwrap();
        assert_eq!(rest.pending_events, 0);
        assert_eq!(store_of(&sim, 2, 0), Some(99));

        let summary = sim.teardown();
        assert_eq!(summary.proxies_stored, 1);
    }

    #[test]
    fn test_teardown_drops_pending() {
        let (mut sim, _) = line(3);
        sim.seed_publish(500, 0, 1).unwrap();
        sim.run(100).unwrap();
        assert_eq!(sim.pending_events(), 1);
        let summary = sim.teardown();
        assert_eq!(summary.pending_events, 1);
        assert_eq!(summary.events_triggered, 0);
    }

    #[test]
    fn test_dangling_reference_is_not_fatal() {
        let (mut sim, sink) = line(5);
        sim.remove_node(3);
        sim.seed_publish(0, 0, 99).unwrap();

        let summary = sim.run(1000).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(store_of(&sim, 2, 0), Some(99));
        assert!(sink.records().iter().any(|r| r.observation
            == Observation::Failure {
                error: SimError::DanglingReference { node: 3 }
            }));
    }

    #[test]
    fn test_missing_packet_is_reported() {
        let (mut sim, sink) = line(2);
        sim.schedule(
            RECEIVE_EVENT,
            5,
            Transmission {
                sender: 0,
                receiver: 1,
                packet: None,
            },
        )
        .unwrap();
        let summary = sim.run(100).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(
            sink.records().last().map(|r| r.observation.clone()),
            Some(Observation::Failure {
                error: SimError::MissingPacket { tag: RECEIVE_EVENT }
            })
        );
    }

    #[test]
    fn test_send_from_removed_node_is_not_fatal() {
        let (mut sim, sink) = line(4);
        sim.remove_node(0);
        let orphan = sim.new_packet(LS3D_PACKET).unwrap();
        sim.schedule(SEND_EVENT, 0, Transmission::new(0, BROADCAST, orphan))
            .unwrap();
        let mut packet = sim.new_packet(LS3D_PACKET).unwrap();
        packet.routing_mut().next = BROADCAST;
        sim.schedule(SEND_EVENT, 5, Transmission::new(2, BROADCAST, packet))
            .unwrap();

        let summary = sim.run(10).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.sends, 2);
        // node 2 still fanned out to 1 and 3, arriving at t=15
        assert_eq!(summary.pending_events, 2);
        assert!(sink.records().iter().any(|r| r.time == 0
            && r.observation
                == Observation::Failure {
                    error: SimError::DanglingReference { node: 0 }
                }));
    }

    #[test]
    fn test_send_without_packet_is_reported() {
        let (mut sim, sink) = line(2);
        sim.schedule(
            SEND_EVENT,
            5,
            Transmission {
                sender: 0,
                receiver: BROADCAST,
                packet: None,
            },
        )
        .unwrap();
        let mut packet = sim.new_packet(LS3D_PACKET).unwrap();
        packet.routing_mut().next = BROADCAST;
        sim.schedule(SEND_EVENT, 7, Transmission::new(0, BROADCAST, packet))
            .unwrap();

        let summary = sim.run(10).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.sends, 2);
        assert_eq!(summary.pending_events, 1);
        assert!(sink.records().iter().any(|r| r.observation
            == Observation::Failure {
                error: SimError::MissingPacket { tag: SEND_EVENT }
            }));
    }

    #[test]
    fn test_hop_delay_overflow_drops_the_hop() {
        let config = SimConfig {
            hop_delay: SimTime::MAX,
            ..SimConfig::default()
        };
        let sink = RecordingSink::new();
        let mut sim = Simulation::new(config).with_sink(Box::new(sink.clone()));
        sim.add_nodes(3).unwrap();
        sim.connect(0, 1).unwrap();
        sim.connect(1, 2).unwrap();
        sim.seed_publish(5, 0, 99).unwrap();

        let summary = sim.run(SimTime::MAX).unwrap();

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.pending_events, 0);
        assert!(sink.records().iter().any(|r| r.observation
            == Observation::Failure {
                error: SimError::TimeOverflow {
                    now: 5,
                    delay: SimTime::MAX
                }
            }));
    }

    #[test]
    fn test_time_order_violation_is_fatal() {
        let (mut sim, _) = line(1);
        sim.seed_publish(50, 0, 1).unwrap();
        sim.run(100).unwrap();
        assert_eq!(sim.now(), 50);

        sim.seed_query(10, 0, 0).unwrap();
        assert_eq!(
            sim.run(100),
            Err(SimError::TimeOrderViolation { now: 50, event: 10 })
        );
    }

    #[test]
    fn test_node_creation_rules() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.add_node(1).unwrap();
        assert_eq!(sim.add_node(1), Err(SimError::DuplicateNode(1)));
        assert_eq!(sim.add_node(BROADCAST), Err(SimError::ReservedNodeId(BROADCAST)));
        assert!(matches!(
            sim.add_node_of("bogus", 2),
            Err(SimError::UnknownType { .. })
        ));
        assert_eq!(sim.node_ids(), vec![1]);
    }

    #[test]
    fn test_link_rules() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.add_nodes(2).unwrap();
        assert_eq!(sim.link(0, 1), Ok(true));
        assert_eq!(sim.link(0, 1), Ok(false));
        assert_eq!(sim.link(0, 0), Ok(false));
        assert_eq!(sim.link(0, 7), Ok(false));
        assert_eq!(sim.link(7, 0), Err(SimError::DanglingReference { node: 7 }));

        sim.disconnect(0, 1);
        assert!(sim.node(0).unwrap().neighbors().is_empty());
    }

    #[test]
    fn test_seed_validation() {
        let (mut sim, _) = line(3);
        assert_eq!(
            sim.seed_publish(0, 9, 1),
            Err(SimError::DanglingReference { node: 9 })
        );
        assert_eq!(
            sim.seed_query(0, 0, 9),
            Err(SimError::DanglingReference { node: 9 })
        );
        assert!(sim.new_packet("bogus").is_err());
        // failed lookups do not burn packet ids
        assert_eq!(sim.new_packet(LS3D_PACKET).unwrap().id(), 0);
    }

    #[test]
    fn test_assembled_packets_get_fresh_ids() {
        let mut sim = Simulation::new(SimConfig::default());
        let first = sim
            .assemble_packet(LS3D_PACKET, LS3D_HEADER, LS3D_PAYLOAD)
            .unwrap();
        let second = sim.new_packet(LS3D_PACKET).unwrap();
        assert_eq!(first.id(), 0);
        assert_eq!(second.id(), 1);
        assert_eq!(first.replicate().id(), 0);

        assert!(matches!(
            sim.assemble_packet(LS3D_PACKET, "bogus", LS3D_PAYLOAD),
            Err(SimError::UnknownType { .. })
        ));
        assert_eq!(sim.summary().packets_created, 2);
    }

    #[test]
    fn test_broadcast_reaches_every_neighbor() {
        let (mut sim, sink) = grid(3, 3);
        let mut packet = sim.new_packet(LS3D_PACKET).unwrap();
        packet.routing_mut().prev = 4;
        packet.routing_mut().next = BROADCAST;
        let id = packet.id();
        sim.schedule(SEND_EVENT, 0, Transmission::new(4, BROADCAST, packet))
            .unwrap();
        sim.run(10).unwrap();

        let mut reached: Vec<_> = sink
            .trace()
            .into_iter()
            .filter(|t| t.1 == RECEIVE_EVENT && t.2 == 4 && t.4 == Some(id))
            .map(|t| t.3)
            .collect();
        reached.sort();
        assert_eq!(reached, vec![1, 3, 5, 7]);
    }

    /// Counts packets; shows a variant plugged in through the registry only
    #[derive(Default)]
    struct CountingNode {
        received: usize,
    }

    impl NodeHandler for CountingNode {
        fn type_tag(&self) -> &'static str {
            "counting_node"
        }

        fn on_receive(
            &mut self,
            _ctx: &mut HandlerContext<'_>,
            _packet: &mut Packet,
        ) -> Result<(), SimError> {
            self.received += 1;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn counting_node(_id: NodeId, _config: &SimConfig) -> Box<dyn NodeHandler> {
        Box::new(CountingNode::default())
    }

    #[test]
    fn test_custom_node_variant() {
        let mut catalog = Catalog::with_defaults();
        catalog.nodes.register("counting_node", counting_node as NodeCtor);
        let config = SimConfig {
            node_type: "counting_node".into(),
            ..SimConfig::default()
        };
        let mut sim = Simulation::with_catalog(config, catalog);
        sim.add_nodes(2).unwrap();
        sim.connect(0, 1).unwrap();
        sim.seed_query(0, 0, 1).unwrap();
        sim.seed_query(5, 1, 0).unwrap();
        sim.run(100).unwrap();

        for id in [0, 1] {
            let node = sim.node(id).unwrap().handler_as::<CountingNode>().unwrap();
            assert_eq!(node.received, 1);
        }
    }
}
