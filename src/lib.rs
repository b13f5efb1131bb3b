//! # ls3d_rust - Density Landscape Rendezvous Simulator
//!
//! A discrete-event simulator for the LS3D rendezvous protocol. Every node's
//! density is the size of its 2-hop neighborhood; publish and query packets
//! walk the resulting landscape depth-first, climbing towards local density
//! maxima ("hilltops") where `host -> proxy` records are stored and looked up.
//!
//! ## Core Components
//!
//! - **Catalog / Registry**: string-tagged constructors for headers, payloads,
//!   packets, nodes and events, so new variants plug in without touching the core
//! - **Packet**: routing fields plus a variant header and payload
//! - **Scheduler**: time-ordered event queue with a deterministic tie-break
//! - **Simulation**: owns nodes, scheduler and packet ids; runs events in order
//! - **Ls3dNode**: the hilltop/valley walk state machine and proxy store
//!
//! ## Usage
//!
//! ```no_run
//! use ls3d_rust::{ConsoleSink, SimConfig, Simulation};
//!
//! let mut sim =
//!     Simulation::new(SimConfig::default()).with_sink(Box::new(ConsoleSink::new(false)));
//! sim.add_nodes(5).unwrap();
//! for i in 1..5 {
//!     sim.connect(i - 1, i).unwrap();
//! }
//! sim.seed_publish(0, 0, 99).unwrap();
//! sim.seed_query(100, 4, 0).unwrap();
//!
//! // prints "The proxy of node 0 is 99"
//! let summary = sim.run(1000).unwrap();
//! summary.print_summary();
//! ```
//!
//! Scenario files (YAML or the plain text format) are loaded with
//! [`Scenario`]; see `simulator/scenario_runner.rs`.

// Core model
pub mod ls_error;
pub mod ls_interface;
pub mod ls_packet;
pub mod ls_registry;
pub mod ls_walk;

// Simulation engine
pub mod ls_event;
pub mod ls_node;
pub mod ls_simulation;
pub mod ls_topology;

// Protocol
pub mod ls_protocol;

// Configuration, input and output
pub mod ls_config;
pub mod ls_scenario;
pub mod ls_sinks;

// Re-export commonly used types
pub use ls_config::{DuplicateHilltop, SimConfig};
pub use ls_error::SimError;
pub use ls_event::{Event, ReceiveEvent, Scheduler, SendEvent, Transmission};
pub use ls_interface::{
    NodeId, NoOpSink, Observation, ObservationSink, PacketId, SimTime, WalkEnd, BROADCAST,
    ONE_HOP_DELAY,
};
pub use ls_node::{HandlerContext, Node, NodeHandler};
pub use ls_packet::{Header, Packet, Payload, Routing};
pub use ls_protocol::{Intent, Ls3dHeader, Ls3dNode, Ls3dPayload};
pub use ls_registry::{Catalog, Family, Registry};
pub use ls_scenario::{Scenario, ScenarioError, TopologySpec};
pub use ls_simulation::{RunSummary, Simulation};
pub use ls_sinks::{ConsoleSink, CsvSink, MultiSink, RecordingSink};
