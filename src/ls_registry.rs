// Type registries for the five extensible families
//
// Every header, payload, packet, node and event variant is reachable through a
// string tag. The scheduler and the delivery code only ever see the family
// traits, so a new protocol variant is added by registering its constructors
// here and nothing else changes.

use std::fmt;

use indexmap::IndexMap;
use log::debug;

use crate::ls_config::SimConfig;
use crate::ls_error::SimError;
use crate::ls_event::{Event, ReceiveEvent, SendEvent, Transmission};
use crate::ls_interface::{NodeId, PacketId, SimTime, RECEIVE_EVENT, SEND_EVENT};
use crate::ls_node::NodeHandler;
use crate::ls_packet::{Header, Packet, Payload};
use crate::ls_protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Header,
    Payload,
    Packet,
    Node,
    Event,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Header => "header",
            Family::Payload => "payload",
            Family::Packet => "packet",
            Family::Node => "node",
            Family::Event => "event",
        };
        write!(f, "{}", name)
    }
}

pub type HeaderCtor = fn() -> Box<dyn Header>;
pub type PayloadCtor = fn() -> Box<dyn Payload>;
pub type PacketCtor = fn(&Catalog, PacketId) -> Result<Packet, SimError>;
pub type NodeCtor = fn(NodeId, &SimConfig) -> Box<dyn NodeHandler>;
pub type EventCtor = fn(SimTime, Transmission) -> Box<dyn Event>;

/// Tag → constructor table for one family
///
/// Registration order is kept so `list_types` is stable across runs.
pub struct Registry<C> {
    family: Family,
    constructors: IndexMap<String, C>,
}

impl<C> Registry<C> {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            constructors: IndexMap::new(),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Register a constructor; the last registration for a tag wins
    ///
    /// Returns the constructor that was replaced, if any.
    pub fn register(&mut self, tag: impl Into<String>, ctor: C) -> Option<C> {
        let tag = tag.into();
        debug!("{} type registered: {}", self.family, tag);
        self.constructors.insert(tag, ctor)
    }

    pub fn get(&self, tag: &str) -> Result<&C, SimError> {
        self.constructors
            .get(tag)
            .ok_or_else(|| SimError::UnknownType {
                family: self.family,
                tag: tag.to_string(),
            })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn list_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// The five family registries bundled together
pub struct Catalog {
    pub headers: Registry<HeaderCtor>,
    pub payloads: Registry<PayloadCtor>,
    pub packets: Registry<PacketCtor>,
    pub nodes: Registry<NodeCtor>,
    pub events: Registry<EventCtor>,
}

impl Catalog {
    /// Empty catalog; nothing can be constructed until types are registered
    pub fn new() -> Self {
        Self {
            headers: Registry::new(Family::Header),
            payloads: Registry::new(Family::Payload),
            packets: Registry::new(Family::Packet),
            nodes: Registry::new(Family::Node),
            events: Registry::new(Family::Event),
        }
    }

    /// Catalog with the send/receive events and the LS3D protocol registered
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.events.register(SEND_EVENT, SendEvent::boxed as EventCtor);
        catalog
            .events
            .register(RECEIVE_EVENT, ReceiveEvent::boxed as EventCtor);
        ls_protocol::register(&mut catalog);
        catalog
    }

    pub fn create_header(&self, tag: &str) -> Result<Box<dyn Header>, SimError> {
        Ok((self.headers.get(tag)?)())
    }

    pub fn create_payload(&self, tag: &str) -> Result<Box<dyn Payload>, SimError> {
        Ok((self.payloads.get(tag)?)())
    }

    /// Build a packet of the given variant carrying `id`
    pub fn create_packet(&self, tag: &str, id: PacketId) -> Result<Packet, SimError> {
        (self.packets.get(tag)?)(self, id)
    }

    /// Compose a packet from default-constructed header and payload variants
    pub fn assemble(
        &self,
        tag: &'static str,
        id: PacketId,
        header: &str,
        payload: &str,
    ) -> Result<Packet, SimError> {
        Ok(Packet::compose(
            tag,
            id,
            self.create_header(header)?,
            self.create_payload(payload)?,
        ))
    }

    pub fn create_node_handler(
        &self,
        tag: &str,
        id: NodeId,
        config: &SimConfig,
    ) -> Result<Box<dyn NodeHandler>, SimError> {
        Ok((self.nodes.get(tag)?)(id, config))
    }

    pub fn create_event(
        &self,
        tag: &str,
        time: SimTime,
        transmission: Transmission,
    ) -> Result<Box<dyn Event>, SimError> {
        Ok((self.events.get(tag)?)(time, transmission))
    }

    /// Human readable listing of every registered tag, grouped by family
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let groups = [
            (self.headers.family(), self.headers.list_types()),
            (self.payloads.family(), self.payloads.list_types()),
            (self.packets.family(), self.packets.list_types()),
            (self.nodes.family(), self.nodes.list_types()),
            (self.events.family(), self.events.list_types()),
        ];
        for (family, tags) in groups {
            out.push_str(&format!("registered {} types:\n", family));
            for tag in tags {
                out.push_str(tag);
                out.push('\n');
            }
        }
        out
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
