use std::any::Any;
use std::fmt;

use crate::ls_error::SimError;
use crate::ls_interface::{NodeId, PacketId, BROADCAST};

/// Routing envelope shared by every header variant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Routing {
    pub src: NodeId,
    pub dst: NodeId,
    pub prev: NodeId,
    pub next: NodeId,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            src: BROADCAST,
            dst: BROADCAST,
            prev: BROADCAST,
            next: BROADCAST,
        }
    }
}

pub trait Header: fmt::Debug {
    fn type_tag(&self) -> &'static str;

    fn routing(&self) -> &Routing;

    fn routing_mut(&mut self) -> &mut Routing;

    fn clone_box(&self) -> Box<dyn Header>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub trait Payload: fmt::Debug {
    fn type_tag(&self) -> &'static str;

    fn clone_box(&self) -> Box<dyn Payload>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A header plus a payload, identified by a packet id
///
/// Replicas keep the id: they stand for the same logical transmission
/// re-sent on another hop or to another neighbor.
#[derive(Debug)]
pub struct Packet {
    id: PacketId,
    tag: &'static str,
    header: Box<dyn Header>,
    payload: Box<dyn Payload>,
}

impl Packet {
    pub fn compose(
        tag: &'static str,
        id: PacketId,
        header: Box<dyn Header>,
        payload: Box<dyn Payload>,
    ) -> Self {
        Self {
            id,
            tag,
            header,
            payload,
        }
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn type_tag(&self) -> &'static str {
        self.tag
    }

    pub fn header(&self) -> &dyn Header {
        self.header.as_ref()
    }

    pub fn header_mut(&mut self) -> &mut dyn Header {
        self.header.as_mut()
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> &mut dyn Payload {
        self.payload.as_mut()
    }

    pub fn routing(&self) -> &Routing {
        self.header.routing()
    }

    pub fn routing_mut(&mut self) -> &mut Routing {
        self.header.routing_mut()
    }

    /// Deep copy of header and payload, same packet id
    pub fn replicate(&self) -> Packet {
        Self {
            id: self.id,
            tag: self.tag,
            header: self.header.clone_box(),
            payload: self.payload.clone_box(),
        }
    }

    /// Release a packet slot; a second call on the same slot does nothing
    pub fn discard(slot: &mut Option<Packet>) {
        slot.take();
    }

    pub fn header_as<H: Header + 'static>(&self) -> Option<&H> {
        self.header.as_any().downcast_ref::<H>()
    }

    pub fn payload_as<P: Payload + 'static>(&self) -> Option<&P> {
        self.payload.as_any().downcast_ref::<P>()
    }

    /// Concrete header and payload, both mutable, or the variant mismatch
    pub fn parts_mut<H, P>(&mut self) -> Result<(&mut H, &mut P), SimError>
    where
        H: Header + 'static,
        P: Payload + 'static,
    {
        let found_header = self.header.type_tag();
        let found_payload = self.payload.type_tag();

        let header = self
            .header
            .as_any_mut()
            .downcast_mut::<H>()
            .ok_or(SimError::UnexpectedVariant {
                expected: std::any::type_name::<H>(),
                found: found_header,
            })?;
        let payload = self
            .payload
            .as_any_mut()
            .downcast_mut::<P>()
            .ok_or(SimError::UnexpectedVariant {
                expected: std::any::type_name::<P>(),
                found: found_payload,
            })?;
        Ok((header, payload))
    }
}

impl Clone for Packet {
    fn clone(&self) -> Self {
        self.replicate()
    }
}

/// Monotonic packet id source owned by the simulation context
#[derive(Debug, Default)]
pub struct PacketIds {
    next: PacketId,
}

impl PacketIds {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn allocate(&mut self) -> PacketId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> PacketId {
        self.next
    }
}
