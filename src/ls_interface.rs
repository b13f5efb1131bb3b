use std::fmt;

use crate::ls_error::SimError;

// all node ids share one unsigned space; the top value is reserved
pub type NodeId = u32;
pub type PacketId = u64;
pub type SimTime = u64;
pub type Density = usize;

/// As `next` it means "every neighbor", anywhere else "unknown / any".
pub const BROADCAST: NodeId = NodeId::MAX;

/// Fixed cost of a single link transmission.
pub const ONE_HOP_DELAY: SimTime = 10;

// registered type tags of the built-in families
pub const LS3D_HEADER: &str = "LS3D_header";
pub const LS3D_PAYLOAD: &str = "LS3D_payload";
pub const LS3D_PACKET: &str = "LS3D_packet";
pub const LS3D_NODE: &str = "LS3D_node";
pub const SEND_EVENT: &str = "send_event";
pub const RECEIVE_EVENT: &str = "recv_event";

// ============================================================================
// Observation Logging System
// ============================================================================

/// Why a walk ended without a rendezvous answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// The path stack ran empty while backtracking
    Exhausted,
    /// A hilltop was met a second time on the way down
    DuplicateHilltop,
}

/// Everything the simulator reports while running
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Scheduler popped and triggered an event
    EventTriggered {
        tag: &'static str,
        sender: NodeId,
        receiver: NodeId,
        packet: Option<PacketId>,
        src: NodeId,
        dst: NodeId,
        prev: NodeId,
        next: NodeId,
    },
    /// A hilltop recorded a proxy mapping for a publishing host
    ProxyStored { host: NodeId, proxy: NodeId },
    /// A query reached a node holding the host's mapping
    ProxyFound { host: NodeId, proxy: NodeId },
    /// A query resolved without a mapping
    ProxyNotFound { host: NodeId },
    /// A publish walk terminated
    WalkFinished { packet: PacketId, reason: WalkEnd },
    /// A non-fatal error while triggering an event
    Failure { error: SimError },
}

impl Observation {
    /// The user-visible result line, if this observation has one
    pub fn output_line(&self) -> Option<String> {
        match self {
            Observation::ProxyFound { host, proxy } => {
                Some(format!("The proxy of node {} is {}", host, proxy))
            }
            Observation::ProxyNotFound { host } => {
                Some(format!("The proxy of node {} not found!", host))
            }
            _ => None,
        }
    }
}

impl fmt::Display for WalkEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkEnd::Exhausted => write!(f, "exhausted"),
            WalkEnd::DuplicateHilltop => write!(f, "duplicate-hilltop"),
        }
    }
}

/// Trait for consuming observations from the simulator
pub trait ObservationSink {
    fn observe(&mut self, time: SimTime, node: NodeId, observation: Observation);
}

/// No-op sink for runs nobody watches (zero overhead)
pub struct NoOpSink;

impl ObservationSink for NoOpSink {
    #[inline(always)]
    fn observe(&mut self, _time: SimTime, _node: NodeId, _observation: Observation) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_lines() {
        let found = Observation::ProxyFound { host: 0, proxy: 99 };
        assert_eq!(
            found.output_line().as_deref(),
            Some("The proxy of node 0 is 99")
        );

        let missing = Observation::ProxyNotFound { host: 7 };
        assert_eq!(
            missing.output_line().as_deref(),
            Some("The proxy of node 7 not found!")
        );

        let stored = Observation::ProxyStored { host: 0, proxy: 99 };
        assert_eq!(stored.output_line(), None);
    }
}
