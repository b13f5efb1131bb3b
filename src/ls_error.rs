use thiserror::Error;

use crate::ls_interface::{NodeId, SimTime};
use crate::ls_registry::Family;

/// Errors raised by the registry, the scheduler and the event handlers.
///
/// Only [`SimError::TimeOrderViolation`] stops a run; everything else is
/// logged and the offending operation or event is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Registry lookup for a tag that was never registered
    #[error("no such {family} type: {tag}")]
    UnknownType { family: Family, tag: String },

    /// Event addressed to a node that does not exist
    #[error("no node {node}")]
    DanglingReference { node: NodeId },

    /// Scheduler popped an event older than the current time
    #[error("cur_time = {now}, event trigger_time = {event}")]
    TimeOrderViolation { now: SimTime, event: SimTime },

    /// Arrival time past the end of the clock
    #[error("arrival time overflows: {now} + {delay}")]
    TimeOverflow { now: SimTime, delay: SimTime },

    /// Event triggered without a packet attached
    #[error("{tag} error: no pkt")]
    MissingPacket { tag: &'static str },

    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("node id {0} is reserved for broadcast")]
    ReservedNodeId(NodeId),

    /// A handler got a header or payload variant it cannot interpret
    #[error("expected {expected}, found {found}")]
    UnexpectedVariant {
        expected: &'static str,
        found: &'static str,
    },
}

impl SimError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::TimeOrderViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_time_order_is_fatal() {
        assert!(SimError::TimeOrderViolation { now: 20, event: 10 }.is_fatal());
        assert!(!SimError::DanglingReference { node: 3 }.is_fatal());
        assert!(!SimError::MissingPacket { tag: "recv_event" }.is_fatal());
        assert!(!SimError::TimeOverflow {
            now: 5,
            delay: SimTime::MAX
        }
        .is_fatal());
        assert!(!SimError::UnknownType {
            family: Family::Node,
            tag: "bogus".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = SimError::UnknownType {
            family: Family::Header,
            tag: "nope".into(),
        };
        assert_eq!(err.to_string(), "no such header type: nope");
        assert_eq!(
            SimError::DanglingReference { node: 4 }.to_string(),
            "no node 4"
        );
    }
}
