// Simulation configuration
//
// Everything here can be overridden from a scenario file; missing keys fall
// back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::ls_interface::{SimTime, LS3D_NODE, LS3D_PACKET, ONE_HOP_DELAY};

/// What a walk does when it meets a hilltop a second time going down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHilltop {
    /// Clear the hilltop flag and end the walk
    #[default]
    Stop,
    /// Clear the flag and handle the node as a first hilltop visit
    Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated time per link transmission (default: 10)
    pub hop_delay: SimTime,

    /// Registered node type created for every node (default: LS3D_node)
    pub node_type: String,

    /// Registered packet type used for seeded requests (default: LS3D_packet)
    pub packet_type: String,

    /// Second-hilltop-going-down behaviour (default: stop)
    pub duplicate_hilltop: DuplicateHilltop,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hop_delay: ONE_HOP_DELAY,
            node_type: LS3D_NODE.to_string(),
            packet_type: LS3D_PACKET.to_string(),
            duplicate_hilltop: DuplicateHilltop::Stop,
        }
    }
}
