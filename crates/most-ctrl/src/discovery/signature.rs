//! The node signature observed in a `Hello.Status` report.

use crate::types::{NodeAddress, PositionAddress, C_POS_ADDR_LOCAL_INIC};

/// A node's identity as reported by the INIC in response to `Hello.Get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub node_address: NodeAddress,
    pub node_position_address: PositionAddress,
    pub group_address: u16,
    pub hardware_id_high: u32,
    pub hardware_id_low: u32,
}

impl Signature {
    /// `true` if this signature describes the local INIC rather than a remote node.
    pub fn is_local_inic(&self) -> bool {
        self.node_position_address.0 == C_POS_ADDR_LOCAL_INIC
    }
}
