// id.rs: Stable identifiers for program-model entities
//
// These IDs give every reactor, port, reaction, connection and mode a
// deterministic identity that does not depend on memory layout or hash
// iteration order. They are allocated in declaration order by the
// elaboration pass (or `model::ProgramBuilder`) and flow unchanged through
// graph building, priority assignment and boundary classification.

use serde::{Deserialize, Serialize};

/// Stable identifier for a reactor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactorId(pub u32);

/// Stable identifier for a port instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// Stable identifier for a reaction instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionId(pub u32);

/// Stable identifier for a connection declared in some reactor body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

/// Stable identifier for a mode of a modal reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModeId(pub u32);

/// Identifier of an execution unit (federate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FederateId(pub u32);

impl FederateId {
    /// The unit every reactor belongs to when no partition says otherwise.
    pub const DEFAULT: FederateId = FederateId(0);
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (declaration) order, ensuring deterministic assignment.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_reactor: u32,
    next_port: u32,
    next_reaction: u32,
    next_connection: u32,
    next_mode: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_reactor(&mut self) -> ReactorId {
        let id = ReactorId(self.next_reactor);
        self.next_reactor += 1;
        id
    }

    pub fn alloc_port(&mut self) -> PortId {
        let id = PortId(self.next_port);
        self.next_port += 1;
        id
    }

    pub fn alloc_reaction(&mut self) -> ReactionId {
        let id = ReactionId(self.next_reaction);
        self.next_reaction += 1;
        id
    }

    pub fn alloc_connection(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        id
    }

    pub fn alloc_mode(&mut self) -> ModeId {
        let id = ModeId(self.next_mode);
        self.next_mode += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_allocated_in_order_per_kind() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_port(), PortId(0));
        assert_eq!(alloc.alloc_reaction(), ReactionId(0));
        assert_eq!(alloc.alloc_port(), PortId(1));
        assert_eq!(alloc.alloc_reactor(), ReactorId(0));
        assert_eq!(alloc.alloc_reaction(), ReactionId(1));
        assert_eq!(alloc.alloc_connection(), ConnectionId(0));
        assert_eq!(alloc.alloc_mode(), ModeId(0));
    }
}
