// id.rs — Stable arena identifiers for the lowered IR
//
// Expressions and port connectors live in tables owned by `LinearIr`. Every
// cross-reference (connector → producer, connector → consumers, ExpressionPort)
// is one of these ids instead of a pointer, so no reference can outlive the
// entity it names without the container noticing.

use serde::Serialize;

/// Stable identifier for an expression slot in a `LinearIr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub u32);

/// Stable identifier for a port connector in a `LinearIr`'s connector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectorId(pub u32);

/// Identifier of a scheduled loop, assigned by the loop-construction pass.
pub type LoopId = usize;

/// Allocator for arena ids. Produces monotonically increasing ids in
/// allocation order; ids are never reused, so a stale id fails lookup
/// instead of aliasing a newer entity.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_expr: u32,
    next_connector: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self) -> ExprId {
        let id = ExprId(self.next_expr);
        self.next_expr += 1;
        id
    }

    pub fn alloc_connector(&mut self) -> ConnectorId {
        let id = ConnectorId(self.next_connector);
        self.next_connector += 1;
        id
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_kind() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_expr(), ExprId(0));
        assert_eq!(alloc.alloc_connector(), ConnectorId(0));
        assert_eq!(alloc.alloc_expr(), ExprId(1));
        assert_eq!(alloc.alloc_connector(), ConnectorId(1));
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(ExprId(3).to_string(), "e3");
        assert_eq!(ConnectorId(7).to_string(), "c7");
    }
}
