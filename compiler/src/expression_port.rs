// expression_port.rs — Addressable (expression, direction, index) port handles
//
// An ExpressionPort is a value: it never owns anything and is always
// re-derivable from the container. Navigation goes through `LinearIr`, so a
// port whose expression was removed fails lookup instead of dangling.

use std::fmt;

use serde::Serialize;

use crate::connector::PortConnector;
use crate::error::IrResult;
use crate::expression::Expression;
use crate::id::{ConnectorId, ExprId};
use crate::linear_ir::LinearIr;
use crate::port::{PortDescriptor, PortType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExpressionPort {
    pub expr: ExprId,
    pub port_type: PortType,
    pub index: usize,
}

impl ExpressionPort {
    pub fn new(expr: ExprId, port_type: PortType, index: usize) -> Self {
        ExpressionPort {
            expr,
            port_type,
            index,
        }
    }

    pub fn input(expr: ExprId, index: usize) -> Self {
        Self::new(expr, PortType::Input, index)
    }

    pub fn output(expr: ExprId, index: usize) -> Self {
        Self::new(expr, PortType::Output, index)
    }

    pub fn expression<'a>(&self, ir: &'a LinearIr) -> IrResult<&'a Expression> {
        ir.expr(self.expr)
    }

    pub fn descriptor<'a>(&self, ir: &'a LinearIr) -> IrResult<&'a PortDescriptor> {
        let expr = ir.expr(self.expr)?;
        match self.port_type {
            PortType::Input => expr.get_input_port_descriptor(self.index),
            PortType::Output => expr.get_output_port_descriptor(self.index),
        }
    }

    pub fn connector_id(&self, ir: &LinearIr) -> IrResult<ConnectorId> {
        let expr = ir.expr(self.expr)?;
        match self.port_type {
            PortType::Input => expr.get_input_port_connector(self.index),
            PortType::Output => expr.get_output_port_connector(self.index),
        }
    }

    pub fn connector<'a>(&self, ir: &'a LinearIr) -> IrResult<&'a PortConnector> {
        let id = self.connector_id(ir)?;
        ir.connector(id)
    }

    /// Ports on the other end of this port's connector: the producer for an
    /// input, every consumer for an output.
    pub fn connected_ports(&self, ir: &LinearIr) -> IrResult<Vec<ExpressionPort>> {
        let connector = self.connector(ir)?;
        Ok(match self.port_type {
            PortType::Input => vec![*connector.source()],
            PortType::Output => connector.consumers().iter().copied().collect(),
        })
    }
}

impl fmt::Display for ExpressionPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.port_type {
            PortType::Input => "in",
            PortType::Output => "out",
        };
        write!(f, "{}.{}{}", self.expr, dir, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn equality_is_on_the_triple() {
        let a = ExpressionPort::input(ExprId(1), 0);
        assert_eq!(a, ExpressionPort::new(ExprId(1), PortType::Input, 0));
        assert_ne!(a, ExpressionPort::output(ExprId(1), 0));
        assert_ne!(a, ExpressionPort::input(ExprId(1), 1));
        assert_ne!(a, ExpressionPort::input(ExprId(2), 0));
    }

    #[test]
    fn ordering_is_expression_then_direction_then_index() {
        let set: BTreeSet<_> = [
            ExpressionPort::output(ExprId(1), 0),
            ExpressionPort::input(ExprId(1), 1),
            ExpressionPort::input(ExprId(0), 3),
            ExpressionPort::input(ExprId(1), 0),
        ]
        .into_iter()
        .collect();
        let ordered: Vec<String> = set.iter().map(|p| p.to_string()).collect();
        assert_eq!(ordered, vec!["e0.in3", "e1.in0", "e1.in1", "e1.out0"]);
    }
}
