// connector.rs — Directed data edges between expression ports
//
// A PortConnector binds exactly one producing port to any number of consuming
// ports. Connectors live in the LinearIr connector table and are shared by id,
// so a connector outlives every expression that still names it.
//
// Invariant: every port in `consumers` is an input port whose expression names
// this connector at that index (checked by `LinearIr::validate`).

use std::collections::BTreeSet;

use crate::error::{IrError, IrResult};
use crate::expression_port::ExpressionPort;
use crate::port::PortType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConnector {
    source: ExpressionPort,
    consumers: BTreeSet<ExpressionPort>,
}

impl PortConnector {
    /// A connector fed by `source`, which must be an output port.
    pub fn new(source: ExpressionPort) -> IrResult<Self> {
        Self::with_consumers(source, BTreeSet::new())
    }

    pub fn with_consumers(
        source: ExpressionPort,
        consumers: BTreeSet<ExpressionPort>,
    ) -> IrResult<Self> {
        if source.port_type != PortType::Output {
            return Err(IrError::InvalidState(format!(
                "connector source {source} must be an output port"
            )));
        }
        if let Some(bad) = consumers.iter().find(|p| p.port_type != PortType::Input) {
            return Err(IrError::InvalidState(format!(
                "connector consumer {bad} must be an input port"
            )));
        }
        Ok(PortConnector { source, consumers })
    }

    pub fn source(&self) -> &ExpressionPort {
        &self.source
    }

    pub fn set_source(&mut self, source: ExpressionPort) -> IrResult<()> {
        if source.port_type != PortType::Output {
            return Err(IrError::InvalidState(format!(
                "connector source {source} must be an output port"
            )));
        }
        self.source = source;
        Ok(())
    }

    pub fn consumers(&self) -> &BTreeSet<ExpressionPort> {
        &self.consumers
    }

    pub fn found_consumer(&self, port: &ExpressionPort) -> bool {
        self.consumers.contains(port)
    }

    /// Register `port` as a reader. Returns false if it was already one.
    pub fn add_consumer(&mut self, port: ExpressionPort) -> IrResult<bool> {
        if port.port_type != PortType::Input {
            return Err(IrError::InvalidState(format!(
                "connector consumer {port} must be an input port"
            )));
        }
        Ok(self.consumers.insert(port))
    }

    pub fn remove_consumer(&mut self, port: &ExpressionPort) -> IrResult<()> {
        if !self.consumers.remove(port) {
            return Err(IrError::InvalidState(format!(
                "{port} is not a consumer of the connector fed by {}",
                self.source
            )));
        }
        Ok(())
    }
}
