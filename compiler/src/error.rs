// error.rs — Error taxonomy of the lowered IR core
//
// Every operation on Expression, PortConnector and LinearIr that can fail
// returns `IrError`. The core never retries or degrades: it reports which
// precondition broke and lets the calling pass decide.

use thiserror::Error;

use crate::id::{ConnectorId, ExprId, LoopId};
use crate::port::PortType;
use crate::shape_infer::ShapeInferError;

/// Result alias used throughout the IR core.
pub type IrResult<T> = Result<T, IrError>;

/// Which structural invariant `validate()` found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// Input descriptor and input connector counts differ.
    InputArity,
    /// Output descriptor and output connector counts differ.
    OutputArity,
    /// The expression has no source operation.
    SourceOperation,
    /// The loop-id list contains a repeated value.
    UniqueLoopIds,
    /// A connector does not list a port that reads from it, or lists one that doesn't.
    ConsumerBookkeeping,
    /// An output connector's source is not the port that owns it.
    ConnectorSource,
    /// A consumer's input shape differs from its connector's source shape.
    ShapeAgreement,
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Invariant::InputArity => "input descriptor count equals input connector count",
            Invariant::OutputArity => "output descriptor count equals output connector count",
            Invariant::SourceOperation => "expression has a source operation",
            Invariant::UniqueLoopIds => "loop ids are unique",
            Invariant::ConsumerBookkeeping => "connector consumers match the ports reading them",
            Invariant::ConnectorSource => "output connector source is its owning port",
            Invariant::ShapeAgreement => "consumer shapes match their connector source shape",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error("{port_type} port index {index} out of range ({count} ports)")]
    OutOfRange {
        port_type: PortType,
        index: usize,
        count: usize,
    },

    #[error("{what}: expected {expected}, got {got}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("loop ids must be unique: {loop_id} appears more than once")]
    DuplicateLoopId { loop_id: LoopId },

    #[error("uninitialized state: {0}")]
    UninitializedState(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("shape inference of '{node}' failed: {cause}")]
    ShapeInferenceFailure {
        node: String,
        #[source]
        cause: ShapeInferError,
    },

    #[error("invariant violated ({invariant}): {detail}")]
    InvariantViolation {
        invariant: Invariant,
        detail: String,
    },

    #[error("unknown expression {0}")]
    UnknownExpression(ExprId),

    #[error("unknown connector {0}")]
    UnknownConnector(ConnectorId),
}

impl IrError {
    pub(crate) fn out_of_range(port_type: PortType, index: usize, count: usize) -> Self {
        IrError::OutOfRange {
            port_type,
            index,
            count,
        }
    }

    pub(crate) fn violation(invariant: Invariant, detail: impl Into<String>) -> Self {
        IrError::InvariantViolation {
            invariant,
            detail: detail.into(),
        }
    }
}
