// node.rs — Source operation descriptors
//
// A `Node` is the high-level operation an Expression is lowered from. The IR
// core only reads its kind, its arity and its declared port shapes; operation
// semantics stay with the catalog that produced it.
//
// Preconditions: none.
// Postconditions: `input_shapes.len()` and `output_shapes.len()` always equal
//                 the arity derived from `kind`.
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::rc::Rc;

use crate::shape::Shape;

/// Shared, immutable handle to a source operation.
pub type NodeRef = Rc<Node>;

/// Operation catalog understood by the built-in shape inference.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Graph input with its declared shape.
    Parameter { shape: Shape },
    /// Graph output.
    Result,
    /// Scalar constant.
    Scalar { value: f64 },
    Relu,
    Exp,
    Neg,
    Sqrt,
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    /// Broadcast the innermost dimension to `dim` elements.
    BroadcastMove { dim: usize },
    ReduceSum { axis: usize },
    ReduceMax { axis: usize },
    MatMul,
    Load,
    Store,
    /// Operation with no built-in shape rule; a user factory must cover it.
    Custom {
        name: String,
        inputs: usize,
        outputs: usize,
    },
}

impl OpKind {
    /// `(input count, output count)` of the operation.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            OpKind::Parameter { .. } | OpKind::Scalar { .. } => (0, 1),
            OpKind::Result => (1, 0),
            OpKind::Relu
            | OpKind::Exp
            | OpKind::Neg
            | OpKind::Sqrt
            | OpKind::BroadcastMove { .. }
            | OpKind::ReduceSum { .. }
            | OpKind::ReduceMax { .. }
            | OpKind::Load
            | OpKind::Store => (1, 1),
            OpKind::Add
            | OpKind::Subtract
            | OpKind::Multiply
            | OpKind::Divide
            | OpKind::Maximum
            | OpKind::MatMul => (2, 1),
            OpKind::Custom {
                inputs, outputs, ..
            } => (*inputs, *outputs),
        }
    }

    /// Operation name as written in the textual IR.
    pub fn type_name(&self) -> &str {
        match self {
            OpKind::Parameter { .. } => "Parameter",
            OpKind::Result => "Result",
            OpKind::Scalar { .. } => "Scalar",
            OpKind::Relu => "Relu",
            OpKind::Exp => "Exp",
            OpKind::Neg => "Neg",
            OpKind::Sqrt => "Sqrt",
            OpKind::Add => "Add",
            OpKind::Subtract => "Subtract",
            OpKind::Multiply => "Multiply",
            OpKind::Divide => "Divide",
            OpKind::Maximum => "Maximum",
            OpKind::BroadcastMove { .. } => "BroadcastMove",
            OpKind::ReduceSum { .. } => "ReduceSum",
            OpKind::ReduceMax { .. } => "ReduceMax",
            OpKind::MatMul => "MatMul",
            OpKind::Load => "Load",
            OpKind::Store => "Store",
            OpKind::Custom { name, .. } => name,
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, OpKind::Parameter { .. } | OpKind::Result)
    }

    pub fn is_elementwise(&self) -> bool {
        matches!(
            self,
            OpKind::Relu
                | OpKind::Exp
                | OpKind::Neg
                | OpKind::Sqrt
                | OpKind::Add
                | OpKind::Subtract
                | OpKind::Multiply
                | OpKind::Divide
                | OpKind::Maximum
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Parameter { shape } => write!(f, "Parameter[shape={shape}]"),
            OpKind::Scalar { value } => write!(f, "Scalar[value={value}]"),
            OpKind::BroadcastMove { dim } => write!(f, "BroadcastMove[dim={dim}]"),
            OpKind::ReduceSum { axis } => write!(f, "ReduceSum[axis={axis}]"),
            OpKind::ReduceMax { axis } => write!(f, "ReduceMax[axis={axis}]"),
            other => f.write_str(other.type_name()),
        }
    }
}

/// A source operation: friendly name, kind and declared port shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    kind: OpKind,
    input_shapes: Vec<Shape>,
    output_shapes: Vec<Shape>,
}

impl Node {
    /// Create a node with undeclared (empty) port shapes, except for a
    /// Parameter whose output carries its declared shape.
    pub fn new(name: impl Into<String>, kind: OpKind) -> Self {
        let (n_in, n_out) = kind.arity();
        let mut output_shapes = vec![Shape::default(); n_out];
        if let OpKind::Parameter { shape } = &kind {
            output_shapes[0] = shape.clone();
        }
        Node {
            name: name.into(),
            kind,
            input_shapes: vec![Shape::default(); n_in],
            output_shapes,
        }
    }

    /// Declare the shape of output `index`. Out-of-range indices are ignored.
    pub fn with_output_shape(mut self, index: usize, shape: Shape) -> Self {
        if let Some(slot) = self.output_shapes.get_mut(index) {
            *slot = shape;
        }
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Rc::new(self)
    }

    /// Friendly name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn input_count(&self) -> usize {
        self.input_shapes.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_shapes.len()
    }

    pub fn input_shapes(&self) -> &[Shape] {
        &self.input_shapes
    }

    pub fn output_shapes(&self) -> &[Shape] {
        &self.output_shapes
    }
}
