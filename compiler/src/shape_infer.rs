// shape_infer.rs — Shape-inference strategies and their factory
//
// Each Expression owns one `ShapeInfer` strategy, created once from its source
// operation by a `ShapeInferFactory`. A strategy maps one ordered batch of
// input shapes to one shape per output port.
//
// Preconditions: input batches are index-aligned with the operation's inputs.
// Postconditions: on `Ok` with `InferStatus::Success`, `dims.len()` equals the
//                 operation's output count for every built-in strategy.
// Failure modes: incompatible shapes, wrong batch size, bad axis → `ShapeInferError`.
// Side effects: none.

use std::fmt;

use thiserror::Error;

use crate::node::{Node, OpKind};
use crate::shape::{broadcast_merge, Shape, DYNAMIC_DIM};

// ── Result and error types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferStatus {
    Success,
    /// The strategy declined to produce shapes for this batch.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferResult {
    pub dims: Vec<Shape>,
    pub status: InferStatus,
}

impl InferResult {
    pub fn success(dims: Vec<Shape>) -> Self {
        InferResult {
            dims,
            status: InferStatus::Success,
        }
    }

    pub fn skip() -> Self {
        InferResult {
            dims: Vec::new(),
            status: InferStatus::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeInferError {
    #[error("expected {expected} input shapes, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("incompatible shapes {lhs} and {rhs}")]
    Incompatible { lhs: Shape, rhs: Shape },

    #[error("shape {shape} must have rank >= {min_rank}")]
    Rank { shape: Shape, min_rank: usize },

    #[error("axis {axis} out of range for shape {shape}")]
    Axis { axis: usize, shape: Shape },

    #[error("did not return success status")]
    Status,

    #[error("returned {got} output shapes for {expected} output ports")]
    OutputCount { expected: usize, got: usize },

    #[error("no shape inference registered for operation type '{0}'")]
    Unregistered(String),

    #[error("{0}")]
    Other(String),
}

// ── Strategy and factory traits ─────────────────────────────────────────────

/// Computes output shapes from one batch of input shapes.
pub trait ShapeInfer: fmt::Debug {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError>;
}

/// Creates the strategy for a source operation. Returns `None` for
/// operations the factory does not know.
pub trait ShapeInferFactory {
    fn make(&self, node: &Node) -> Option<Box<dyn ShapeInfer>>;
}

/// Resolve the strategy for `node`: the user factory first, then the
/// built-in rules. `None` means no strategy covers the operation.
pub fn make_shape_inference(
    node: &Node,
    factory: Option<&dyn ShapeInferFactory>,
) -> Option<Box<dyn ShapeInfer>> {
    factory
        .and_then(|f| f.make(node))
        .or_else(|| DefaultShapeInferFactory.make(node))
}

/// Built-in rules for the operation catalog in `node::OpKind`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultShapeInferFactory;

impl ShapeInferFactory for DefaultShapeInferFactory {
    fn make(&self, node: &Node) -> Option<Box<dyn ShapeInfer>> {
        let strategy: Box<dyn ShapeInfer> = match node.kind() {
            OpKind::Parameter { shape } => Box::new(ParameterShape {
                shape: shape.clone(),
            }),
            OpKind::Result => Box::new(EmptyShape),
            OpKind::Scalar { .. } => Box::new(SingleElement),
            OpKind::Relu | OpKind::Exp | OpKind::Neg | OpKind::Sqrt => Box::new(PassThrough),
            OpKind::Load | OpKind::Store => Box::new(PassThrough),
            OpKind::Add
            | OpKind::Subtract
            | OpKind::Multiply
            | OpKind::Divide
            | OpKind::Maximum => Box::new(NumpyBroadcast { inputs: 2 }),
            OpKind::BroadcastMove { dim } => Box::new(BroadcastMove { dim: *dim }),
            OpKind::ReduceSum { axis } | OpKind::ReduceMax { axis } => {
                Box::new(Reduce { axis: *axis })
            }
            OpKind::MatMul => Box::new(MatMul),
            OpKind::Custom { .. } => return None,
        };
        Some(strategy)
    }
}

fn expect_inputs(input_shapes: &[&Shape], expected: usize) -> Result<(), ShapeInferError> {
    if input_shapes.len() != expected {
        return Err(ShapeInferError::InputCount {
            expected,
            got: input_shapes.len(),
        });
    }
    Ok(())
}

// ── Built-in strategies ─────────────────────────────────────────────────────

/// Output 0 takes the shape of input 0.
#[derive(Debug, Clone, Copy)]
pub struct PassThrough;

impl ShapeInfer for PassThrough {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        match input_shapes.first() {
            Some(shape) => Ok(InferResult::success(vec![(*shape).clone()])),
            None => Err(ShapeInferError::InputCount {
                expected: 1,
                got: 0,
            }),
        }
    }
}

/// Elementwise ops: all inputs broadcast into one output shape.
#[derive(Debug, Clone, Copy)]
pub struct NumpyBroadcast {
    pub inputs: usize,
}

impl ShapeInfer for NumpyBroadcast {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        expect_inputs(input_shapes, self.inputs)?;
        let mut out = input_shapes[0].clone();
        for shape in &input_shapes[1..] {
            if !broadcast_merge(&mut out, shape) {
                return Err(ShapeInferError::Incompatible {
                    lhs: out,
                    rhs: (*shape).clone(),
                });
            }
        }
        Ok(InferResult::success(vec![out]))
    }
}

/// Graph outputs produce nothing.
#[derive(Debug, Clone, Copy)]
pub struct EmptyShape;

impl ShapeInfer for EmptyShape {
    fn infer(&self, _input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        Ok(InferResult::success(Vec::new()))
    }
}

/// Scalars are single-element tensors.
#[derive(Debug, Clone, Copy)]
pub struct SingleElement;

impl ShapeInfer for SingleElement {
    fn infer(&self, _input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        Ok(InferResult::success(vec![Shape::from([1])]))
    }
}

/// Graph inputs report their declared shape.
#[derive(Debug, Clone)]
pub struct ParameterShape {
    pub shape: Shape,
}

impl ShapeInfer for ParameterShape {
    fn infer(&self, _input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        Ok(InferResult::success(vec![self.shape.clone()]))
    }
}

/// Innermost dimension is replaced by `dim`.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastMove {
    pub dim: usize,
}

impl ShapeInfer for BroadcastMove {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        expect_inputs(input_shapes, 1)?;
        let input = input_shapes[0];
        if input.rank() == 0 {
            return Err(ShapeInferError::Rank {
                shape: input.clone(),
                min_rank: 1,
            });
        }
        let mut dims = input.dims().to_vec();
        if let Some(last) = dims.last_mut() {
            *last = self.dim;
        }
        Ok(InferResult::success(vec![Shape::new(dims)]))
    }
}

/// Reduction keeps rank; the reduced axis becomes 1.
#[derive(Debug, Clone, Copy)]
pub struct Reduce {
    pub axis: usize,
}

impl ShapeInfer for Reduce {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        expect_inputs(input_shapes, 1)?;
        let input = input_shapes[0];
        if self.axis >= input.rank() {
            return Err(ShapeInferError::Axis {
                axis: self.axis,
                shape: input.clone(),
            });
        }
        let mut dims = input.dims().to_vec();
        dims[self.axis] = 1;
        Ok(InferResult::success(vec![Shape::new(dims)]))
    }
}

/// `[.., M, K] x [.., K, N] -> [.., M, N]` with broadcast batch dims.
#[derive(Debug, Clone, Copy)]
pub struct MatMul;

impl ShapeInfer for MatMul {
    fn infer(&self, input_shapes: &[&Shape]) -> Result<InferResult, ShapeInferError> {
        expect_inputs(input_shapes, 2)?;
        let (a, b) = (input_shapes[0], input_shapes[1]);
        for s in [a, b] {
            if s.rank() < 2 {
                return Err(ShapeInferError::Rank {
                    shape: s.clone(),
                    min_rank: 2,
                });
            }
        }
        let (ad, bd) = (a.dims(), b.dims());
        let (m, k_a) = (ad[ad.len() - 2], ad[ad.len() - 1]);
        let (k_b, n) = (bd[bd.len() - 2], bd[bd.len() - 1]);
        let k_ok = k_a == k_b || k_a == DYNAMIC_DIM || k_b == DYNAMIC_DIM;
        if !k_ok {
            return Err(ShapeInferError::Incompatible {
                lhs: a.clone(),
                rhs: b.clone(),
            });
        }

        let mut batch = Shape::new(ad[..ad.len() - 2].to_vec());
        if !broadcast_merge(&mut batch, &Shape::new(bd[..bd.len() - 2].to_vec())) {
            return Err(ShapeInferError::Incompatible {
                lhs: a.clone(),
                rhs: b.clone(),
            });
        }
        let mut dims = batch.into_dims();
        dims.push(m);
        dims.push(n);
        Ok(InferResult::success(vec![Shape::new(dims)]))
    }
}
