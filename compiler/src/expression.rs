// expression.rs — A single lowered operation
//
// An Expression wraps its source operation, index-aligned input/output port
// descriptors and connectors, an optional emitter, its loop membership and the
// shape-inference strategy created for it at construction.
//
// Preconditions: connector ids passed to constructors name connectors in the
//                container the expression is installed into.
// Postconditions: after construction the descriptor and connector sequences
//                 have equal lengths per direction and a source operation is set.
// Failure modes: bad port index → `OutOfRange`; register/shape batch length →
//                `ArityMismatch`; repeated loop id → `DuplicateLoopId`; port
//                handle before installation → `InvalidState`; inference error,
//                non-success status or wrong output count → `ShapeInferenceFailure`.
// Side effects: none beyond the expression itself. Mutators are all-or-nothing:
//               a failing call leaves the expression as it was, except that
//               `update_shapes` propagates input shapes before inferring.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::emitter::{EmitterRef, TargetMachine};
use crate::error::{Invariant, IrError, IrResult};
use crate::expression_port::ExpressionPort;
use crate::id::{ConnectorId, ExprId, LoopId};
use crate::io_expression::{IoExpression, IoInfo, IoKind};
use crate::node::NodeRef;
use crate::port::{PortDescriptor, PortType, RegInfo};
use crate::shape::Shape;
use crate::shape_infer::{
    make_shape_inference, InferStatus, ShapeInfer, ShapeInferError, ShapeInferFactory,
};

#[derive(Debug)]
pub struct Expression {
    id: Option<ExprId>,
    source: Option<NodeRef>,
    input_descs: Vec<PortDescriptor>,
    output_descs: Vec<PortDescriptor>,
    input_connectors: Vec<ConnectorId>,
    output_connectors: Vec<ConnectorId>,
    emitter: Option<EmitterRef>,
    loop_ids: Vec<LoopId>,
    shape_infer: Option<Box<dyn ShapeInfer>>,
    io: Option<IoInfo>,
}

impl Expression {
    /// Lower `node` into an expression reading `inputs` and feeding `outputs`.
    ///
    /// Port descriptors start from the node's declared shapes. The
    /// shape-inference strategy is resolved once, here.
    pub fn new(
        node: NodeRef,
        inputs: Vec<ConnectorId>,
        outputs: Vec<ConnectorId>,
        factory: Option<&dyn ShapeInferFactory>,
    ) -> IrResult<Self> {
        if inputs.len() != node.input_count() {
            return Err(IrError::ArityMismatch {
                what: "input connectors",
                expected: node.input_count(),
                got: inputs.len(),
            });
        }
        if outputs.len() != node.output_count() {
            return Err(IrError::ArityMismatch {
                what: "output connectors",
                expected: node.output_count(),
                got: outputs.len(),
            });
        }
        let input_descs = node
            .input_shapes()
            .iter()
            .cloned()
            .map(PortDescriptor::new)
            .collect();
        let output_descs = node
            .output_shapes()
            .iter()
            .cloned()
            .map(PortDescriptor::new)
            .collect();
        let shape_infer = make_shape_inference(&node, factory);
        Ok(Expression {
            id: None,
            source: Some(node),
            input_descs,
            output_descs,
            input_connectors: inputs,
            output_connectors: outputs,
            emitter: None,
            loop_ids: Vec::new(),
            shape_infer,
            io: None,
        })
    }

    /// Lower a Parameter (graph input) or Result (graph output) together with
    /// its ordinal among the graph's inputs or outputs.
    pub fn new_io(
        node: NodeRef,
        index: i64,
        inputs: Vec<ConnectorId>,
        outputs: Vec<ConnectorId>,
        factory: Option<&dyn ShapeInferFactory>,
    ) -> IrResult<Self> {
        let kind = IoKind::for_node(&node).ok_or_else(|| {
            IrError::InvalidState(format!(
                "'{}' ({}) is not a graph boundary operation",
                node.name(),
                node.kind().type_name()
            ))
        })?;
        let mut expr = Self::new(node, inputs, outputs, factory)?;
        expr.io = Some(IoInfo { index, kind });
        Ok(expr)
    }

    // ── Identity ──

    /// Id assigned by the owning container; `None` until installed.
    pub fn id(&self) -> Option<ExprId> {
        self.id
    }

    pub(crate) fn install(&mut self, id: ExprId) {
        self.id = Some(id);
    }

    pub fn get_node(&self) -> IrResult<&NodeRef> {
        self.source.as_ref().ok_or_else(|| {
            IrError::UninitializedState(
                "attempt to get uninitialized source operation from lowered expression".into(),
            )
        })
    }

    pub fn io(&self) -> Option<IoExpression<'_>> {
        self.io.map(|info| IoExpression::new(self, info))
    }

    pub fn io_info(&self) -> Option<IoInfo> {
        self.io
    }

    // ── Ports ──

    pub fn input_count(&self) -> usize {
        self.input_descs.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_descs.len()
    }

    pub fn get_input_port_connector(&self, i: usize) -> IrResult<ConnectorId> {
        self.input_connectors
            .get(i)
            .copied()
            .ok_or_else(|| IrError::out_of_range(PortType::Input, i, self.input_connectors.len()))
    }

    pub fn get_output_port_connector(&self, i: usize) -> IrResult<ConnectorId> {
        self.output_connectors.get(i).copied().ok_or_else(|| {
            IrError::out_of_range(PortType::Output, i, self.output_connectors.len())
        })
    }

    pub fn input_port_connectors(&self) -> &[ConnectorId] {
        &self.input_connectors
    }

    pub fn output_port_connectors(&self) -> &[ConnectorId] {
        &self.output_connectors
    }

    pub fn get_input_port_descriptor(&self, i: usize) -> IrResult<&PortDescriptor> {
        let count = self.input_descs.len();
        self.input_descs
            .get(i)
            .ok_or_else(|| IrError::out_of_range(PortType::Input, i, count))
    }

    pub fn get_output_port_descriptor(&self, i: usize) -> IrResult<&PortDescriptor> {
        let count = self.output_descs.len();
        self.output_descs
            .get(i)
            .ok_or_else(|| IrError::out_of_range(PortType::Output, i, count))
    }

    pub fn get_input_port_descriptor_mut(&mut self, i: usize) -> IrResult<&mut PortDescriptor> {
        let count = self.input_descs.len();
        self.input_descs
            .get_mut(i)
            .ok_or_else(|| IrError::out_of_range(PortType::Input, i, count))
    }

    pub fn get_output_port_descriptor_mut(&mut self, i: usize) -> IrResult<&mut PortDescriptor> {
        let count = self.output_descs.len();
        self.output_descs
            .get_mut(i)
            .ok_or_else(|| IrError::out_of_range(PortType::Output, i, count))
    }

    pub fn input_port_descriptors(&self) -> &[PortDescriptor] {
        &self.input_descs
    }

    pub fn output_port_descriptors(&self) -> &[PortDescriptor] {
        &self.output_descs
    }

    /// Handle to input port `i`. Requires the expression to be installed in
    /// a container, since the handle names it by id.
    pub fn get_input_port(&self, i: usize) -> IrResult<ExpressionPort> {
        self.port_handle(PortType::Input, i)
    }

    pub fn get_output_port(&self, i: usize) -> IrResult<ExpressionPort> {
        self.port_handle(PortType::Output, i)
    }

    fn port_handle(&self, port_type: PortType, i: usize) -> IrResult<ExpressionPort> {
        let id = self.id.ok_or_else(|| {
            IrError::InvalidState(
                "expression is not owned by a linear IR; port handles need a stable id".into(),
            )
        })?;
        let count = match port_type {
            PortType::Input => self.input_descs.len(),
            PortType::Output => self.output_descs.len(),
        };
        if i >= count {
            return Err(IrError::out_of_range(port_type, i, count));
        }
        Ok(ExpressionPort::new(id, port_type, i))
    }

    /// Rebind input `port` to `to`, returning the connector it replaced.
    ///
    /// Consumer bookkeeping on both connectors is the container's job; use
    /// `LinearIr::replace_input` unless the expression is not installed.
    pub fn replace_input(&mut self, port: usize, to: ConnectorId) -> IrResult<ConnectorId> {
        let count = self.input_connectors.len();
        let slot = self
            .input_connectors
            .get_mut(port)
            .ok_or_else(|| IrError::out_of_range(PortType::Input, port, count))?;
        Ok(std::mem::replace(slot, to))
    }

    // ── Registers ──

    pub fn get_reg_info(&self) -> RegInfo {
        RegInfo {
            inputs: self.input_descs.iter().map(|d| d.reg()).collect(),
            outputs: self.output_descs.iter().map(|d| d.reg()).collect(),
        }
    }

    /// Apply a register assignment. Both lengths are checked before any
    /// descriptor is written.
    pub fn set_reg_info(&mut self, info: RegInfo) -> IrResult<()> {
        if info.inputs.len() != self.input_descs.len() {
            return Err(IrError::ArityMismatch {
                what: "input physical registers",
                expected: self.input_descs.len(),
                got: info.inputs.len(),
            });
        }
        if info.outputs.len() != self.output_descs.len() {
            return Err(IrError::ArityMismatch {
                what: "output physical registers",
                expected: self.output_descs.len(),
                got: info.outputs.len(),
            });
        }
        for (desc, reg) in self.input_descs.iter_mut().zip(info.inputs) {
            desc.set_reg(reg);
        }
        for (desc, reg) in self.output_descs.iter_mut().zip(info.outputs) {
            desc.set_reg(reg);
        }
        Ok(())
    }

    // ── Loops ──

    pub fn get_loop_ids(&self) -> &[LoopId] {
        &self.loop_ids
    }

    pub fn set_loop_ids(&mut self, loops: &[LoopId]) -> IrResult<()> {
        if let Some(dup) = first_duplicate(loops) {
            return Err(IrError::DuplicateLoopId { loop_id: dup });
        }
        self.loop_ids = loops.to_vec();
        Ok(())
    }

    // ── Emitter ──

    pub fn get_emitter(&self) -> Option<EmitterRef> {
        self.emitter.clone()
    }

    pub fn set_emitter(&mut self, emitter: Option<EmitterRef>) {
        self.emitter = emitter;
    }

    /// Ask `target` for this expression's emitter.
    pub fn init_emitter(&mut self, target: &dyn TargetMachine) -> IrResult<()> {
        let node = Rc::clone(self.get_node()?);
        if !target.is_supported(node.kind()) {
            return Err(IrError::InvalidState(format!(
                "target '{}' cannot emit '{}' ({})",
                target.name(),
                node.name(),
                node.kind().type_name()
            )));
        }
        let emitter = target.create_emitter(&node).ok_or_else(|| {
            IrError::InvalidState(format!(
                "target '{}' produced no emitter for '{}'",
                target.name(),
                node.name()
            ))
        })?;
        self.emitter = Some(emitter);
        Ok(())
    }

    // ── Validation ──

    /// Re-check the construction invariants without modifying anything.
    pub fn validate(&self) -> IrResult<()> {
        if self.input_descs.len() != self.input_connectors.len() {
            return Err(IrError::violation(
                Invariant::InputArity,
                format!(
                    "{} input descriptors vs {} input connectors",
                    self.input_descs.len(),
                    self.input_connectors.len()
                ),
            ));
        }
        if self.output_descs.len() != self.output_connectors.len() {
            return Err(IrError::violation(
                Invariant::OutputArity,
                format!(
                    "{} output descriptors vs {} output connectors",
                    self.output_descs.len(),
                    self.output_connectors.len()
                ),
            ));
        }
        if self.source.is_none() {
            return Err(IrError::violation(
                Invariant::SourceOperation,
                "the expression has no source operation",
            ));
        }
        if let Some(dup) = first_duplicate(&self.loop_ids) {
            return Err(IrError::violation(
                Invariant::UniqueLoopIds,
                format!("loop id {dup} is repeated"),
            ));
        }
        Ok(())
    }

    // ── Shapes ──

    pub fn has_shape_inference(&self) -> bool {
        self.shape_infer.is_some()
    }

    /// Recompute output shapes from the shapes on the source side of each
    /// input connector (`source_shapes[i]` for input `i`).
    ///
    /// Input descriptors take the source shapes first; the strategy then runs
    /// once on the whole batch. Output descriptors change only if inference
    /// succeeds with one shape per output.
    pub fn update_shapes(&mut self, source_shapes: Vec<Shape>) -> IrResult<()> {
        let node = Rc::clone(self.get_node()?);
        if source_shapes.len() != self.input_descs.len() {
            return Err(IrError::ArityMismatch {
                what: "input shape batch",
                expected: self.input_descs.len(),
                got: source_shapes.len(),
            });
        }
        let fail = |cause: ShapeInferError| IrError::ShapeInferenceFailure {
            node: node.name().to_string(),
            cause,
        };
        let strategy = self
            .shape_infer
            .as_ref()
            .ok_or_else(|| fail(ShapeInferError::Unregistered(node.kind().type_name().into())))?;

        for (desc, shape) in self.input_descs.iter_mut().zip(source_shapes) {
            desc.set_shape(shape);
        }
        let batch: Vec<&Shape> = self.input_descs.iter().map(|d| d.shape()).collect();
        let result = strategy.infer(&batch).map_err(fail)?;

        if result.status != InferStatus::Success {
            return Err(fail(ShapeInferError::Status));
        }
        if result.dims.len() != self.output_descs.len() {
            return Err(fail(ShapeInferError::OutputCount {
                expected: self.output_descs.len(),
                got: result.dims.len(),
            }));
        }
        for (desc, shape) in self.output_descs.iter_mut().zip(result.dims) {
            desc.set_shape(shape);
        }
        log::trace!("updated shapes of '{}'", node.name());
        Ok(())
    }
}

fn first_duplicate(ids: &[LoopId]) -> Option<LoopId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().find(|id| !seen.insert(*id))
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{id}")?,
            None => write!(f, "e?")?,
        }
        match &self.source {
            Some(node) => write!(f, " {} = {}(", node.name(), node.kind())?,
            None => write!(f, " <null> = (")?,
        }
        for (i, (c, d)) in self.input_connectors.iter().zip(&self.input_descs).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}:{d}")?;
        }
        write!(f, ")")?;
        for (i, (c, d)) in self
            .output_connectors
            .iter()
            .zip(&self.output_descs)
            .enumerate()
        {
            let sep = if i == 0 { " -> " } else { ", " };
            write!(f, "{sep}{c}:{d}")?;
        }
        if !self.loop_ids.is_empty() {
            write!(f, " loops={:?}", self.loop_ids)?;
        }
        if let Some(io) = self.io {
            write!(f, " io={}#{}", io.kind, io.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emitter;
    use crate::node::{Node, OpKind};
    use crate::port::Reg;
    use crate::shape_infer::InferResult;

    fn add_expr() -> Expression {
        let node = Node::new("add", OpKind::Add).into_ref();
        Expression::new(
            node,
            vec![ConnectorId(0), ConnectorId(1)],
            vec![ConnectorId(2)],
            None,
        )
        .unwrap()
    }

    fn regs(inputs: &[usize], outputs: &[usize]) -> RegInfo {
        RegInfo::new(
            inputs.iter().map(|&i| Some(Reg::vec(i))).collect(),
            outputs.iter().map(|&i| Some(Reg::vec(i))).collect(),
        )
    }

    // ── Construction ──

    #[test]
    fn construction_aligns_ports_and_connectors() {
        let e = add_expr();
        assert_eq!(e.input_port_descriptors().len(), e.input_port_connectors().len());
        assert_eq!(e.output_port_descriptors().len(), e.output_port_connectors().len());
        assert!(e.validate().is_ok());
        assert!(e.id().is_none());
    }

    #[test]
    fn construction_rejects_wrong_connector_count() {
        let node = Node::new("add", OpKind::Add).into_ref();
        let err = Expression::new(node, vec![ConnectorId(0)], vec![ConnectorId(1)], None)
            .unwrap_err();
        assert!(matches!(
            err,
            IrError::ArityMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn io_expression_requires_boundary_op() {
        let relu = Node::new("relu", OpKind::Relu).into_ref();
        let err = Expression::new_io(relu, 0, vec![ConnectorId(0)], vec![ConnectorId(1)], None)
            .unwrap_err();
        assert!(matches!(err, IrError::InvalidState(_)));

        let result = Node::new("out", OpKind::Result).into_ref();
        let e = Expression::new_io(result, 3, vec![ConnectorId(0)], vec![], None).unwrap();
        let io = e.io().unwrap();
        assert_eq!(io.kind(), IoKind::Output);
        assert_eq!(io.index(), 3);
    }

    // ── Bounds ──

    #[test]
    fn accessors_check_bounds() {
        let e = add_expr();
        assert_eq!(e.get_input_port_connector(1).unwrap(), ConnectorId(1));
        assert!(matches!(
            e.get_input_port_connector(2),
            Err(IrError::OutOfRange {
                port_type: PortType::Input,
                index: 2,
                count: 2
            })
        ));
        assert!(e.get_output_port_connector(1).is_err());
        assert!(e.get_input_port_descriptor(5).is_err());
        assert!(e.get_output_port_descriptor(0).is_ok());
    }

    #[test]
    fn get_node_without_source_fails() {
        let mut e = add_expr();
        e.source = None;
        assert!(matches!(e.get_node(), Err(IrError::UninitializedState(_))));
    }

    // ── Registers ──

    #[test]
    fn reg_info_round_trip() {
        let mut e = add_expr();
        let info = regs(&[0, 1], &[2]);
        e.set_reg_info(info.clone()).unwrap();
        assert_eq!(e.get_reg_info(), info);
    }

    #[test]
    fn reg_info_mismatch_is_atomic() {
        let mut e = add_expr();
        e.set_reg_info(regs(&[0, 1], &[2])).unwrap();
        // Inputs are the right size but outputs are not: nothing may change.
        let err = e.set_reg_info(regs(&[7, 8], &[9, 10])).unwrap_err();
        assert!(matches!(err, IrError::ArityMismatch { .. }));
        assert_eq!(e.get_reg_info(), regs(&[0, 1], &[2]));
    }

    // ── Loops ──

    #[test]
    fn loop_ids_round_trip() {
        let mut e = add_expr();
        e.set_loop_ids(&[1, 2, 3]).unwrap();
        let got: HashSet<_> = e.get_loop_ids().iter().copied().collect();
        assert_eq!(got, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn duplicate_loop_ids_rejected_without_commit() {
        let mut e = add_expr();
        e.set_loop_ids(&[4]).unwrap();
        let err = e.set_loop_ids(&[1, 1]).unwrap_err();
        assert!(matches!(err, IrError::DuplicateLoopId { loop_id: 1 }));
        assert_eq!(e.get_loop_ids(), &[4]);
    }

    // ── replace_input ──

    #[test]
    fn replace_input_rebinds_one_index() {
        let mut e = add_expr();
        let old = e.replace_input(1, ConnectorId(9)).unwrap();
        assert_eq!(old, ConnectorId(1));
        assert_eq!(e.get_input_port_connector(1).unwrap(), ConnectorId(9));
        assert_eq!(e.get_input_port_connector(0).unwrap(), ConnectorId(0));
    }

    #[test]
    fn replace_input_out_of_range_leaves_expression() {
        let mut e = add_expr();
        assert!(matches!(
            e.replace_input(2, ConnectorId(9)),
            Err(IrError::OutOfRange { .. })
        ));
        assert_eq!(e.input_port_connectors(), &[ConnectorId(0), ConnectorId(1)]);
    }

    // ── Port handles ──

    #[test]
    fn port_handle_needs_installation() {
        let mut e = add_expr();
        assert!(matches!(e.get_input_port(0), Err(IrError::InvalidState(_))));
        e.install(ExprId(5));
        let p = e.get_output_port(0).unwrap();
        assert_eq!(p, ExpressionPort::output(ExprId(5), 0));
        assert!(matches!(
            e.get_input_port(2),
            Err(IrError::OutOfRange { .. })
        ));
    }

    // ── Validation ──

    #[test]
    fn validate_detects_corrupted_connector_count() {
        let mut e = add_expr();
        e.input_connectors.push(ConnectorId(42));
        assert!(matches!(
            e.validate(),
            Err(IrError::InvariantViolation {
                invariant: Invariant::InputArity,
                ..
            })
        ));
    }

    #[test]
    fn validate_detects_missing_source_and_duplicate_loops() {
        let mut e = add_expr();
        e.loop_ids = vec![2, 2];
        assert!(matches!(
            e.validate(),
            Err(IrError::InvariantViolation {
                invariant: Invariant::UniqueLoopIds,
                ..
            })
        ));
        e.loop_ids.clear();
        e.source = None;
        assert!(matches!(
            e.validate(),
            Err(IrError::InvariantViolation {
                invariant: Invariant::SourceOperation,
                ..
            })
        ));
    }

    // ── Shapes ──

    #[test]
    fn update_shapes_propagates_then_infers() {
        let mut e = add_expr();
        e.update_shapes(vec![Shape::from([2, 3]), Shape::from([1, 3])])
            .unwrap();
        assert_eq!(e.get_input_port_descriptor(1).unwrap().shape(), &Shape::from([1, 3]));
        assert_eq!(e.get_output_port_descriptor(0).unwrap().shape(), &Shape::from([2, 3]));
    }

    #[test]
    fn update_shapes_wraps_strategy_error_with_node_name() {
        let mut e = add_expr();
        let err = e
            .update_shapes(vec![Shape::from([2, 3]), Shape::from([4, 3])])
            .unwrap_err();
        match err {
            IrError::ShapeInferenceFailure { node, cause } => {
                assert_eq!(node, "add");
                assert!(matches!(cause, ShapeInferError::Incompatible { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(e.get_output_port_descriptor(0).unwrap().shape(), &Shape::default());
    }

    #[derive(Debug)]
    struct Declines;

    impl ShapeInfer for Declines {
        fn infer(&self, _: &[&Shape]) -> Result<InferResult, ShapeInferError> {
            Ok(InferResult::skip())
        }
    }

    #[derive(Debug)]
    struct TooMany;

    impl ShapeInfer for TooMany {
        fn infer(&self, _: &[&Shape]) -> Result<InferResult, ShapeInferError> {
            Ok(InferResult::success(vec![Shape::from([1]), Shape::from([2])]))
        }
    }

    #[test]
    fn update_shapes_non_success_keeps_outputs() {
        let mut e = add_expr();
        e.update_shapes(vec![Shape::from([4]), Shape::from([4])]).unwrap();
        e.shape_infer = Some(Box::new(Declines));
        let err = e
            .update_shapes(vec![Shape::from([8]), Shape::from([8])])
            .unwrap_err();
        assert!(matches!(
            err,
            IrError::ShapeInferenceFailure {
                cause: ShapeInferError::Status,
                ..
            }
        ));
        assert_eq!(e.get_output_port_descriptor(0).unwrap().shape(), &Shape::from([4]));
    }

    #[test]
    fn update_shapes_rejects_wrong_output_count() {
        let mut e = add_expr();
        e.shape_infer = Some(Box::new(TooMany));
        let err = e
            .update_shapes(vec![Shape::from([1]), Shape::from([1])])
            .unwrap_err();
        assert!(matches!(
            err,
            IrError::ShapeInferenceFailure {
                cause: ShapeInferError::OutputCount {
                    expected: 1,
                    got: 2
                },
                ..
            }
        ));
    }

    #[test]
    fn update_shapes_without_strategy() {
        let node = Node::new(
            "split",
            OpKind::Custom {
                name: "Split".into(),
                inputs: 1,
                outputs: 2,
            },
        )
        .into_ref();
        let mut e = Expression::new(
            node,
            vec![ConnectorId(0)],
            vec![ConnectorId(1), ConnectorId(2)],
            None,
        )
        .unwrap();
        assert!(!e.has_shape_inference());
        let err = e.update_shapes(vec![Shape::from([4])]).unwrap_err();
        assert!(matches!(
            err,
            IrError::ShapeInferenceFailure {
                cause: ShapeInferError::Unregistered(_),
                ..
            }
        ));
    }

    #[test]
    fn update_shapes_checks_batch_size() {
        let mut e = add_expr();
        assert!(matches!(
            e.update_shapes(vec![Shape::from([1])]),
            Err(IrError::ArityMismatch { .. })
        ));
    }

    // ── Emitter ──

    #[derive(Debug)]
    struct NamedEmitter(String);

    impl Emitter for NamedEmitter {
        fn name(&self) -> &str {
            &self.0
        }
    }

    struct ElementwiseOnly;

    impl TargetMachine for ElementwiseOnly {
        fn name(&self) -> &str {
            "eltwise"
        }

        fn is_supported(&self, kind: &OpKind) -> bool {
            kind.is_elementwise()
        }

        fn create_emitter(&self, node: &Node) -> Option<EmitterRef> {
            Some(Rc::new(NamedEmitter(format!("emit_{}", node.name()))))
        }
    }

    #[test]
    fn init_emitter_from_target() {
        let mut e = add_expr();
        assert!(e.get_emitter().is_none());
        e.init_emitter(&ElementwiseOnly).unwrap();
        assert_eq!(e.get_emitter().unwrap().name(), "emit_add");

        let node = Node::new("mm", OpKind::MatMul).into_ref();
        let mut mm = Expression::new(
            node,
            vec![ConnectorId(0), ConnectorId(1)],
            vec![ConnectorId(2)],
            None,
        )
        .unwrap();
        assert!(matches!(
            mm.init_emitter(&ElementwiseOnly),
            Err(IrError::InvalidState(_))
        ));
        assert!(mm.get_emitter().is_none());
    }

    // ── Display ──

    #[test]
    fn display_line() {
        let mut e = add_expr();
        e.install(ExprId(2));
        e.set_loop_ids(&[0, 1]).unwrap();
        assert_eq!(e.to_string(), "e2 add = Add(c0:[], c1:[]) -> c2:[] loops=[0, 1]");
    }
}
