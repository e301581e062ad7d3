// linear_ir.rs — Scheduled container of lowered expressions
//
// Owns every Expression and PortConnector of one lowered body. Expressions are
// kept in execution order; connectors live in an id-indexed table so that
// ports, consumers and producers refer to each other by id only.
//
// Preconditions: ids passed in were produced by this container.
// Postconditions: after every successful mutation, each connector's consumer
//                 set is exactly the set of input ports that name it, and each
//                 output connector's source is the port that owns it.
// Failure modes: stale ids → `UnknownExpression` / `UnknownConnector`;
//                structural misuse (removing a producer that still has
//                consumers, reading a value defined later) → `InvalidState`;
//                expression-level failures propagate unchanged.
// Side effects: log records at debug/trace level.

use std::fmt;

use crate::connector::PortConnector;
use crate::emitter::TargetMachine;
use crate::error::{Invariant, IrError, IrResult};
use crate::expression::Expression;
use crate::expression_port::ExpressionPort;
use crate::id::{ConnectorId, ExprId, IdAllocator};
use crate::io_expression::{IoExpression, IoKind};
use crate::model::Model;
use crate::node::NodeRef;
use crate::port::PortType;
use crate::shape::Shape;
use crate::shape_infer::ShapeInferFactory;

pub struct LinearIr {
    exprs: Vec<Option<Expression>>,
    connectors: Vec<Option<PortConnector>>,
    order: Vec<ExprId>,
    ids: IdAllocator,
    // Next ordinal per IO kind; only ever advances.
    next_input: i64,
    next_output: i64,
    factory: Option<Box<dyn ShapeInferFactory>>,
}

impl LinearIr {
    /// Empty container. `factory` is consulted before the built-in
    /// shape-inference rules for every expression created here.
    pub fn new(factory: Option<Box<dyn ShapeInferFactory>>) -> Self {
        LinearIr {
            exprs: Vec::new(),
            connectors: Vec::new(),
            order: Vec::new(),
            ids: IdAllocator::new(),
            next_input: 0,
            next_output: 0,
            factory,
        }
    }

    /// Lower every node of `model` in model order.
    pub fn from_model(model: &Model, factory: Option<Box<dyn ShapeInferFactory>>) -> IrResult<Self> {
        let mut ir = LinearIr::new(factory);
        let mut outputs: Vec<Vec<ConnectorId>> = Vec::with_capacity(model.len());
        for mnode in model.nodes() {
            let inputs = mnode
                .inputs
                .iter()
                .map(|r| {
                    outputs
                        .get(r.node)
                        .and_then(|conns| conns.get(r.port))
                        .copied()
                        .ok_or_else(|| {
                            IrError::InvalidState(format!(
                                "'{}' reads {r}, which has not been lowered",
                                mnode.node.name()
                            ))
                        })
                })
                .collect::<IrResult<Vec<_>>>()?;
            let id = ir.push(mnode.node.clone(), &inputs)?;
            outputs.push(ir.expr(id)?.output_port_connectors().to_vec());
        }
        log::debug!(
            "lowered {} nodes into {} expressions, {} connectors",
            model.len(),
            ir.len(),
            ir.connector_count()
        );
        Ok(ir)
    }

    // ── Construction ──

    /// Append an expression for `node` reading `inputs`.
    pub fn push(&mut self, node: NodeRef, inputs: &[ConnectorId]) -> IrResult<ExprId> {
        self.insert(self.order.len(), node, inputs)
    }

    /// Insert an expression for `node` at schedule position `pos`.
    ///
    /// Output connectors are created fresh. Parameters and Results become
    /// IO expressions numbered in order of creation per kind; ordinals of
    /// removed IO expressions are not reused. Every input connector must be
    /// produced by an expression scheduled before `pos`.
    pub fn insert(&mut self, pos: usize, node: NodeRef, inputs: &[ConnectorId]) -> IrResult<ExprId> {
        if pos > self.order.len() {
            return Err(IrError::InvalidState(format!(
                "insert position {pos} past the end ({} expressions)",
                self.order.len()
            )));
        }
        for &c in inputs {
            let producer = self.connector(c)?.source().expr;
            let at = self.position(producer)?;
            if at >= pos {
                return Err(IrError::InvalidState(format!(
                    "'{}' would read {c} before its producer {producer} runs",
                    node.name()
                )));
            }
        }

        let id = self.ids.alloc_expr();
        let outputs: Vec<ConnectorId> = (0..node.output_count())
            .map(|_| self.ids.alloc_connector())
            .collect();
        let io = IoKind::for_node(&node).map(|kind| (kind, *self.next_io_index(kind)));
        let factory = self.factory.as_deref();
        let mut expr = match io {
            Some((_, ordinal)) => {
                Expression::new_io(node, ordinal, inputs.to_vec(), outputs.clone(), factory)?
            }
            None => Expression::new(node, inputs.to_vec(), outputs.clone(), factory)?,
        };
        expr.install(id);
        if let Some((kind, ordinal)) = io {
            *self.next_io_index(kind) = ordinal + 1;
        }

        for (i, &c) in inputs.iter().enumerate() {
            self.connector_mut(c)?
                .add_consumer(ExpressionPort::input(id, i))?;
        }
        for (j, &c) in outputs.iter().enumerate() {
            let conn = PortConnector::new(ExpressionPort::output(id, j))?;
            self.put_connector(c, conn);
        }
        log::trace!("insert {expr} at {pos}");
        self.put_expr(id, expr);
        self.order.insert(pos, id);
        Ok(id)
    }

    fn next_io_index(&mut self, kind: IoKind) -> &mut i64 {
        match kind {
            IoKind::Input => &mut self.next_input,
            IoKind::Output => &mut self.next_output,
        }
    }

    fn put_expr(&mut self, id: ExprId, expr: Expression) {
        let slot = id.0 as usize;
        if self.exprs.len() <= slot {
            self.exprs.resize_with(slot + 1, || None);
        }
        self.exprs[slot] = Some(expr);
    }

    fn put_connector(&mut self, id: ConnectorId, conn: PortConnector) {
        let slot = id.0 as usize;
        if self.connectors.len() <= slot {
            self.connectors.resize_with(slot + 1, || None);
        }
        self.connectors[slot] = Some(conn);
    }

    // ── Removal and rewiring ──

    /// Remove expression `id`. Refused while any of its outputs is still read.
    pub fn remove(&mut self, id: ExprId) -> IrResult<()> {
        let expr = self.expr(id)?;
        for &c in expr.output_port_connectors() {
            let conn = self.connector(c)?;
            if let Some(reader) = conn.consumers().iter().next() {
                return Err(IrError::InvalidState(format!(
                    "cannot remove {id}: its output {c} is still read by {reader}"
                )));
            }
        }
        let inputs = expr.input_port_connectors().to_vec();
        let outputs = expr.output_port_connectors().to_vec();

        for (i, c) in inputs.into_iter().enumerate() {
            self.connector_mut(c)?
                .remove_consumer(&ExpressionPort::input(id, i))?;
        }
        for c in outputs {
            self.connectors[c.0 as usize] = None;
        }
        self.exprs[id.0 as usize] = None;
        self.order.retain(|&e| e != id);
        log::trace!("removed {id}");
        Ok(())
    }

    /// Rebind input `port` to read from `to`, keeping both connectors'
    /// consumer sets in step.
    pub fn replace_input(&mut self, port: ExpressionPort, to: ConnectorId) -> IrResult<()> {
        if port.port_type != PortType::Input {
            return Err(IrError::InvalidState(format!(
                "{port} is not an input port"
            )));
        }
        let old = self.expr(port.expr)?.get_input_port_connector(port.index)?;
        if old == to {
            return Ok(());
        }
        let producer = self.connector(to)?.source().expr;
        if self.position(producer)? >= self.position(port.expr)? {
            return Err(IrError::InvalidState(format!(
                "{port} would read {to} before its producer {producer} runs"
            )));
        }

        self.connector_mut(old)?.remove_consumer(&port)?;
        self.expr_mut(port.expr)?.replace_input(port.index, to)?;
        self.connector_mut(to)?.add_consumer(port)?;
        log::trace!("{port}: {old} -> {to}");
        Ok(())
    }

    // ── Lookups ──

    pub fn expr(&self, id: ExprId) -> IrResult<&Expression> {
        self.exprs
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(IrError::UnknownExpression(id))
    }

    pub fn expr_mut(&mut self, id: ExprId) -> IrResult<&mut Expression> {
        self.exprs
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(IrError::UnknownExpression(id))
    }

    pub fn connector(&self, id: ConnectorId) -> IrResult<&PortConnector> {
        self.connectors
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(IrError::UnknownConnector(id))
    }

    fn connector_mut(&mut self, id: ConnectorId) -> IrResult<&mut PortConnector> {
        self.connectors
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(IrError::UnknownConnector(id))
    }

    /// Live connectors with their ids, in id order.
    pub fn connectors(&self) -> impl Iterator<Item = (ConnectorId, &PortConnector)> {
        self.connectors
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ConnectorId(i as u32), c)))
    }

    pub fn connector_count(&self) -> usize {
        self.connectors.iter().filter(|c| c.is_some()).count()
    }

    /// Expressions in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Expression> {
        self.order
            .iter()
            .filter_map(|id| self.exprs.get(id.0 as usize).and_then(Option::as_ref))
    }

    pub fn ids(&self) -> &[ExprId] {
        &self.order
    }

    /// Schedule position of `id`.
    pub fn position(&self, id: ExprId) -> IrResult<usize> {
        self.order
            .iter()
            .position(|&e| e == id)
            .ok_or(IrError::UnknownExpression(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Graph inputs ordered by their ordinal.
    pub fn io_inputs(&self) -> Vec<IoExpression<'_>> {
        self.io_of(IoKind::Input)
    }

    /// Graph outputs ordered by their ordinal.
    pub fn io_outputs(&self) -> Vec<IoExpression<'_>> {
        self.io_of(IoKind::Output)
    }

    fn io_of(&self, kind: IoKind) -> Vec<IoExpression<'_>> {
        let mut io: Vec<_> = self
            .iter()
            .filter_map(Expression::io)
            .filter(|io| io.kind() == kind)
            .collect();
        io.sort_by_key(|io| io.index());
        io
    }

    // ── Shapes ──

    /// Re-run shape inference for one expression from the current shapes
    /// of its producers.
    pub fn update_shapes(&mut self, id: ExprId) -> IrResult<()> {
        let source_shapes = self
            .expr(id)?
            .input_port_connectors()
            .iter()
            .map(|&c| -> IrResult<Shape> {
                let src = *self.connector(c)?.source();
                Ok(src.descriptor(self)?.shape().clone())
            })
            .collect::<IrResult<Vec<Shape>>>()?;
        self.expr_mut(id)?.update_shapes(source_shapes)
    }

    /// Infer shapes over the whole body.
    ///
    /// `input_shapes[i]` overrides the shape of graph input `i`; an empty
    /// slice keeps the current ones. Every other expression is re-inferred
    /// in execution order. Returns the shape reaching each graph output.
    pub fn shape_infer(&mut self, input_shapes: &[Shape]) -> IrResult<Vec<Shape>> {
        let params: Vec<ExprId> = self
            .io_inputs()
            .iter()
            .filter_map(|io| io.expression().id())
            .collect();
        if !input_shapes.is_empty() {
            if input_shapes.len() != params.len() {
                return Err(IrError::ArityMismatch {
                    what: "graph input shapes",
                    expected: params.len(),
                    got: input_shapes.len(),
                });
            }
            for (&id, shape) in params.iter().zip(input_shapes) {
                self.expr_mut(id)?
                    .get_output_port_descriptor_mut(0)?
                    .set_shape(shape.clone());
            }
        }

        let order = self.order.clone();
        for id in order {
            if params.contains(&id) {
                continue;
            }
            self.update_shapes(id)?;
        }

        let results = self
            .io_outputs()
            .iter()
            .map(|io| {
                io.expression()
                    .get_input_port_descriptor(0)
                    .map(|d| d.shape().clone())
            })
            .collect::<IrResult<Vec<_>>>()?;
        log::debug!("shape inference over {} expressions done", self.len());
        Ok(results)
    }

    // ── Checks ──

    /// Check every expression and the connector bookkeeping around it.
    pub fn validate(&self) -> IrResult<()> {
        for &id in &self.order {
            let expr = self.expr(id)?;
            expr.validate()?;
            for (i, &c) in expr.input_port_connectors().iter().enumerate() {
                let port = ExpressionPort::input(id, i);
                if !self.connector(c)?.found_consumer(&port) {
                    return Err(IrError::violation(
                        Invariant::ConsumerBookkeeping,
                        format!("{port} reads {c} but is not among its consumers"),
                    ));
                }
            }
            for (j, &c) in expr.output_port_connectors().iter().enumerate() {
                let port = ExpressionPort::output(id, j);
                let source = *self.connector(c)?.source();
                if source != port {
                    return Err(IrError::violation(
                        Invariant::ConnectorSource,
                        format!("{c} is owned by {port} but its source is {source}"),
                    ));
                }
            }
        }
        for (c, conn) in self.connectors() {
            for consumer in conn.consumers() {
                let reads = self
                    .expr(consumer.expr)
                    .and_then(|e| e.get_input_port_connector(consumer.index))
                    .ok();
                if reads != Some(c) {
                    return Err(IrError::violation(
                        Invariant::ConsumerBookkeeping,
                        format!("{c} lists {consumer}, which does not read it"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Every consumer of a connector sees the shape its source produces.
    pub fn check_shapes(&self) -> IrResult<()> {
        for (c, conn) in self.connectors() {
            let produced = conn.source().descriptor(self)?.shape();
            for consumer in conn.consumers() {
                let seen = consumer.descriptor(self)?.shape();
                if seen != produced {
                    return Err(IrError::violation(
                        Invariant::ShapeAgreement,
                        format!("{c}: {} produces {produced} but {consumer} sees {seen}", conn.source()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Create the emitter of every expression from `target`.
    pub fn init_emitters(&mut self, target: &dyn TargetMachine) -> IrResult<()> {
        let order = self.order.clone();
        for id in order {
            self.expr_mut(id)?.init_emitter(target)?;
        }
        log::debug!("emitters created by target '{}'", target.name());
        Ok(())
    }

}

impl fmt::Debug for LinearIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearIr")
            .field("order", &self.order)
            .field("expressions", &self.len())
            .field("connectors", &self.connector_count())
            .finish()
    }
}

impl fmt::Display for LinearIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for expr in self.iter() {
            writeln!(f, "{expr}")?;
        }
        Ok(())
    }
}
