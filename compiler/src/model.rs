// model.rs — High-level operation graph fed to the lowering
//
// A Model is a topologically ordered list of source operations. Each node
// names its inputs as (producer node, output port) pairs that must refer to
// an earlier node.
//
// Preconditions: `from_program` takes a parsed program; `add` takes a node
//                whose inputs are already in the model.
// Postconditions: every node in a Model has exactly `input_count()` inputs,
//                 each naming an existing output of an earlier node.
// Failure modes: `add` → `ModelError`; `from_program` → error diagnostics
//                (the statement is skipped and later uses of its name are
//                not reported again).
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::ast::{AttrValue, Dim, Ident, Program, Span, Statement};
use crate::diag::{codes, Diagnostic};
use crate::node::{Node, NodeRef, OpKind};
use crate::shape::{Shape, DYNAMIC_DIM};

/// Upper bound on the `outputs` attribute of a Custom operation.
pub const MAX_CUSTOM_OUTPUTS: usize = 64;

/// Output `port` of model node `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: usize,
    pub port: usize,
}

impl OutputRef {
    pub fn new(node: usize, port: usize) -> Self {
        OutputRef { node, port }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}.{}", self.node, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("'{node}' expects {expected} inputs, got {got}")]
    InputCount {
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("'{node}' reads {input}, which is not an earlier node")]
    UnknownProducer { node: String, input: OutputRef },

    #[error("'{node}' reads output {port} of '{producer}', which has {count} outputs")]
    PortOutOfRange {
        node: String,
        producer: String,
        port: usize,
        count: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ModelNode {
    pub node: NodeRef,
    pub inputs: Vec<OutputRef>,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: Vec<ModelNode>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `node` reading `inputs`; returns its index.
    pub fn add(&mut self, node: Node, inputs: Vec<OutputRef>) -> Result<usize, ModelError> {
        if inputs.len() != node.input_count() {
            return Err(ModelError::InputCount {
                node: node.name().to_string(),
                expected: node.input_count(),
                got: inputs.len(),
            });
        }
        for input in &inputs {
            let producer = self
                .nodes
                .get(input.node)
                .ok_or_else(|| ModelError::UnknownProducer {
                    node: node.name().to_string(),
                    input: *input,
                })?;
            if input.port >= producer.node.output_count() {
                return Err(ModelError::PortOutOfRange {
                    node: node.name().to_string(),
                    producer: producer.node.name().to_string(),
                    port: input.port,
                    count: producer.node.output_count(),
                });
            }
        }
        self.nodes.push(ModelNode {
            node: node.into_ref(),
            inputs,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn nodes(&self) -> &[ModelNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Graph inputs in order of appearance.
    pub fn parameters(&self) -> impl Iterator<Item = &ModelNode> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.node.kind(), OpKind::Parameter { .. }))
    }

    /// Graph outputs in order of appearance.
    pub fn results(&self) -> impl Iterator<Item = &ModelNode> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.node.kind(), OpKind::Result))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.nodes.iter().enumerate() {
            write!(f, "n{i} {} = {}(", n.node.name(), n.node.kind())?;
            for (j, input) in n.inputs.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{input}")?;
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

// ── Conversion from the textual form ────────────────────────────────────────

/// Model built from a program, plus any diagnostics.
#[derive(Debug)]
pub struct ModelResult {
    pub model: Model,
    pub diagnostics: Vec<Diagnostic>,
}

/// What a value name is bound to.
#[derive(Debug, Clone, Copy)]
enum Binding {
    Node { index: usize, span: Span },
    /// The defining statement failed; uses are not reported again.
    Poisoned { span: Span },
}

impl Binding {
    fn span(&self) -> Span {
        match self {
            Binding::Node { span, .. } | Binding::Poisoned { span } => *span,
        }
    }
}

/// Build a Model from a parsed program.
pub fn from_program(program: &Program) -> ModelResult {
    let mut builder = ModelBuilder {
        model: Model::new(),
        names: HashMap::new(),
        diagnostics: Vec::new(),
    };
    for (i, stmt) in program.statements.iter().enumerate() {
        builder.statement(i, stmt);
    }
    log::debug!(
        "model: {} nodes, {} diagnostics",
        builder.model.len(),
        builder.diagnostics.len()
    );
    ModelResult {
        model: builder.model,
        diagnostics: builder.diagnostics,
    }
}

struct ModelBuilder {
    model: Model,
    names: HashMap<String, Binding>,
    diagnostics: Vec<Diagnostic>,
}

impl ModelBuilder {
    fn statement(&mut self, index: usize, stmt: &Statement) {
        let node = self.lower_op(index, stmt);
        let inputs = self.resolve_operands(stmt);
        let added = match (node, inputs) {
            (Some(node), Some(inputs)) => self.add_checked(node, inputs, stmt),
            _ => None,
        };
        if let Some(result) = &stmt.result {
            self.bind(result, added);
        }
    }

    fn add_checked(&mut self, node: Node, inputs: Vec<OutputRef>, stmt: &Statement) -> Option<usize> {
        let expected = node.input_count();
        let produces = node.output_count();
        match self.model.add(node, inputs) {
            Ok(i) => {
                if stmt.result.is_some() && produces == 0 {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            stmt.span,
                            format!("'{}' has no outputs; the bound name is unusable", stmt.op.name),
                        )
                        .with_code(codes::W0101),
                    );
                }
                Some(i)
            }
            Err(ModelError::InputCount { got, .. }) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        stmt.span,
                        format!("'{}' takes {expected} operands, got {got}", stmt.op.name),
                    )
                    .with_code(codes::E0105),
                );
                None
            }
            Err(ModelError::PortOutOfRange {
                producer, port, count, ..
            }) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        stmt.span,
                        format!("'{producer}' has {count} outputs; output {port} does not exist"),
                    )
                    .with_code(codes::E0106),
                );
                None
            }
            Err(e @ ModelError::UnknownProducer { .. }) => {
                self.diagnostics
                    .push(Diagnostic::error(stmt.span, e.to_string()).with_code(codes::E0103));
                None
            }
        }
    }

    fn bind(&mut self, name: &Ident, added: Option<usize>) {
        if let Some(prev) = self.names.get(&name.name) {
            self.diagnostics.push(
                Diagnostic::error(name.span, format!("value '{}' is defined twice", name.name))
                    .with_code(codes::E0104)
                    .with_related(prev.span(), "first definition"),
            );
            return;
        }
        let binding = match added {
            Some(index) => Binding::Node {
                index,
                span: name.span,
            },
            None => Binding::Poisoned { span: name.span },
        };
        self.names.insert(name.name.clone(), binding);
    }

    /// Resolve operand names. `None` if any operand is unusable.
    fn resolve_operands(&mut self, stmt: &Statement) -> Option<Vec<OutputRef>> {
        let mut inputs = Vec::with_capacity(stmt.operands.len());
        let mut ok = true;
        for operand in &stmt.operands {
            match self.names.get(&operand.name.name) {
                Some(Binding::Node { index, .. }) => {
                    inputs.push(OutputRef::new(*index, operand.port));
                }
                Some(Binding::Poisoned { .. }) => ok = false,
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            operand.name.span,
                            format!("undefined value '{}'", operand.name.name),
                        )
                        .with_code(codes::E0103)
                        .with_hint("values must be defined before they are used"),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(inputs)
    }

    /// Build the source operation for `stmt`, reporting attribute problems.
    fn lower_op(&mut self, index: usize, stmt: &Statement) -> Option<Node> {
        let name = stmt
            .result
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("{}_{index}", stmt.op.name.to_lowercase()));
        let mut attrs = Attrs::new(stmt);

        let kind = match stmt.op.name.as_str() {
            "Parameter" => OpKind::Parameter {
                shape: attrs.dims(self, "shape")?,
            },
            "Result" => OpKind::Result,
            "Scalar" => OpKind::Scalar {
                value: attrs.float(self, "value")?,
            },
            "Relu" => OpKind::Relu,
            "Exp" => OpKind::Exp,
            "Neg" => OpKind::Neg,
            "Sqrt" => OpKind::Sqrt,
            "Add" => OpKind::Add,
            "Subtract" => OpKind::Subtract,
            "Multiply" => OpKind::Multiply,
            "Divide" => OpKind::Divide,
            "Maximum" => OpKind::Maximum,
            "BroadcastMove" => OpKind::BroadcastMove {
                dim: attrs.count(self, "dim")?,
            },
            "ReduceSum" => OpKind::ReduceSum {
                axis: attrs.count(self, "axis")?,
            },
            "ReduceMax" => OpKind::ReduceMax {
                axis: attrs.count(self, "axis")?,
            },
            "MatMul" => OpKind::MatMul,
            "Load" => OpKind::Load,
            "Store" => OpKind::Store,
            "Custom" => {
                let op = attrs.ident(self, "name")?;
                let inputs = attrs.count(self, "inputs")?;
                let outputs = attrs.count(self, "outputs")?;
                if inputs != stmt.operands.len() {
                    self.diagnostics.push(
                        Diagnostic::error(
                            stmt.span,
                            format!(
                                "'Custom' declares {inputs} inputs, got {} operands",
                                stmt.operands.len()
                            ),
                        )
                        .with_code(codes::E0105),
                    );
                    return None;
                }
                if outputs > MAX_CUSTOM_OUTPUTS {
                    self.diagnostics.push(
                        Diagnostic::error(
                            stmt.span,
                            format!(
                                "'Custom' declares {outputs} outputs; at most {MAX_CUSTOM_OUTPUTS} are supported"
                            ),
                        )
                        .with_code(codes::E0102),
                    );
                    return None;
                }
                OpKind::Custom {
                    name: op,
                    inputs,
                    outputs,
                }
            }
            other => {
                self.diagnostics.push(
                    Diagnostic::error(stmt.op.span, format!("unknown operation '{other}'"))
                        .with_code(codes::E0100),
                );
                return None;
            }
        };
        attrs.report_unused(self);
        Some(Node::new(name, kind))
    }
}

/// Attribute lookup that remembers which attributes were consumed.
struct Attrs<'a> {
    stmt: &'a Statement,
    used: HashSet<&'a str>,
}

impl<'a> Attrs<'a> {
    fn new(stmt: &'a Statement) -> Self {
        Attrs {
            stmt,
            used: HashSet::new(),
        }
    }

    fn get(&mut self, b: &mut ModelBuilder, name: &str) -> Option<&'a AttrValue> {
        let stmt = self.stmt;
        match stmt.attrs.iter().find(|a| a.name.name == name) {
            Some(attr) => {
                self.used.insert(attr.name.name.as_str());
                Some(&attr.value)
            }
            None => {
                b.diagnostics.push(
                    Diagnostic::error(
                        stmt.op.span,
                        format!("'{}' requires attribute '{name}'", stmt.op.name),
                    )
                    .with_code(codes::E0101),
                );
                None
            }
        }
    }

    fn ill_typed(&self, b: &mut ModelBuilder, name: &str, value: &AttrValue, want: &str) {
        b.diagnostics.push(
            Diagnostic::error(
                value.span(),
                format!("attribute '{name}' of '{}' must be {want}", self.stmt.op.name),
            )
            .with_code(codes::E0102),
        );
    }

    fn count(&mut self, b: &mut ModelBuilder, name: &str) -> Option<usize> {
        let value = self.get(b, name)?;
        match value {
            AttrValue::Int(n, _) if *n >= 0 => usize::try_from(*n).ok(),
            _ => {
                self.ill_typed(b, name, value, "a non-negative integer");
                None
            }
        }
    }

    fn float(&mut self, b: &mut ModelBuilder, name: &str) -> Option<f64> {
        let value = self.get(b, name)?;
        match value {
            AttrValue::Int(n, _) => Some(*n as f64),
            AttrValue::Float(v, _) => Some(*v),
            _ => {
                self.ill_typed(b, name, value, "a number");
                None
            }
        }
    }

    fn ident(&mut self, b: &mut ModelBuilder, name: &str) -> Option<String> {
        let value = self.get(b, name)?;
        match value {
            AttrValue::Ident(id) => Some(id.name.clone()),
            _ => {
                self.ill_typed(b, name, value, "an identifier");
                None
            }
        }
    }

    fn dims(&mut self, b: &mut ModelBuilder, name: &str) -> Option<Shape> {
        let value = self.get(b, name)?;
        let AttrValue::Dims(dims, _) = value else {
            self.ill_typed(b, name, value, "a dimension list like [2, ?]");
            return None;
        };
        let mut out = Vec::with_capacity(dims.len());
        for dim in dims {
            match *dim {
                Dim::Fixed(n, _) if n >= 0 => out.push(usize::try_from(n).ok()?),
                Dim::Dynamic(_) => out.push(DYNAMIC_DIM),
                Dim::Fixed(_, span) => {
                    b.diagnostics.push(
                        Diagnostic::error(span, "dimensions must be non-negative")
                            .with_code(codes::E0102),
                    );
                    return None;
                }
            }
        }
        Some(Shape::new(out))
    }

    fn report_unused(&self, b: &mut ModelBuilder) {
        for attr in &self.stmt.attrs {
            if !self.used.contains(attr.name.name.as_str()) {
                b.diagnostics.push(
                    Diagnostic::warning(
                        attr.name.span,
                        format!(
                            "attribute '{}' is ignored by '{}'",
                            attr.name.name, self.stmt.op.name
                        ),
                    )
                    .with_code(codes::W0100),
                );
            }
        }
    }
}
