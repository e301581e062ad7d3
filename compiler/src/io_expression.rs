// io_expression.rs — Graph boundary expressions
//
// Parameters and Results lower to IO expressions: ordinary expressions that
// additionally remember their role and their ordinal among the graph's inputs
// or outputs, so the container can reproduce the model's boundary order.

use std::fmt;

use serde::Serialize;

use crate::expression::Expression;
use crate::node::{Node, OpKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoKind {
    Input,
    Output,
}

impl IoKind {
    /// Role of a boundary operation; `None` for anything else.
    pub fn for_node(node: &Node) -> Option<IoKind> {
        match node.kind() {
            OpKind::Parameter { .. } => Some(IoKind::Input),
            OpKind::Result => Some(IoKind::Output),
            _ => None,
        }
    }
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoKind::Input => f.write_str("input"),
            IoKind::Output => f.write_str("output"),
        }
    }
}

/// Role and ordinal of an IO expression. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoInfo {
    pub index: i64,
    pub kind: IoKind,
}

/// Borrowed view of an expression known to be a graph boundary.
#[derive(Debug, Clone, Copy)]
pub struct IoExpression<'a> {
    expr: &'a Expression,
    info: IoInfo,
}

impl<'a> IoExpression<'a> {
    pub(crate) fn new(expr: &'a Expression, info: IoInfo) -> Self {
        IoExpression { expr, info }
    }

    pub fn index(&self) -> i64 {
        self.info.index
    }

    pub fn kind(&self) -> IoKind {
        self.info.kind
    }

    pub fn expression(&self) -> &'a Expression {
        self.expr
    }
}
