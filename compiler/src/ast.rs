// AST node types for textual lowered-IR (.lir) files.
//
// One statement per line: `(IDENT '=')? IDENT attrs? '(' operands? ')'`.
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete program: operation statements in schedule order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: Span,
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Statement: (IDENT '=')? IDENT attrs? '(' operands? ')' ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Value name bound to the operation's first output, if any.
    pub result: Option<Ident>,
    pub op: Ident,
    pub attrs: Vec<Attr>,
    pub operands: Vec<Operand>,
    pub span: Span,
}

// ── attr: IDENT '=' value ──

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: Ident,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64, Span),
    Float(f64, Span),
    Ident(Ident),
    /// Bare `?`: a dynamic value.
    Dynamic(Span),
    /// `'[' dim (',' dim)* ']'` or `[]`.
    Dims(Vec<Dim>, Span),
}

impl AttrValue {
    pub fn span(&self) -> Span {
        match self {
            AttrValue::Int(_, s)
            | AttrValue::Float(_, s)
            | AttrValue::Dynamic(s)
            | AttrValue::Dims(_, s) => *s,
            AttrValue::Ident(id) => id.span,
        }
    }
}

/// One dimension in a dims literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dim {
    Fixed(i64, Span),
    Dynamic(Span),
}

// ── operand: IDENT ('.' INT)? ──

/// A reference to a named value. `port` selects an output other than the
/// first (`split.1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub name: Ident,
    pub port: usize,
}
