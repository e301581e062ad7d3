// lirc — Lowered IR core
//
// Library root. The IR core (port descriptors, connectors, expressions and
// the linear container) sits below a small text front end and pass pipeline.

// ── IR core ──
pub mod connector;
pub mod emitter;
pub mod error;
pub mod expression;
pub mod expression_port;
pub mod id;
pub mod io_expression;
pub mod linear_ir;
pub mod node;
pub mod port;
pub mod shape;
pub mod shape_infer;

// ── Front end ──
pub mod ast;
pub mod diag;
pub mod lexer;
pub mod model;
pub mod parser;

// ── Driver and output ──
pub mod dot;
pub mod dump;
pub mod pass;
pub mod pipeline;
