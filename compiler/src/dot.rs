// dot.rs — Graphviz DOT output for a lowered body
//
// Transforms a LinearIr into DOT format suitable for rendering with `dot`.
// One node per expression in execution order, one edge per
// (connector, consumer) pair labelled with the connector and its shape.
//
// Preconditions: `ir` passes `LinearIr::validate`.
// Postconditions: returns a valid DOT string; output is deterministic.
// Failure modes: none (pure string formatting; dangling ids are skipped).
// Side effects: none.

use std::fmt::Write;

use crate::expression::Expression;
use crate::io_expression::IoKind;
use crate::linear_ir::LinearIr;

/// Emit the lowered body as a Graphviz DOT string.
pub fn emit_dot(ir: &LinearIr) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph lir {{").unwrap();
    writeln!(buf, "    rankdir=TB;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    writeln!(buf).unwrap();

    for expr in ir.iter() {
        let Some(id) = expr.id() else { continue };
        writeln!(buf, "    {id} [{}];", node_attrs(expr)).unwrap();
    }

    writeln!(buf).unwrap();
    for (c, conn) in ir.connectors() {
        let src = conn.source();
        let shape = src
            .descriptor(ir)
            .map(|d| d.shape().to_string())
            .unwrap_or_default();
        for consumer in conn.consumers() {
            writeln!(
                buf,
                "    {} -> {} [label=\"{c} {shape}\", taillabel=\"{}\", headlabel=\"{}\"];",
                src.expr, consumer.expr, src.index, consumer.index
            )
            .unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn node_attrs(expr: &Expression) -> String {
    let (shape, color) = match expr.io_info().map(|io| io.kind) {
        Some(IoKind::Input) => ("invhouse", "lightsalmon"),
        Some(IoKind::Output) => ("house", "lightsalmon"),
        None => ("box", "lightblue"),
    };
    format!(
        "shape={shape}, style=filled, fillcolor={color}, label=\"{}\"",
        escape(&node_label(expr))
    )
}

fn node_label(expr: &Expression) -> String {
    let mut label = match expr.get_node() {
        Ok(node) => format!("{}\n{}", node.name(), node.kind()),
        Err(_) => "<null>".to_string(),
    };
    if !expr.get_loop_ids().is_empty() {
        write!(label, "\nloops {:?}", expr.get_loop_ids()).unwrap();
    }
    label
}

/// Escape a label for a double-quoted DOT string.
fn escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ───────────────────────────────────────────────────────────────────
