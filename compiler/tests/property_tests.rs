// Property-based tests for IR-core invariants.
//
// Four categories:
// 1. Generated elementwise programs lower, infer and validate cleanly
// 2. Register assignment is all-or-nothing
// 3. Loop-id lists are accepted exactly when duplicate-free
// 4. Rewiring and removal keep connector bookkeeping consistent
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use lirc::error::IrError;
use lirc::expression_port::ExpressionPort;
use lirc::id::{ConnectorId, ExprId};
use lirc::linear_ir::LinearIr;
use lirc::node::{Node, NodeRef, OpKind};
use lirc::port::{Reg, RegInfo};
use lirc::shape::{broadcast_merge, Shape};
use proptest::prelude::*;

// ── Test helpers ────────────────────────────────────────────────────────────

fn param(name: &str, shape: Shape) -> NodeRef {
    Node::new(name, OpKind::Parameter { shape }).into_ref()
}

fn op(name: &str, kind: OpKind) -> NodeRef {
    Node::new(name, kind).into_ref()
}

fn out(ir: &LinearIr, id: ExprId) -> ConnectorId {
    ir.expr(id).unwrap().get_output_port_connector(0).unwrap()
}

fn lower(source: &str) -> LinearIr {
    let parsed = lirc::parser::parse(source);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let model = lirc::model::from_program(&parsed.program.unwrap());
    assert!(model.diagnostics.is_empty(), "{:?}", model.diagnostics);
    LinearIr::from_model(&model.model, None).unwrap()
}

// ── Generators ──────────────────────────────────────────────────────────────

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(1usize..=8, 1..=4).prop_map(Shape::new)
}

/// Source text for a chain over one input: each step is a unary op on the
/// previous value or a binary op combining it with the input.
fn arb_chain_program() -> impl Strategy<Value = (String, Shape)> {
    let step = prop_oneof![
        Just("Relu"),
        Just("Exp"),
        Just("Neg"),
        Just("Add"),
        Just("Multiply"),
        Just("Maximum"),
    ];
    (arb_shape(), prop::collection::vec(step, 1..=8)).prop_map(|(shape, steps)| {
        let dims: Vec<String> = shape.dims().iter().map(|d| d.to_string()).collect();
        let mut src = format!("v0 = Parameter[shape=[{}]]()\n", dims.join(", "));
        for (i, op) in steps.iter().enumerate() {
            let prev = format!("v{i}");
            let operands = match *op {
                "Relu" | "Exp" | "Neg" => prev,
                _ => format!("{prev}, v0"),
            };
            src.push_str(&format!("v{} = {op}({operands})\n", i + 1));
        }
        src.push_str(&format!("Result(v{})\n", steps.len()));
        (src, shape)
    })
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn elementwise_chains_keep_their_shape((src, shape) in arb_chain_program()) {
        let mut ir = lower(&src);
        let results = ir.shape_infer(&[]).unwrap();
        prop_assert_eq!(results, vec![shape]);
        prop_assert!(ir.validate().is_ok());
        prop_assert!(ir.check_shapes().is_ok());
    }

    #[test]
    fn lowering_wires_every_consumer((src, _shape) in arb_chain_program()) {
        let ir = lower(&src);
        for expr in ir.iter() {
            let id = expr.id().unwrap();
            for (i, &c) in expr.input_port_connectors().iter().enumerate() {
                let conn = ir.connector(c).unwrap();
                prop_assert!(conn.found_consumer(&ExpressionPort::input(id, i)));
                let producer = conn.source().expr;
                prop_assert!(ir.position(producer).unwrap() < ir.position(id).unwrap());
            }
        }
    }

    #[test]
    fn reg_info_is_all_or_nothing(n_in in 0usize..4, n_out in 0usize..4) {
        let mut ir = LinearIr::new(None);
        let x = ir.push(param("x", Shape::from([4])), &[]).unwrap();
        let y = ir.push(param("y", Shape::from([4])), &[]).unwrap();
        let add = ir.push(op("add", OpKind::Add), &[out(&ir, x), out(&ir, y)]).unwrap();

        let expr = ir.expr_mut(add).unwrap();
        let before = expr.get_reg_info();
        let info = RegInfo::new(
            (0..n_in).map(|i| Some(Reg::vec(i))).collect(),
            (0..n_out).map(|i| Some(Reg::gpr(i))).collect(),
        );
        match expr.set_reg_info(info.clone()) {
            Ok(()) => {
                prop_assert!(n_in == 2 && n_out == 1);
                prop_assert_eq!(expr.get_reg_info(), info);
            }
            Err(e) => {
                prop_assert!(n_in != 2 || n_out != 1);
                let is_arity = matches!(e, IrError::ArityMismatch { .. });
                prop_assert!(is_arity);
                prop_assert_eq!(expr.get_reg_info(), before);
            }
        }
    }

    #[test]
    fn loop_ids_accepted_iff_unique(ids in prop::collection::vec(0usize..6, 0..6)) {
        let mut ir = LinearIr::new(None);
        let x = ir.push(param("x", Shape::from([4])), &[]).unwrap();
        let r = ir.push(op("r", OpKind::Relu), &[out(&ir, x)]).unwrap();
        let expr = ir.expr_mut(r).unwrap();
        expr.set_loop_ids(&[9]).unwrap();

        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let unique = sorted.len() == ids.len();

        let result = expr.set_loop_ids(&ids);
        prop_assert_eq!(result.is_ok(), unique);
        if unique {
            prop_assert_eq!(expr.get_loop_ids(), ids.as_slice());
        } else {
            prop_assert_eq!(expr.get_loop_ids(), &[9usize][..]);
        }
    }

    #[test]
    fn replace_input_moves_exactly_one_consumer(port in 0usize..2) {
        let mut ir = LinearIr::new(None);
        let x = ir.push(param("x", Shape::from([4])), &[]).unwrap();
        let y = ir.push(param("y", Shape::from([4])), &[]).unwrap();
        let (cx, cy) = (out(&ir, x), out(&ir, y));
        let m = ir.push(op("m", OpKind::Multiply), &[cx, cx]).unwrap();

        ir.replace_input(ExpressionPort::input(m, port), cy).unwrap();

        let other = 1 - port;
        prop_assert!(!ir.connector(cx).unwrap().found_consumer(&ExpressionPort::input(m, port)));
        prop_assert!(ir.connector(cx).unwrap().found_consumer(&ExpressionPort::input(m, other)));
        prop_assert!(ir.connector(cy).unwrap().found_consumer(&ExpressionPort::input(m, port)));
        prop_assert_eq!(ir.expr(m).unwrap().get_input_port_connector(port).unwrap(), cy);
        prop_assert_eq!(ir.expr(m).unwrap().get_input_port_connector(other).unwrap(), cx);
        prop_assert!(ir.validate().is_ok());
    }

    #[test]
    fn removed_ids_are_never_reused(rounds in 1usize..6) {
        let mut ir = LinearIr::new(None);
        let x = ir.push(param("x", Shape::from([4])), &[]).unwrap();
        let mut seen = vec![x];
        for _ in 0..rounds {
            let r = ir.push(op("r", OpKind::Relu), &[out(&ir, x)]).unwrap();
            prop_assert!(!seen.contains(&r));
            seen.push(r);
            ir.remove(r).unwrap();
            prop_assert!(ir.expr(r).is_err());
        }
        prop_assert_eq!(ir.len(), 1);
        prop_assert!(ir.connector(out(&ir, x)).unwrap().consumers().is_empty());
        prop_assert!(ir.validate().is_ok());
    }

    #[test]
    fn broadcast_is_symmetric(a in arb_shape(), b in arb_shape()) {
        let mut ab = a.clone();
        let mut ba = b.clone();
        let ok_ab = broadcast_merge(&mut ab, &b);
        let ok_ba = broadcast_merge(&mut ba, &a);
        prop_assert_eq!(ok_ab, ok_ba);
        if ok_ab {
            prop_assert_eq!(ab, ba);
        } else {
            prop_assert_eq!(ab, a);
            prop_assert_eq!(ba, b);
        }
    }
}
