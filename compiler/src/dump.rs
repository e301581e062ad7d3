// dump.rs — Serializable snapshot and fingerprint of a lowered body
//
// `IrSnapshot` is a plain-data copy of a LinearIr: expressions in execution
// order with their port descriptors, and the connector table. It backs
// `--emit json` and the SHA-256 fingerprint used to compare two lowerings.
//
// Preconditions: none.
// Postconditions: the fingerprint depends only on the snapshot contents, not
//                 on formatting.
// Failure modes: serde_json serialization errors.
// Side effects: none.

use serde::Serialize;

use crate::expression::Expression;
use crate::expression_port::ExpressionPort;
use crate::id::{ConnectorId, ExprId, LoopId};
use crate::io_expression::IoInfo;
use crate::linear_ir::LinearIr;
use crate::port::{PortDescriptor, Reg};
use crate::shape::Shape;

/// Bumped whenever the snapshot layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct IrSnapshot {
    pub version: u32,
    pub expressions: Vec<ExprSnapshot>,
    pub connectors: Vec<ConnectorSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExprSnapshot {
    pub id: Option<ExprId>,
    pub name: String,
    pub op: String,
    pub inputs: Vec<PortSnapshot>,
    pub outputs: Vec<PortSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loop_ids: Vec<LoopId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io: Option<IoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortSnapshot {
    pub connector: ConnectorId,
    pub shape: Shape,
    pub layout: Vec<usize>,
    pub subtensor: Shape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg: Option<Reg>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorSnapshot {
    pub id: ConnectorId,
    pub source: ExpressionPort,
    pub consumers: Vec<ExpressionPort>,
}

fn port(connector: ConnectorId, desc: &PortDescriptor) -> PortSnapshot {
    PortSnapshot {
        connector,
        shape: desc.shape().clone(),
        layout: desc.layout().to_vec(),
        subtensor: Shape::new(desc.subtensor().to_vec()),
        reg: desc.reg(),
    }
}

fn expression(expr: &Expression) -> ExprSnapshot {
    let (name, op) = match expr.get_node() {
        Ok(node) => (node.name().to_string(), node.kind().to_string()),
        Err(_) => (String::new(), String::new()),
    };
    ExprSnapshot {
        id: expr.id(),
        name,
        op,
        inputs: expr
            .input_port_connectors()
            .iter()
            .zip(expr.input_port_descriptors())
            .map(|(&c, d)| port(c, d))
            .collect(),
        outputs: expr
            .output_port_connectors()
            .iter()
            .zip(expr.output_port_descriptors())
            .map(|(&c, d)| port(c, d))
            .collect(),
        loop_ids: expr.get_loop_ids().to_vec(),
        io: expr.io_info(),
        emitter: expr.get_emitter().map(|e| e.name().to_string()),
    }
}

/// Take a snapshot of `ir`.
pub fn snapshot(ir: &LinearIr) -> IrSnapshot {
    IrSnapshot {
        version: SNAPSHOT_VERSION,
        expressions: ir.iter().map(expression).collect(),
        connectors: ir
            .connectors()
            .map(|(id, c)| ConnectorSnapshot {
                id,
                source: *c.source(),
                consumers: c.consumers().iter().copied().collect(),
            })
            .collect(),
    }
}

/// Pretty JSON for `--emit json`.
pub fn to_json(ir: &LinearIr) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&snapshot(ir))
}

/// SHA-256 over the compact JSON snapshot, as 64 lowercase hex characters.
pub fn fingerprint(ir: &LinearIr) -> Result<String, serde_json::Error> {
    use sha2::{Digest, Sha256};

    let canonical = serde_json::to_string(&snapshot(ir))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(bytes_to_hex(&hasher.finalize()))
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::RegInfo;

    fn lower(source: &str) -> LinearIr {
        let parsed = crate::parser::parse(source);
        let model = crate::model::from_program(&parsed.program.unwrap());
        let mut ir = LinearIr::from_model(&model.model, None).unwrap();
        ir.shape_infer(&[]).unwrap();
        ir
    }

    const SRC: &str = "x = Parameter[shape=[2, 3]]()\nr = Relu(x)\nResult(r)\n";

    #[test]
    fn snapshot_mirrors_ir() {
        let ir = lower(SRC);
        let snap = snapshot(&ir);
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert_eq!(snap.expressions.len(), 3);
        assert_eq!(snap.connectors.len(), 2);
        assert_eq!(snap.expressions[1].op, "Relu");
        assert_eq!(snap.expressions[1].outputs[0].shape, Shape::from([2, 3]));
        assert_eq!(snap.connectors[0].consumers, vec![ExpressionPort::input(ExprId(1), 0)]);
    }

    #[test]
    fn json_shape() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&lower(SRC)).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["expressions"][0]["io"]["kind"], "input");
        assert_eq!(json["expressions"][0]["outputs"][0]["shape"], serde_json::json!([2, 3]));
        assert_eq!(json["connectors"][0]["source"]["port_type"], "output");
        assert!(json["expressions"][1].get("loop_ids").is_none());
    }

    #[test]
    fn json_dynamic_dim_is_null() {
        let ir = lower("x = Parameter[shape=[?, 3]]()\nr = Relu(x)\nResult(r)\n");
        let json: serde_json::Value = serde_json::from_str(&to_json(&ir).unwrap()).unwrap();
        let port = &json["expressions"][1]["outputs"][0];
        assert_eq!(port["shape"], serde_json::json!([null, 3]));
        assert_eq!(port["subtensor"], serde_json::json!([null, 3]));
        assert!(!to_json(&ir).unwrap().contains(&usize::MAX.to_string()));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = fingerprint(&lower(SRC)).unwrap();
        let b = fingerprint(&lower(SRC)).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        let mut ir = lower(SRC);
        let relu = ir.ids()[1];
        ir.expr_mut(relu)
            .unwrap()
            .set_reg_info(RegInfo::new(vec![Some(Reg::vec(0))], vec![Some(Reg::vec(1))]))
            .unwrap();
        assert_ne!(fingerprint(&ir).unwrap(), a);
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(bytes_to_hex(&[0x00, 0xab, 0x7f]), "00ab7f");
    }
}
