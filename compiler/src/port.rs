// port.rs — Per-port metadata: shape, layout, subtensor and physical register
//
// Port descriptors are plain values owned by their Expression. Shape inference
// writes `shape`, the register allocator writes `reg`, and tiling passes write
// `layout`/`subtensor`.

use std::fmt;

use serde::Serialize;

use crate::shape::Shape;

/// Direction of a port on an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Input,
    Output,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Input => f.write_str("input"),
            PortType::Output => f.write_str("output"),
        }
    }
}

/// Physical register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegType {
    Gpr,
    Vec,
}

/// A physical register assigned by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Reg {
    pub kind: RegType,
    pub idx: usize,
}

impl Reg {
    pub fn gpr(idx: usize) -> Self {
        Reg {
            kind: RegType::Gpr,
            idx,
        }
    }

    pub fn vec(idx: usize) -> Self {
        Reg {
            kind: RegType::Vec,
            idx,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegType::Gpr => write!(f, "gpr{}", self.idx),
            RegType::Vec => write!(f, "vec{}", self.idx),
        }
    }
}

/// Register assignment of one expression: `inputs[i]` belongs to input port
/// `i`, `outputs[j]` to output port `j`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegInfo {
    pub inputs: Vec<Option<Reg>>,
    pub outputs: Vec<Option<Reg>>,
}

impl RegInfo {
    pub fn new(inputs: Vec<Option<Reg>>, outputs: Vec<Option<Reg>>) -> Self {
        RegInfo { inputs, outputs }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    shape: Shape,
    layout: Vec<usize>,
    subtensor: Vec<usize>,
    reg: Option<Reg>,
}

impl PortDescriptor {
    /// Descriptor with a planar layout and the full shape as subtensor.
    pub fn new(shape: Shape) -> Self {
        let layout = (0..shape.rank()).collect();
        let subtensor = shape.dims().to_vec();
        PortDescriptor {
            shape,
            layout,
            subtensor,
            reg: None,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Replace the shape. A rank change resets layout to planar and the
    /// subtensor to the full shape.
    pub fn set_shape(&mut self, shape: Shape) {
        if shape.rank() != self.layout.len() {
            self.layout = (0..shape.rank()).collect();
            self.subtensor = shape.dims().to_vec();
        }
        self.shape = shape;
    }

    /// Order in which the shape's dimensions are laid out in memory.
    pub fn layout(&self) -> &[usize] {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: Vec<usize>) {
        self.layout = layout;
    }

    pub fn is_planar(&self) -> bool {
        self.layout.iter().enumerate().all(|(i, &d)| i == d)
    }

    /// Block of the shape processed per loop iteration.
    pub fn subtensor(&self) -> &[usize] {
        &self.subtensor
    }

    pub fn set_subtensor(&mut self, subtensor: Vec<usize>) {
        self.subtensor = subtensor;
    }

    pub fn reg(&self) -> Option<Reg> {
        self.reg
    }

    pub fn set_reg(&mut self, reg: Option<Reg>) {
        self.reg = reg;
    }
}

impl Default for PortDescriptor {
    fn default() -> Self {
        PortDescriptor::new(Shape::default())
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shape)?;
        if !self.is_planar() {
            write!(f, " layout={:?}", self.layout)?;
        }
        if let Some(reg) = self.reg {
            write!(f, " @{reg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_is_planar_and_unassigned() {
        let d = PortDescriptor::new(Shape::from([2, 3, 4]));
        assert_eq!(d.layout(), &[0, 1, 2]);
        assert_eq!(d.subtensor(), &[2, 3, 4]);
        assert!(d.is_planar());
        assert_eq!(d.reg(), None);
    }

    #[test]
    fn display_shows_reg_and_non_planar_layout() {
        let mut d = PortDescriptor::new(Shape::from([2, 3]));
        assert_eq!(d.to_string(), "[2, 3]");
        d.set_reg(Some(Reg::vec(4)));
        d.set_layout(vec![1, 0]);
        assert_eq!(d.to_string(), "[2, 3] layout=[1, 0] @vec4");
    }

    #[test]
    fn rank_change_resets_layout() {
        let mut d = PortDescriptor::default();
        d.set_shape(Shape::from([4, 8]));
        assert_eq!(d.layout(), &[0, 1]);
        assert_eq!(d.subtensor(), &[4, 8]);

        d.set_layout(vec![1, 0]);
        d.set_subtensor(vec![4, 1]);
        d.set_shape(Shape::from([2, 8]));
        assert_eq!(d.layout(), &[1, 0]);
        assert_eq!(d.subtensor(), &[4, 1]);
    }

    #[test]
    fn set_shape_keeps_register() {
        let mut d = PortDescriptor::default();
        d.set_reg(Some(Reg::gpr(1)));
        d.set_shape(Shape::from([8]));
        assert_eq!(d.shape(), &Shape::from([8]));
        assert_eq!(d.reg(), Some(Reg::gpr(1)));
    }
}
