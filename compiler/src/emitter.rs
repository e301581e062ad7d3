// emitter.rs — Code-generation collaborator interface
//
// The IR core stores an opaque emitter per expression and never calls into
// it. Emitters are produced by a `TargetMachine` once register allocation has
// populated the expression's RegInfo.

use std::fmt;
use std::rc::Rc;

use crate::node::{Node, OpKind};

/// Opaque per-target code generator attached to one expression.
pub trait Emitter: fmt::Debug {
    fn name(&self) -> &str;
}

/// Shared handle to an emitter.
pub type EmitterRef = Rc<dyn Emitter>;

/// A code-generation target: knows which operations it can emit and builds
/// the emitter for each.
pub trait TargetMachine {
    fn name(&self) -> &str;

    fn is_supported(&self, kind: &OpKind) -> bool;

    fn create_emitter(&self, node: &Node) -> Option<EmitterRef>;
}
