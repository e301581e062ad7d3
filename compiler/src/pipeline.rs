// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId. IR-core errors are turned into diagnostics here so every
// failure reaches the user the same way.
//
// Preconditions: `CompilationState.program` is set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete after each pass; log records; verbose
//               timing on stderr.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::ast::{Program, Span};
use crate::diag::{codes, has_errors, Diagnostic};
use crate::error::IrError;
use crate::linear_ir::LinearIr;
use crate::model::Model;
use crate::pass::{required_passes, PassId};
use crate::shape::Shape;
use crate::shape_infer::ShapeInferFactory;

// ── Options ────────────────────────────────────────────────────────────────

/// Output produced by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmitTarget {
    /// Textual dump of the lowered body.
    Lir,
    /// JSON snapshot.
    Json,
    /// Graphviz DOT.
    Dot,
    /// SHA-256 of the JSON snapshot.
    Fingerprint,
    /// The high-level model before lowering.
    Model,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub emit: EmitTarget,
    /// Overrides for the graph input shapes, by ordinal. Empty keeps the
    /// declared shapes.
    pub input_shapes: Vec<Shape>,
    pub validate: bool,
    pub verbose: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            emit: EmitTarget::Lir,
            input_shapes: Vec::new(),
            validate: true,
            verbose: false,
        }
    }
}

impl PipelineOptions {
    /// Last pass needed for the configured output.
    pub fn terminal(&self) -> PassId {
        match self.emit {
            EmitTarget::Model => PassId::BuildModel,
            _ if self.validate => PassId::Validate,
            _ => PassId::InferShapes,
        }
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub factory: Option<Box<dyn ShapeInferFactory>>,
    pub model: Option<Model>,
    pub ir: Option<LinearIr>,
    pub result_shapes: Option<Vec<Shape>>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            factory: None,
            model: None,
            ir: None,
            result_shapes: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }

    /// Consult `factory` before the built-in shape rules when lowering.
    pub fn with_factory(mut self, factory: Box<dyn ShapeInferFactory>) -> Self {
        self.factory = Some(factory);
        self
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// A pass produced error-level diagnostics. They are available in
/// `CompilationState.diagnostics`.
#[derive(Debug, Error)]
#[error("pass '{failing_pass}' failed")]
pub struct PipelineError {
    pub failing_pass: PassId,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Source span of the statement that defined operation `name`, falling
/// back to the whole program.
fn span_of(program: &Program, name: &str) -> Span {
    program
        .statements
        .iter()
        .enumerate()
        .find(|(i, s)| match &s.result {
            Some(r) => r.name == name,
            None => format!("{}_{i}", s.op.name.to_lowercase()) == name,
        })
        .map(|(_, s)| s.span)
        .unwrap_or(program.span)
}

/// Report an IR-core error as a diagnostic.
pub fn ir_diagnostic(program: &Program, err: &IrError) -> Diagnostic {
    match err {
        IrError::ShapeInferenceFailure { node, .. } => {
            Diagnostic::error(span_of(program, node), err.to_string()).with_code(codes::E0201)
        }
        IrError::InvariantViolation { .. } => {
            Diagnostic::error(program.span, err.to_string()).with_code(codes::E0202)
        }
        IrError::ArityMismatch {
            what: "graph input shapes",
            ..
        } => Diagnostic::error(program.span, err.to_string())
            .with_code(codes::E0203)
            .with_hint("pass one --input-shape per Parameter, in order"),
        _ => Diagnostic::error(program.span, err.to_string()).with_code(codes::E0200),
    }
}

fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    let ms = elapsed.as_secs_f64() * 1000.0;
    log::debug!("{pass_id} complete, {ms:.1}ms");
    if verbose {
        eprintln!("lirc: {pass_id} complete, {ms:.1}ms");
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = match pass_id {
            PassId::BuildModel => {
                let result = crate::model::from_program(&state.program);
                state.model = Some(result.model);
                result.diagnostics
            }
            PassId::Lower => {
                let factory = state.factory.take();
                let lowered = match &state.model {
                    Some(model) => LinearIr::from_model(model, factory),
                    None => Err(IrError::UninitializedState("no model to lower".into())),
                };
                match lowered {
                    Ok(ir) => {
                        state.ir = Some(ir);
                        Vec::new()
                    }
                    Err(e) => vec![ir_diagnostic(&state.program, &e)],
                }
            }
            PassId::InferShapes => {
                let inferred = match state.ir.as_mut() {
                    Some(ir) => ir.shape_infer(&options.input_shapes),
                    None => Err(IrError::UninitializedState("no linear IR".into())),
                };
                match inferred {
                    Ok(shapes) => {
                        state.result_shapes = Some(shapes);
                        Vec::new()
                    }
                    Err(e) => vec![ir_diagnostic(&state.program, &e)],
                }
            }
            PassId::Validate => {
                let checked = match state.ir.as_ref() {
                    Some(ir) => ir.validate().and_then(|()| ir.check_shapes()),
                    None => Err(IrError::UninitializedState("no linear IR".into())),
                };
                match checked {
                    Ok(()) => Vec::new(),
                    Err(e) => vec![ir_diagnostic(&state.program, &e)],
                }
            }
        };
        let elapsed = t.elapsed();
        finish_pass(
            state,
            pass_id,
            diags,
            elapsed,
            options.verbose,
            &mut on_pass_complete,
        )?;
    }
    Ok(())
}

/// Render the configured output from a state the pipeline has populated.
pub fn render(state: &CompilationState, emit: EmitTarget) -> Result<String, RenderError> {
    let ir = || state.ir.as_ref().ok_or(RenderError::Missing("linear IR"));
    Ok(match emit {
        EmitTarget::Model => state
            .model
            .as_ref()
            .ok_or(RenderError::Missing("model"))?
            .to_string(),
        EmitTarget::Lir => ir()?.to_string(),
        EmitTarget::Json => crate::dump::to_json(ir()?)? + "\n",
        EmitTarget::Dot => crate::dot::emit_dot(ir()?),
        EmitTarget::Fingerprint => crate::dump::fingerprint(ir()?)? + "\n",
    })
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0} was not produced")]
    Missing(&'static str),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagCode;

    fn state_for(source: &str) -> CompilationState {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        CompilationState::new(parsed.program.unwrap())
    }

    fn run(source: &str, options: &PipelineOptions) -> (CompilationState, Result<(), PipelineError>) {
        let mut state = state_for(source);
        let result = run_pipeline(&mut state, options.terminal(), options, |_, _| {});
        (state, result)
    }

    fn first_code(state: &CompilationState) -> Option<DiagCode> {
        state.diagnostics.iter().find_map(|d| d.code)
    }

    const SRC: &str = "x = Parameter[shape=[2, 3]]()\ny = Parameter[shape=[3]]()\ns = Add(x, y)\nResult(s)\n";

    #[test]
    fn full_pipeline_populates_artifacts() {
        let (state, result) = run(SRC, &PipelineOptions::default());
        assert!(result.is_ok());
        assert!(!state.has_error);
        assert_eq!(state.result_shapes, Some(vec![Shape::from([2, 3])]));
        assert_eq!(state.ir.as_ref().map(LinearIr::len), Some(4));
    }

    #[test]
    fn model_target_stops_early() {
        let options = PipelineOptions {
            emit: EmitTarget::Model,
            ..PipelineOptions::default()
        };
        let (state, result) = run(SRC, &options);
        assert!(result.is_ok());
        assert!(state.model.is_some());
        assert!(state.ir.is_none());
    }

    #[test]
    fn callback_sees_each_pass_in_order() {
        let mut state = state_for(SRC);
        let mut seen = Vec::new();
        let options = PipelineOptions::default();
        run_pipeline(&mut state, PassId::Validate, &options, |p, _| seen.push(p)).unwrap();
        assert_eq!(
            seen,
            vec![PassId::BuildModel, PassId::Lower, PassId::InferShapes, PassId::Validate]
        );
    }

    #[test]
    fn model_errors_stop_before_lowering() {
        let (state, result) = run("x = Relu(nope)\n", &PipelineOptions::default());
        assert_eq!(result.unwrap_err().failing_pass, PassId::BuildModel);
        assert!(state.ir.is_none());
        assert_eq!(first_code(&state), Some(codes::E0103));
    }

    #[test]
    fn shape_failure_points_at_statement() {
        let src = "x = Parameter[shape=[2, 3]]()\ny = Parameter[shape=[4]]()\ns = Add(x, y)\nResult(s)\n";
        let (state, result) = run(src, &PipelineOptions::default());
        assert_eq!(result.unwrap_err().failing_pass, PassId::InferShapes);
        let d = &state.diagnostics[0];
        assert_eq!(d.code, Some(codes::E0201));
        assert_eq!(&src[d.span.start..d.span.end], "s = Add(x, y)");
    }

    #[test]
    fn input_shape_overrides() {
        let options = PipelineOptions {
            input_shapes: vec![Shape::from([5, 4]), Shape::from([1])],
            ..PipelineOptions::default()
        };
        let (state, result) = run(SRC, &options);
        assert!(result.is_ok());
        assert_eq!(state.result_shapes, Some(vec![Shape::from([5, 4])]));

        let options = PipelineOptions {
            input_shapes: vec![Shape::from([5, 4])],
            ..PipelineOptions::default()
        };
        let (state, _) = run(SRC, &options);
        assert_eq!(first_code(&state), Some(codes::E0203));
    }

    #[test]
    fn custom_op_without_factory_fails_inference() {
        let src = "x = Parameter[shape=[8]]()\nc = Custom[name=Split, inputs=1, outputs=2](x)\nResult(c)\n";
        let (state, result) = run(src, &PipelineOptions::default());
        assert_eq!(result.unwrap_err().failing_pass, PassId::InferShapes);
        assert!(state.diagnostics[0].message.contains("'c'"));
    }

    #[test]
    fn render_targets() {
        let (state, _) = run(SRC, &PipelineOptions::default());
        assert!(render(&state, EmitTarget::Lir).unwrap().starts_with("e0 x = Parameter"));
        assert!(render(&state, EmitTarget::Dot).unwrap().starts_with("digraph lir"));
        assert_eq!(render(&state, EmitTarget::Fingerprint).unwrap().trim().len(), 64);
        assert!(render(&state, EmitTarget::Json).unwrap().contains("\"version\": 1"));
        assert!(render(&state, EmitTarget::Model).unwrap().starts_with("n0 x"));
    }

    #[test]
    fn render_without_ir() {
        let state = state_for(SRC);
        assert!(matches!(
            render(&state, EmitTarget::Lir),
            Err(RenderError::Missing(_))
        ));
    }
}
