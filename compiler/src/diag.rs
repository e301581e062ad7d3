// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by the front end (parse, model construction)
// and by the pipeline when an IR-core error has to be reported to a user.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use chumsky::error::Rich;

use crate::ast::Span;
use crate::lexer::Token;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0104`, `W0100`).
///
/// Codes are `&'static str` constants defined in the `codes` module. Once
/// assigned, a code never changes meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered diagnostic codes.
pub mod codes {
    use super::DiagCode;

    // ── Syntax (E00xx) ──
    pub const E0001: DiagCode = DiagCode("E0001"); // lex or parse error

    // ── Model construction (E01xx / W01xx) ──
    pub const E0100: DiagCode = DiagCode("E0100"); // unknown operation
    pub const E0101: DiagCode = DiagCode("E0101"); // missing required attribute
    pub const E0102: DiagCode = DiagCode("E0102"); // attribute has the wrong type
    pub const E0103: DiagCode = DiagCode("E0103"); // undefined value name
    pub const E0104: DiagCode = DiagCode("E0104"); // value name defined twice
    pub const E0105: DiagCode = DiagCode("E0105"); // wrong operand count
    pub const E0106: DiagCode = DiagCode("E0106"); // output port index out of range
    pub const W0100: DiagCode = DiagCode("W0100"); // attribute ignored by this operation
    pub const W0101: DiagCode = DiagCode("W0101"); // name bound to an operation with no outputs

    // ── IR core (E02xx) ──
    pub const E0200: DiagCode = DiagCode("E0200"); // lowering into the linear IR failed
    pub const E0201: DiagCode = DiagCode("E0201"); // shape inference failed
    pub const E0202: DiagCode = DiagCode("E0202"); // IR validation failed
    pub const E0203: DiagCode = DiagCode("E0203"); // input shape overrides do not match inputs
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message)
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    /// Convert a chumsky parse (or lex) error.
    pub fn from_parse_error(err: &Rich<'_, Token, Span>) -> Self {
        Diagnostic::error(*err.span(), err.to_string()).with_code(codes::E0001)
    }

    /// Render with a `path:line:col` prefix resolved against `source`.
    pub fn render(&self, path: &str, source: &str) -> String {
        let (line, col) = line_col(source, self.span.start);
        let mut out = format!("{path}:{line}:{col}: {self}");
        for rel in &self.related_spans {
            let (l, c) = line_col(source, rel.span.start);
            out.push_str(&format!("\n  {path}:{l}:{c}: note: {}", rel.label));
        }
        out
    }
}

/// One-based line and column of byte `offset` in `source`.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
    (line, col)
}

/// True if any diagnostic is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
