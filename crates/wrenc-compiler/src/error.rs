//! Compiler-side error taxonomy (spec §7).
//!
//! Lex/parse and semantic errors are *collected*, not propagated by `?`: a
//! [`Diagnostics`] sink accumulates every error found across a module so a
//! user sees more than the first mistake, and final emission is skipped if
//! any were recorded. Internal-invariant violations (a pass finding an IR
//! shape it should never see) are the one case that aborts immediately,
//! since by definition they indicate a compiler bug rather than a bad
//! program.

use thiserror::Error;

/// A single reported problem, tied to the module and (when known) source
/// line it came from.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub module: String,
    pub line: Option<u32>,
    pub kind: CompileError,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.module, line, self.kind),
            None => write!(f, "{}: {}", self.module, self.kind),
        }
    }
}

/// Recoverable compile-time errors (spec §7: "lex/parse" and "semantic").
/// None of these abort the pass that raised them; they are pushed onto a
/// [`Diagnostics`] sink and compilation continues to find more.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("undefined function `{0}`")]
    UndefinedFunction(String),
    #[error("undefined class `{0}`")]
    UndefinedClass(String),
    #[error("method `{signature}` already defined on class `{class}`")]
    DuplicateMethod { class: String, signature: String },
    #[error("variable `{0}` is already declared in this scope")]
    RedeclaredVariable(String),
    #[error("variable `{0}` used before it is declared")]
    UseBeforeDeclare(String),
    #[error("too many locals in function `{0}` (max 65535)")]
    TooManyLocals(String),
    #[error("too many parameters in function `{0}` (max 255)")]
    TooManyParameters(String),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
}

/// Internal-invariant violations (spec §7: "should never trigger"). Unlike
/// [`CompileError`] these abort the compile immediately via `?` — there is
/// no useful diagnostic to show a user, only a compiler bug to report.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("SSA variable {0} has no type at the end of type inference")]
    UntypedSsaVariable(String),
    #[error("backend requested data for unknown function {0}")]
    MissingBackendData(String),
    #[error("pass encountered an IR node it does not expect: {0}")]
    UnexpectedNode(String),
    #[error("basic block {0} has no terminator")]
    MissingTerminator(String),
    #[error("phi node in block with no recorded predecessors")]
    PhiWithoutPredecessors,
}

pub type InternalResult<T> = Result<T, InternalError>;

/// Accumulates [`Diagnostic`]s across an entire module compile. Mirrors the
/// "collects errors and returns a boolean success indicator per module"
/// propagation policy (spec §7) rather than failing fast on the first one.
#[derive(Debug, Default)]
pub struct Diagnostics {
    module: String,
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(module: impl Into<String>) -> Self {
        Self { module: module.into(), errors: Vec::new() }
    }

    pub fn report(&mut self, kind: CompileError) {
        self.errors.push(Diagnostic { module: self.module.clone(), line: None, kind });
    }

    pub fn report_at(&mut self, line: u32, kind: CompileError) {
        self.errors.push(Diagnostic { module: self.module.clone(), line: Some(line), kind });
    }

    /// Spec §7: "final emission is skipped if any error was recorded".
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diagnostics_is_ok() {
        let d = Diagnostics::new("main");
        assert!(d.ok());
    }

    #[test]
    fn reported_error_flips_ok_to_false() {
        let mut d = Diagnostics::new("main");
        d.report(CompileError::UndefinedVariable("x".into()));
        assert!(!d.ok());
        assert_eq!(d.errors().len(), 1);
    }

    #[test]
    fn accumulates_multiple_errors_without_aborting() {
        let mut d = Diagnostics::new("main");
        d.report_at(3, CompileError::UndefinedVariable("x".into()));
        d.report_at(7, CompileError::RedeclaredVariable("y".into()));
        assert_eq!(d.errors().len(), 2);
        assert_eq!(d.errors()[0].line, Some(3));
    }
}
