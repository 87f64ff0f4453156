//! Error types for routine compilation and pipeline execution.
//!
//! Compilation errors are strict and fail fast: an unsupported statement
//! shape rejects the whole routine instead of passing through unrewritten.
//! Execution errors are caught only at the pipeline's outer guard and carry
//! the step trace accumulated before the failure.

use crate::trace::StepTrace;
use thiserror::Error;

/// Errors raised while compiling a routine into a pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The first non-annotation line is not a `def name(param):` header.
    #[error("line {line}: expected `def name(param):` header, found `{found}`")]
    BadHeader { line: usize, found: String },

    /// A pipeline routine must declare exactly one parameter.
    #[error("line {line}: a pipeline routine must declare exactly one parameter")]
    ParameterCount { line: usize },

    /// Lexical or expression-level syntax error.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A statement is none of the four recognized shapes.
    #[error("line {line}: unsupported statement shape: `{found}`")]
    UnsupportedShape { line: usize, found: String },

    /// A fork definition appeared inside another fork's body.
    #[error("line {line}: fork definitions cannot nest")]
    NestingTooDeep { line: usize },

    /// The eager-binding entry point could not resolve the declared parameter.
    #[error("declared parameter `{name}` is not bound in any supplied scope")]
    DeclaredParameterMissing { name: String },
}

/// Errors raised by an executing pipeline statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// An identifier matched no captured scope and is not an attribute of
    /// the running value.
    #[error("`{0}` matches no captured scope and is not an attribute of the running value")]
    UnresolvedCallable(String),

    /// Attribute lookup failed on an already-resolved value.
    #[error("{type_name} value has no attribute `{attr}`")]
    UnknownAttribute {
        type_name: &'static str,
        attr: String,
    },

    /// A non-function value appeared in call position.
    #[error("{0} value is not callable")]
    NotCallable(&'static str),

    /// Integer index outside the valid range (after negative normalization).
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    /// Map subscript with an unknown key.
    #[error("key `{0}` not found")]
    KeyNotFound(String),

    /// Any other runtime failure, including errors returned by invoked
    /// native functions.
    #[error("{0}")]
    Type(String),
}

/// An execution failure caught at the pipeline's outer guard.
///
/// The failing statement contributes no step; `trace` holds every step that
/// completed before it.
#[derive(Debug, Error)]
#[error("pipeline failed at line {line}: {error} ({completed} steps completed)", completed = .trace.len())]
pub struct PipeFailure {
    /// The error raised by the failing statement.
    pub error: EvalError,
    /// Source line of the failing statement in the original routine.
    pub line: usize,
    /// Steps completed before the failure, in execution order.
    pub trace: StepTrace,
}

/// Combined error for entry points that both compile and run a routine.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Run(#[from] PipeFailure),
}
