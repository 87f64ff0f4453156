//! # tacit-pipe
//!
//! Implicit data-flow pipelines compiled from a restricted routine grammar.
//!
//! A routine is a small, single-parameter block of statement-per-line
//! source. Each bare call-looking statement is rewritten into an explicit
//! call through a runtime router that threads an implicit running value
//! (the placeholder `P`) from statement to statement, resolves bare names
//! against an ordered chain of captured scopes, and decides whether to
//! inject the running value as a leading argument.
//!
//! ## Overview
//!
//! Compilation and execution run in stages:
//! - **Parse**: the routine text becomes a syntax tree.
//! - **Rewrite**: each statement becomes a routed operation; statements
//!   that mention `P` explicitly are kept as written, everything else is
//!   dispatched through dynamic resolution.
//! - **Invoke**: a fresh router seeds the running value from the single
//!   argument, runs the operations in order, and returns the final value
//!   or the accumulated step trace.
//!
//! ## Example
//!
//! ```
//! use tacit_pipe::{
//!     EvalError, NativeFn, PipeOptions, PipeOutcome, Scope, ScopeChain, Value, compile,
//! };
//!
//! let mut scopes = ScopeChain::new();
//! scopes.push_inner(Scope::new("module").with(
//!     "double",
//!     Value::Func(NativeFn::new("double", |args| match args {
//!         [Value::Int(n)] => Ok(Value::Int(n * 2)),
//!         _ => Err(EvalError::Type("double() takes one integer".to_string())),
//!     })),
//! ));
//!
//! let pipeline = compile(
//!     "def twice(n):\n    double()\n    double()\n",
//!     scopes,
//!     PipeOptions::default(),
//! )?;
//!
//! assert_eq!(
//!     pipeline.invoke(Value::Int(3))?,
//!     PipeOutcome::Value(Value::Int(12))
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compile;
pub mod error;
pub mod rewrite;
pub mod router;
pub mod scope;
pub mod syntax;
pub mod trace;
pub mod value;

pub use compile::{ErrorPolicy, PipeOptions, PipeOutcome, Pipeline, call_pipe, compile};
pub use error::{CompileError, EvalError, PipeError, PipeFailure};
pub use rewrite::{Op, PLACEHOLDER, Program, mentions_placeholder, rewrite_routine};
pub use router::{BoundCall, Resolution, Router};
pub use scope::{Scope, ScopeChain, builtins};
pub use syntax::{Expr, ForkDef, Index, Routine, Stmt, StmtKind, parse_routine};
pub use trace::{NamedLookup, Step, StepTrace};
pub use value::{NativeFn, NativeResult, Value};
