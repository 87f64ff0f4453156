//! Pipeline compiler: routine source in, invocable pipeline out.
//!
//! `compile` parses the routine, rewrites it into a routed program, and
//! packages it with the captured scope chain and options. Invocation runs
//! the program strictly in order through a fresh router; the first failing
//! statement halts the run, is logged, and is handled per the configured
//! error policy.

use crate::error::{CompileError, EvalError, PipeError, PipeFailure};
use crate::rewrite::{Op, Program, rewrite_routine};
use crate::router::Router;
use crate::scope::ScopeChain;
use crate::syntax::parse_routine;
use crate::trace::StepTrace;
use crate::value::Value;

/// Compile-time options, all off by default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipeOptions {
    /// Successful invocations return the step trace instead of the final
    /// value.
    pub steps: bool,
    /// Print the routed pseudo-source to stdout at compile time.
    pub show_code: bool,
    /// What an invocation returns when a statement fails.
    pub on_error: ErrorPolicy,
}

/// Failure handling for `Pipeline::invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ErrorPolicy {
    /// Return the failure as an error carrying the partial trace.
    #[default]
    Propagate,
    /// Contain the failure: return the partial trace as a successful
    /// outcome, whatever the `steps` option says.
    ReturnPartialTrace,
}

/// What a successful invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PipeOutcome {
    Value(Value),
    Trace(StepTrace),
}

impl PipeOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            PipeOutcome::Value(v) => Some(v),
            PipeOutcome::Trace(_) => None,
        }
    }

    pub fn into_trace(self) -> Option<StepTrace> {
        match self {
            PipeOutcome::Trace(t) => Some(t),
            PipeOutcome::Value(_) => None,
        }
    }
}

/// A compiled routine, ready to invoke. Plain data; each invocation gets
/// its own router, so concurrent invocations of clones are isolated.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    param: String,
    program: Program,
    scopes: ScopeChain,
    options: PipeOptions,
}

/// Compile routine source against a captured scope chain.
pub fn compile(
    source: &str,
    scopes: ScopeChain,
    options: PipeOptions,
) -> Result<Pipeline, CompileError> {
    let routine = parse_routine(source)?;
    let program = rewrite_routine(&routine)?;
    if options.show_code {
        println!("{}", program.render(&routine.name, &routine.param));
    }
    Ok(Pipeline {
        name: routine.name,
        param: routine.param,
        program,
        scopes,
        options,
    })
}

/// Compile and immediately invoke, binding the routine's declared
/// parameter from the supplied scope chain.
pub fn call_pipe(
    source: &str,
    scopes: ScopeChain,
    options: PipeOptions,
) -> Result<PipeOutcome, PipeError> {
    let pipeline = compile(source, scopes, options)?;
    let input = pipeline
        .scopes
        .resolve(&pipeline.param)
        .cloned()
        .ok_or_else(|| CompileError::DeclaredParameterMissing {
            name: pipeline.param.clone(),
        })?;
    Ok(pipeline.invoke(input)?)
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    /// The routed pseudo-source, as printed by the `show_code` option.
    pub fn render(&self) -> String {
        self.program.render(&self.name, &self.param)
    }

    /// Run the pipeline on one input.
    pub fn invoke(&self, input: Value) -> Result<PipeOutcome, PipeFailure> {
        let mut router = Router::new(input, &self.param, &self.scopes);
        match run_ops(&mut router, &self.program.ops) {
            Ok(()) => {
                let (value, trace) = router.into_parts();
                if self.options.steps {
                    Ok(PipeOutcome::Trace(trace))
                } else {
                    Ok(PipeOutcome::Value(value))
                }
            }
            Err((line, error)) => {
                let (_, trace) = router.into_parts();
                tracing::error!(
                    pipeline = %self.name,
                    line,
                    error = %error,
                    completed = trace.len(),
                    "pipeline step failed"
                );
                match self.options.on_error {
                    ErrorPolicy::Propagate => Err(PipeFailure { error, line, trace }),
                    ErrorPolicy::ReturnPartialTrace => Ok(PipeOutcome::Trace(trace)),
                }
            }
        }
    }
}

fn run_ops(router: &mut Router<'_>, ops: &[Op]) -> Result<(), (usize, EvalError)> {
    for op in ops {
        let line = op.line();
        match op {
            Op::RecordStep { label, expr, .. } => {
                let value = router.eval(expr).map_err(|e| (line, e))?;
                router.record_step(label, value);
            }
            Op::Dispatch { path, args, .. } => {
                router.dispatch(path, args).map_err(|e| (line, e))?;
            }
            Op::DispatchIndex { path, index, .. } => {
                router.dispatch_index(path, index).map_err(|e| (line, e))?;
            }
            Op::BindValue { expr, .. } => {
                let value = router.eval(expr).map_err(|e| (line, e))?;
                router.set_running(value);
            }
            Op::Fork {
                seed,
                result,
                body,
                ..
            } => {
                if let Some(seed) = seed {
                    match router.local(seed).cloned() {
                        Some(v) => router.set_running(v),
                        None => {
                            return Err((line, EvalError::UnresolvedCallable(seed.clone())));
                        }
                    }
                }
                run_ops(router, body)?;
                let outcome = router.running().clone();
                router.bind_local(result, outcome);
            }
        }
    }
    Ok(())
}
