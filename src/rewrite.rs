//! Syntax rewriter: turns a parsed routine body into a routed program.
//!
//! Each bare statement becomes an explicit operation against the call
//! router. Statements that already reference the placeholder are kept
//! as-written and routed through `record_step`; everything else becomes a
//! dispatch, where the router resolves the callee and decides whether the
//! running value is injected as the first argument.

use crate::error::CompileError;
use crate::syntax::{Expr, ForkDef, Index, Routine, Stmt, StmtKind};

/// The reserved identifier naming the running value inside a routine.
pub const PLACEHOLDER: &str = "P";

/// One routed operation. Lines refer to the original routine source.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Evaluate the expression exactly as written and record the result.
    RecordStep {
        line: usize,
        label: String,
        expr: Expr,
    },
    /// Resolve the callee path dynamically and invoke it, injecting the
    /// running value when the callee came from a captured scope.
    Dispatch {
        line: usize,
        path: Vec<String>,
        args: Vec<Expr>,
    },
    /// Resolve the base path dynamically and subscript it. No injection.
    DispatchIndex {
        line: usize,
        path: Vec<String>,
        index: Index,
    },
    /// Rebind the running value directly, without recording a step.
    BindValue { line: usize, expr: Expr },
    /// Run a nested branch. A named seed re-binds the running value from an
    /// invocation local before the body; the body's final running value is
    /// bound to `result` afterwards.
    Fork {
        line: usize,
        seed: Option<String>,
        result: String,
        body: Vec<Op>,
    },
}

impl Op {
    pub fn line(&self) -> usize {
        match self {
            Op::RecordStep { line, .. }
            | Op::Dispatch { line, .. }
            | Op::DispatchIndex { line, .. }
            | Op::BindValue { line, .. }
            | Op::Fork { line, .. } => *line,
        }
    }
}

/// A fully rewritten routine body.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub ops: Vec<Op>,
}

/// True iff some call in the expression tree takes the placeholder itself
/// as a direct argument. A subscripted placeholder (`P[:2]`) does not
/// count: that form still routes through dynamic resolution.
pub fn mentions_placeholder(expr: &Expr) -> bool {
    match expr {
        Expr::Call { args, .. } => args
            .iter()
            .any(|a| is_placeholder(a) || mentions_placeholder(a)),
        Expr::Index { base, index } => {
            mentions_placeholder(base)
                || match index {
                    Index::At(e) => mentions_placeholder(e),
                    Index::Slice { start, end } => {
                        start.as_deref().is_some_and(mentions_placeholder)
                            || end.as_deref().is_some_and(mentions_placeholder)
                    }
                }
        }
        Expr::List(items) | Expr::Tuple(items) => items.iter().any(mentions_placeholder),
        _ => false,
    }
}

fn is_placeholder(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(p) if p.len() == 1 && p[0] == PLACEHOLDER)
}

/// Rewrite a parsed routine into its routed program.
pub fn rewrite_routine(routine: &Routine) -> Result<Program, CompileError> {
    let mut ops = Vec::with_capacity(routine.body.len());
    for stmt in &routine.body {
        ops.push(rewrite_stmt(stmt)?);
    }
    Ok(Program { ops })
}

fn rewrite_stmt(stmt: &Stmt) -> Result<Op, CompileError> {
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Expr(expr @ Expr::Call { callee, args }) => {
            if callee[0] == PLACEHOLDER {
                // `P.strip()` keeps receiver-method semantics as written;
                // the label is the final attribute.
                let label = callee.last().cloned().unwrap_or_default();
                Ok(Op::RecordStep {
                    line,
                    label,
                    expr: expr.clone(),
                })
            } else if mentions_placeholder(expr) {
                Ok(Op::RecordStep {
                    line,
                    label: callee.join("."),
                    expr: expr.clone(),
                })
            } else {
                Ok(Op::Dispatch {
                    line,
                    path: callee.clone(),
                    args: args.clone(),
                })
            }
        }
        StmtKind::Expr(expr @ Expr::Index { base, index }) => match base.as_ref() {
            Expr::Path(path) if path[0] == PLACEHOLDER => Ok(Op::RecordStep {
                line,
                label: "[]".to_string(),
                expr: expr.clone(),
            }),
            Expr::Path(path) => Ok(Op::DispatchIndex {
                line,
                path: path.clone(),
                index: index.clone(),
            }),
            _ => Err(CompileError::UnsupportedShape {
                line,
                found: expr.to_string(),
            }),
        },
        StmtKind::Expr(other) => Err(CompileError::UnsupportedShape {
            line,
            found: other.to_string(),
        }),
        StmtKind::Assign { target, value } => {
            if target == PLACEHOLDER {
                Ok(Op::BindValue {
                    line,
                    expr: value.clone(),
                })
            } else {
                Err(CompileError::UnsupportedShape {
                    line,
                    found: format!("{target} = {value}"),
                })
            }
        }
        StmtKind::Fork(fork) => rewrite_fork(line, fork),
    }
}

fn rewrite_fork(line: usize, fork: &ForkDef) -> Result<Op, CompileError> {
    let seed = if fork.name == "_" {
        None
    } else {
        Some(fork.name.clone())
    };
    let mut body = Vec::with_capacity(fork.body.len());
    for stmt in &fork.body {
        body.push(rewrite_stmt(stmt)?);
    }
    Ok(Op::Fork {
        line,
        seed,
        result: fork.result.clone(),
        body,
    })
}

impl Program {
    /// Render the routed program as pseudo-source, one line per operation.
    /// This is what the `show_code` option prints.
    pub fn render(&self, name: &str, param: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("def _pipe_{name}({param}):\n"));
        out.push_str(&format!("    {PLACEHOLDER} = {param}\n"));
        render_ops(&mut out, &self.ops);
        out.push_str(&format!("    return {PLACEHOLDER}\n"));
        out
    }
}

fn render_ops(out: &mut String, ops: &[Op]) {
    for op in ops {
        match op {
            Op::RecordStep { label, expr, .. } => {
                out.push_str(&format!(
                    "    {PLACEHOLDER} = _router.record_step('{label}', {expr})\n"
                ));
            }
            Op::Dispatch { path, args, .. } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                out.push_str(&format!(
                    "    {PLACEHOLDER} = _router.{}({})\n",
                    path.join("."),
                    rendered.join(", ")
                ));
            }
            Op::DispatchIndex { path, index, .. } => {
                out.push_str(&format!(
                    "    {PLACEHOLDER} = _router.{}[{index}]\n",
                    path.join(".")
                ));
            }
            Op::BindValue { expr, .. } => {
                out.push_str(&format!("    {PLACEHOLDER} = {expr}\n"));
            }
            Op::Fork { seed, result, body, .. } => {
                if let Some(seed) = seed {
                    out.push_str(&format!("    {PLACEHOLDER} = {seed}\n"));
                }
                render_ops(out, body);
                out.push_str(&format!("    {result} = {PLACEHOLDER}\n"));
            }
        }
    }
}
