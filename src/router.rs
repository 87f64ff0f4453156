//! The call router: per-invocation coordinator between rewritten
//! statements and the captured scope chain.
//!
//! A `Router` owns the running value, the step log, and the invocation
//! locals (the declared parameter plus fork results). Dispatched calls
//! resolve their callee here; the resolution decides the injection policy
//! for the whole attribute chain:
//!
//! - locals and captured scopes resolve first, and their callables get the
//!   running value injected as an implicit first argument;
//! - otherwise the name must be an attribute of the running value itself,
//!   which is already the receiver, so nothing is injected.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::rewrite::PLACEHOLDER;
use crate::scope::ScopeChain;
use crate::syntax::{Expr, Index};
use crate::trace::{Step, StepTrace};
use crate::value::{NativeResult, Value};

/// Where a bare identifier resolved, and therefore whether the running
/// value is injected when the resolved callable is invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Found in the invocation locals or the captured scope chain.
    Captured(Value),
    /// Found as an attribute of the running value.
    Receiver(Value),
}

/// A resolved-but-not-yet-invoked call target.
///
/// The injection flag is fixed when the leading identifier resolves and is
/// inherited unchanged by every chained attribute.
#[derive(Debug, Clone)]
pub struct BoundCall {
    target: Value,
    label: String,
    inject: bool,
}

impl BoundCall {
    fn new(target: Value, label: String, inject: bool) -> Self {
        Self {
            target,
            label,
            inject,
        }
    }

    /// Derive a new bound call for an attribute of the current target.
    pub fn chain(&self, attr: &str) -> Result<BoundCall, EvalError> {
        let target = self.target.attr(attr)?;
        Ok(BoundCall::new(
            target,
            format!("{}.{attr}", self.label),
            self.inject,
        ))
    }

    /// Invoke the target, injecting the running value ahead of the written
    /// arguments when the injection flag is set.
    pub fn invoke(&self, running: &Value, mut args: Vec<Value>) -> NativeResult {
        if self.inject {
            args.insert(0, running.clone());
        }
        self.target.call(&args)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn inject(&self) -> bool {
        self.inject
    }
}

struct PipelineState {
    running: Value,
    steps: Vec<Step>,
    locals: HashMap<String, Value>,
}

/// Per-invocation router over a read-only scope chain.
pub struct Router<'a> {
    state: PipelineState,
    scopes: &'a ScopeChain,
}

impl<'a> Router<'a> {
    /// Seed a fresh invocation: the input becomes the running value and is
    /// also bound under the declared parameter name.
    pub fn new(input: Value, param: &str, scopes: &'a ScopeChain) -> Self {
        let mut locals = HashMap::new();
        locals.insert(param.to_string(), input.clone());
        Self {
            state: PipelineState {
                running: input,
                steps: Vec::new(),
                locals,
            },
            scopes,
        }
    }

    pub fn running(&self) -> &Value {
        &self.state.running
    }

    /// Resolve a bare identifier: invocation locals, then the captured
    /// scope chain, then attributes of the running value.
    pub fn resolve(&self, name: &str) -> Result<Resolution, EvalError> {
        if let Some(v) = self.state.locals.get(name) {
            return Ok(Resolution::Captured(v.clone()));
        }
        if let Some(v) = self.scopes.resolve(name) {
            return Ok(Resolution::Captured(v.clone()));
        }
        match self.state.running.attr(name) {
            Ok(v) => Ok(Resolution::Receiver(v)),
            Err(_) => Err(EvalError::UnresolvedCallable(name.to_string())),
        }
    }

    /// Resolve a dotted path into a bound call. Injection is decided by
    /// the leading segment alone.
    pub fn bind(&self, path: &[String]) -> Result<BoundCall, EvalError> {
        let Some((head, rest)) = path.split_first() else {
            return Err(EvalError::UnresolvedCallable(String::new()));
        };
        let mut call = match self.resolve(head)? {
            Resolution::Captured(v) => BoundCall::new(v, head.clone(), true),
            Resolution::Receiver(v) => BoundCall::new(v, head.clone(), false),
        };
        for segment in rest {
            call = call.chain(segment)?;
        }
        Ok(call)
    }

    /// Execute a rewritten bare call: bind, evaluate the written
    /// arguments, invoke with the injection policy, record the result.
    pub fn dispatch(&mut self, path: &[String], args: &[Expr]) -> Result<(), EvalError> {
        let call = self.bind(path)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        let result = call.invoke(&self.state.running, values)?;
        self.record_step(call.label(), result);
        Ok(())
    }

    /// Execute a rewritten bare subscript of a named target. The resolved
    /// value is subscripted directly; injection does not apply.
    pub fn dispatch_index(&mut self, path: &[String], index: &Index) -> Result<(), EvalError> {
        let call = self.bind(path)?;
        let result = self.apply_index(call.target(), index)?;
        self.record_step(call.label(), result);
        Ok(())
    }

    /// Record a completed step. Unit results are dropped: the running
    /// value and the step log stay untouched.
    pub fn record_step(&mut self, label: &str, value: Value) {
        if value.is_unit() {
            return;
        }
        self.state.running = value.clone();
        self.state.steps.push(Step {
            label: label.to_string(),
            value,
        });
    }

    /// Evaluate an expression exactly as written: no injection, with the
    /// placeholder naming the current running value.
    pub fn eval(&self, expr: &Expr) -> NativeResult {
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Path(path) => self.eval_path(path),
            Expr::Call { callee, args } => {
                let target = self.eval_path(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                target.call(&values)
            }
            Expr::Index { base, index } => {
                let base = self.eval(base)?;
                self.apply_index(&base, index)
            }
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
        }
    }

    fn eval_all(&self, items: &[Expr]) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.eval(item)?);
        }
        Ok(values)
    }

    fn eval_path(&self, path: &[String]) -> NativeResult {
        let Some((head, rest)) = path.split_first() else {
            return Err(EvalError::UnresolvedCallable(String::new()));
        };
        let mut value = self.lookup_ident(head)?;
        for segment in rest {
            value = value.attr(segment)?;
        }
        Ok(value)
    }

    fn lookup_ident(&self, name: &str) -> NativeResult {
        if name == PLACEHOLDER {
            return Ok(self.state.running.clone());
        }
        if let Some(v) = self.state.locals.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.scopes.resolve(name) {
            return Ok(v.clone());
        }
        Err(EvalError::UnresolvedCallable(name.to_string()))
    }

    fn apply_index(&self, base: &Value, index: &Index) -> NativeResult {
        match index {
            Index::At(key) => {
                let key = self.eval(key)?;
                base.index(&key)
            }
            Index::Slice { start, end } => {
                let start = match start {
                    Some(e) => Some(self.eval(e)?.as_int()?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(self.eval(e)?.as_int()?),
                    None => None,
                };
                base.slice(start, end)
            }
        }
    }

    /// Rebind the running value without recording a step.
    pub(crate) fn set_running(&mut self, value: Value) {
        self.state.running = value;
    }

    /// Bind an invocation-local name (fork results).
    pub(crate) fn bind_local(&mut self, name: &str, value: Value) {
        self.state.locals.insert(name.to_string(), value);
    }

    /// Look up an invocation-local binding (fork seeds).
    pub(crate) fn local(&self, name: &str) -> Option<&Value> {
        self.state.locals.get(name)
    }

    /// Tear the invocation down into its final value and trace.
    pub fn into_parts(self) -> (Value, StepTrace) {
        (
            self.state.running,
            StepTrace::from_steps(self.state.steps),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::value::NativeFn;

    fn double_fn() -> Value {
        Value::Func(NativeFn::new("double", |args| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err(EvalError::Type("double() takes one integer".to_string())),
        }))
    }

    fn chain_with(name: &str, value: Value) -> ScopeChain {
        let mut chain = ScopeChain::new();
        chain.push_inner(Scope::new("module").with(name, value));
        chain
    }

    #[test]
    fn test_captured_resolution_injects() {
        let chain = chain_with("double", double_fn());
        let mut router = Router::new(Value::Int(3), "x", &chain);
        router
            .dispatch(&["double".to_string()], &[])
            .unwrap();
        assert_eq!(router.running(), &Value::Int(6));
    }

    #[test]
    fn test_receiver_resolution_does_not_inject() {
        let chain = ScopeChain::empty();
        let mut router = Router::new(Value::from("  hi "), "s", &chain);
        router.dispatch(&["strip".to_string()], &[]).unwrap();
        assert_eq!(router.running(), &Value::from("hi"));
    }

    #[test]
    fn test_captured_binding_beats_receiver_method() {
        // The scope's `strip` wins over the string method of the same name.
        let shadowed = Value::Func(NativeFn::new("strip", |_| Ok(Value::from("shadowed"))));
        let chain = chain_with("strip", shadowed);
        let mut router = Router::new(Value::from("  hi "), "s", &chain);
        router.dispatch(&["strip".to_string()], &[]).unwrap();
        assert_eq!(router.running(), &Value::from("shadowed"));
    }

    #[test]
    fn test_unresolved_callable() {
        let chain = ScopeChain::empty();
        let mut router = Router::new(Value::Int(1), "x", &chain);
        let err = router.dispatch(&["nope".to_string()], &[]).unwrap_err();
        assert_eq!(err, EvalError::UnresolvedCallable("nope".to_string()));
    }

    #[test]
    fn test_unit_result_skips_rebind_and_trace() {
        let log = Value::Func(NativeFn::new("log", |_| Ok(Value::Unit)));
        let chain = chain_with("log", log);
        let mut router = Router::new(Value::Int(5), "x", &chain);
        router.dispatch(&["log".to_string()], &[]).unwrap();
        assert_eq!(router.running(), &Value::Int(5));
        let (_, trace) = router.into_parts();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_injection_flag_survives_chain() {
        let mut ns = std::collections::BTreeMap::new();
        ns.insert("double".to_string(), double_fn());
        let chain = chain_with("util", Value::Map(ns));
        let mut router = Router::new(Value::Int(4), "x", &chain);
        router
            .dispatch(&["util".to_string(), "double".to_string()], &[])
            .unwrap();
        assert_eq!(router.running(), &Value::Int(8));
        let (_, trace) = router.into_parts();
        assert_eq!(trace.nth_named("util.double", 0), Some(&Value::Int(8)));
    }

    #[test]
    fn test_eval_is_as_written() {
        // `double(P)` evaluated as written passes only the explicit args.
        let chain = chain_with("double", double_fn());
        let router = Router::new(Value::Int(3), "x", &chain);
        let expr = Expr::Call {
            callee: vec!["double".to_string()],
            args: vec![Expr::Path(vec![PLACEHOLDER.to_string()])],
        };
        assert_eq!(router.eval(&expr).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_eval_sees_parameter_name() {
        let chain = ScopeChain::empty();
        let router = Router::new(Value::Int(9), "x", &chain);
        let expr = Expr::Path(vec!["x".to_string()]);
        assert_eq!(router.eval(&expr).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_dispatch_index_no_injection() {
        let table = Value::List(vec![Value::Int(10), Value::Int(20)]);
        let chain = chain_with("table", table);
        let mut router = Router::new(Value::Int(0), "x", &chain);
        router
            .dispatch_index(&["table".to_string()], &Index::At(Box::new(Expr::Int(1))))
            .unwrap();
        assert_eq!(router.running(), &Value::Int(20));
    }

    #[test]
    fn test_eval_slice_with_negative_bound() {
        let chain = ScopeChain::empty();
        let router = Router::new(Value::from("abcdef"), "s", &chain);
        let expr = Expr::Index {
            base: Box::new(Expr::Path(vec![PLACEHOLDER.to_string()])),
            index: Index::Slice {
                start: Some(Box::new(Expr::Int(-3))),
                end: None,
            },
        };
        assert_eq!(router.eval(&expr).unwrap(), Value::from("def"));
    }
}
