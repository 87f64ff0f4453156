//! Captured scope chain and the built-in scope.
//!
//! Identifier resolution consults an explicit, ordered list of named
//! scopes, innermost first. The default chain ends with the built-in
//! scope, whose functions all take the injected running value as their
//! first argument.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::value::{NativeFn, Value, join_strings, sort_values};

/// One named lexical environment.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    name: String,
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    /// Builder form of [`bind`](Scope::bind).
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Ordered list of scopes consulted at resolution time, innermost first.
#[derive(Clone, Debug)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl ScopeChain {
    /// A chain containing only the built-in scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![builtins()],
        }
    }

    /// A chain with no scopes at all, built-ins included.
    pub fn empty() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Add a scope ahead of every existing one.
    pub fn push_inner(&mut self, scope: Scope) {
        self.scopes.insert(0, scope);
    }

    /// Resolve a name against the chain, innermost scope first.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().find_map(|s| s.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin(name: &'static str, f: impl Fn(&Value) -> Result<Value, EvalError> + 'static) -> Value {
    Value::Func(NativeFn::new(name, move |args| match args {
        [value] => f(value),
        _ => Err(EvalError::Type(format!("{name}() takes one argument"))),
    }))
}

/// The built-in scope: standard functions written for injection, receiving
/// the running value as their single argument.
pub fn builtins() -> Scope {
    let mut scope = Scope::new("builtins");
    scope.bind(
        "len",
        builtin("len", |v| {
            let n = match v {
                Value::Str(s) => s.chars().count(),
                Value::List(xs) | Value::Tuple(xs) => xs.len(),
                Value::Map(fields) => fields.len(),
                other => {
                    return Err(EvalError::Type(format!(
                        "len() does not apply to {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(n as i64))
        }),
    );
    scope.bind("str", builtin("str", |v| Ok(Value::Str(v.to_string()))));
    scope.bind(
        "list",
        builtin("list", |v| Ok(Value::List(elements(v, "list")?))),
    );
    scope.bind(
        "sum",
        builtin("sum", |v| {
            let mut int_total = 0i64;
            let mut float_total = 0f64;
            let mut saw_float = false;
            for item in elements(v, "sum")? {
                match item {
                    Value::Int(n) => int_total += n,
                    Value::Float(x) => {
                        saw_float = true;
                        float_total += x;
                    }
                    other => {
                        return Err(EvalError::Type(format!(
                            "sum() expects numbers, found {}",
                            other.type_name()
                        )));
                    }
                }
            }
            if saw_float {
                Ok(Value::Float(float_total + int_total as f64))
            } else {
                Ok(Value::Int(int_total))
            }
        }),
    );
    scope.bind(
        "reversed",
        builtin("reversed", |v| match v {
            Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
            Value::List(xs) => Ok(Value::List(xs.iter().rev().cloned().collect())),
            Value::Tuple(xs) => Ok(Value::Tuple(xs.iter().rev().cloned().collect())),
            other => Err(EvalError::Type(format!(
                "reversed() does not apply to {}",
                other.type_name()
            ))),
        }),
    );
    scope.bind(
        "sorted",
        builtin("sorted", |v| sort_values(elements(v, "sorted")?)),
    );
    scope.bind(
        "join",
        Value::Func(NativeFn::new("join", |args| match args {
            [Value::List(xs), Value::Str(sep)] | [Value::Tuple(xs), Value::Str(sep)] => {
                join_strings(xs, sep)
            }
            _ => Err(EvalError::Type(
                "join() takes a sequence and a string separator".to_string(),
            )),
        })),
    );
    scope
}

fn elements(v: &Value, caller: &str) -> Result<Vec<Value>, EvalError> {
    match v {
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::List(xs) | Value::Tuple(xs) => Ok(xs.clone()),
        other => Err(EvalError::Type(format!(
            "{caller}() expects a sequence, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order_innermost_first() {
        let mut chain = ScopeChain::new();
        chain.push_inner(Scope::new("module").with("x", Value::Int(1)));
        chain.push_inner(Scope::new("local").with("x", Value::Int(2)));
        assert_eq!(chain.resolve("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_builtins_present_by_default() {
        let chain = ScopeChain::new();
        for name in ["len", "str", "list", "sum", "reversed", "sorted"] {
            assert!(chain.resolve(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn test_empty_chain_has_nothing() {
        assert!(ScopeChain::empty().resolve("len").is_none());
    }

    #[test]
    fn test_len_builtin() {
        let chain = ScopeChain::new();
        let len = chain.resolve("len").unwrap().clone();
        assert_eq!(
            len.call(&[Value::Str("héllo".to_string())]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            len.call(&[Value::List(vec![Value::Int(1)])]).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_sum_promotes_to_float() {
        let chain = ScopeChain::new();
        let sum = chain.resolve("sum").unwrap().clone();
        let ints = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(sum.call(&[ints]).unwrap(), Value::Int(3));
        let mixed = Value::List(vec![Value::Int(1), Value::Float(0.5)]);
        assert_eq!(sum.call(&[mixed]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_list_of_string_chars() {
        let chain = ScopeChain::new();
        let list = chain.resolve("list").unwrap().clone();
        assert_eq!(
            list.call(&[Value::Str("ab".to_string())]).unwrap(),
            Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string())
            ])
        );
    }
}
