//! Dynamic runtime values threaded through a pipeline.
//!
//! `Value` is the type of the running value, of every captured scope
//! binding, and of every trace entry. `Unit` is the "void" result: a call
//! returning it leaves the running value and the step log untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::EvalError;

/// Result type returned by native functions and value operations.
pub type NativeResult = Result<Value, EvalError>;

/// A named host function callable from a pipeline.
///
/// Execution is single-threaded, so the payload is `Rc`, not `Arc`.
/// Equality is pointer identity.
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    f: Rc<dyn Fn(&[Value]) -> NativeResult>,
}

impl NativeFn {
    pub fn new(name: &str, f: impl Fn(&[Value]) -> NativeResult + 'static) -> Self {
        Self {
            name: name.into(),
            f: Rc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> NativeResult {
        (self.f)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

/// A dynamic pipeline value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Void result; never rebinds the running value, never traced.
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Namespace-like value; fields shadow methods in attribute lookup.
    Map(BTreeMap<String, Value>),
    Func(NativeFn),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Func(_) => "function",
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    /// Invoke this value as a function.
    pub fn call(&self, args: &[Value]) -> NativeResult {
        match self {
            Value::Func(f) => f.call(args),
            other => Err(EvalError::NotCallable(other.type_name())),
        }
    }

    /// Resolve an attribute: map fields first, then receiver methods.
    ///
    /// Methods come back as `Func` values closed over a clone of the
    /// receiver, so an attribute chain can be invoked later without the
    /// original value.
    pub fn attr(&self, name: &str) -> NativeResult {
        if let Value::Map(fields) = self
            && let Some(v) = fields.get(name)
        {
            return Ok(v.clone());
        }
        match self.method(name) {
            Some(f) => Ok(Value::Func(f)),
            None => Err(EvalError::UnknownAttribute {
                type_name: self.type_name(),
                attr: name.to_string(),
            }),
        }
    }

    /// Integer or key subscript.
    pub fn index(&self, key: &Value) -> NativeResult {
        match (self, key) {
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let at = norm_index(*i, chars.len())?;
                Ok(Value::Str(chars[at].to_string()))
            }
            (Value::List(xs), Value::Int(i)) | (Value::Tuple(xs), Value::Int(i)) => {
                let at = norm_index(*i, xs.len())?;
                Ok(xs[at].clone())
            }
            (Value::Map(fields), Value::Str(k)) => fields
                .get(k)
                .cloned()
                .ok_or_else(|| EvalError::KeyNotFound(k.clone())),
            (base, key) => Err(EvalError::Type(format!(
                "cannot index {} value with {} key",
                base.type_name(),
                key.type_name()
            ))),
        }
    }

    /// Slice with optional bounds; negative bounds count from the end and
    /// out-of-range bounds clamp instead of failing.
    pub fn slice(&self, start: Option<i64>, end: Option<i64>) -> NativeResult {
        match self {
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (lo, hi) = clamp_range(chars.len(), start, end);
                Ok(Value::Str(chars[lo..hi].iter().collect()))
            }
            Value::List(xs) => {
                let (lo, hi) = clamp_range(xs.len(), start, end);
                Ok(Value::List(xs[lo..hi].to_vec()))
            }
            Value::Tuple(xs) => {
                let (lo, hi) = clamp_range(xs.len(), start, end);
                Ok(Value::Tuple(xs[lo..hi].to_vec()))
            }
            other => Err(EvalError::Type(format!(
                "cannot slice {} value",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn as_int(&self) -> Result<i64, EvalError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(EvalError::Type(format!(
                "expected an integer, found {}",
                other.type_name()
            ))),
        }
    }

    fn method(&self, name: &str) -> Option<NativeFn> {
        match (self, name) {
            (Value::Str(s), "strip") => {
                let s = s.clone();
                Some(NativeFn::new("strip", move |args| {
                    no_args(args, "strip")?;
                    Ok(Value::Str(s.trim().to_string()))
                }))
            }
            (Value::Str(s), "lstrip") => {
                let s = s.clone();
                Some(NativeFn::new("lstrip", move |args| {
                    no_args(args, "lstrip")?;
                    Ok(Value::Str(s.trim_start().to_string()))
                }))
            }
            (Value::Str(s), "rstrip") => {
                let s = s.clone();
                Some(NativeFn::new("rstrip", move |args| {
                    no_args(args, "rstrip")?;
                    Ok(Value::Str(s.trim_end().to_string()))
                }))
            }
            (Value::Str(s), "upper") => {
                let s = s.clone();
                Some(NativeFn::new("upper", move |args| {
                    no_args(args, "upper")?;
                    Ok(Value::Str(s.to_uppercase()))
                }))
            }
            (Value::Str(s), "lower") => {
                let s = s.clone();
                Some(NativeFn::new("lower", move |args| {
                    no_args(args, "lower")?;
                    Ok(Value::Str(s.to_lowercase()))
                }))
            }
            (Value::Str(s), "capitalize") => {
                let s = s.clone();
                Some(NativeFn::new("capitalize", move |args| {
                    no_args(args, "capitalize")?;
                    let mut chars = s.chars();
                    let out = match chars.next() {
                        Some(first) => {
                            first.to_uppercase().collect::<String>()
                                + &chars.as_str().to_lowercase()
                        }
                        None => String::new(),
                    };
                    Ok(Value::Str(out))
                }))
            }
            (Value::Str(s), "chars") => {
                let s = s.clone();
                Some(NativeFn::new("chars", move |args| {
                    no_args(args, "chars")?;
                    Ok(Value::List(
                        s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    ))
                }))
            }
            (Value::Str(s), "split") => {
                let s = s.clone();
                Some(NativeFn::new("split", move |args| {
                    let parts: Vec<Value> = match args {
                        [] => s
                            .split_whitespace()
                            .map(|p| Value::Str(p.to_string()))
                            .collect(),
                        [Value::Str(sep)] => {
                            s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                        }
                        _ => {
                            return Err(EvalError::Type(
                                "split() takes an optional string separator".to_string(),
                            ));
                        }
                    };
                    Ok(Value::List(parts))
                }))
            }
            (Value::Str(s), "replace") => {
                let s = s.clone();
                Some(NativeFn::new("replace", move |args| match args {
                    [Value::Str(old), Value::Str(new)] => {
                        Ok(Value::Str(s.replace(old.as_str(), new)))
                    }
                    _ => Err(EvalError::Type(
                        "replace() takes two string arguments".to_string(),
                    )),
                }))
            }
            (Value::List(xs), "join") | (Value::Tuple(xs), "join") => {
                let xs = xs.clone();
                Some(NativeFn::new("join", move |args| {
                    let sep = str_arg(args, "join")?;
                    join_strings(&xs, sep)
                }))
            }
            (Value::List(xs), "reverse") => {
                let xs = xs.clone();
                Some(NativeFn::new("reverse", move |args| {
                    no_args(args, "reverse")?;
                    Ok(Value::List(xs.iter().rev().cloned().collect()))
                }))
            }
            (Value::Tuple(xs), "reverse") => {
                let xs = xs.clone();
                Some(NativeFn::new("reverse", move |args| {
                    no_args(args, "reverse")?;
                    Ok(Value::Tuple(xs.iter().rev().cloned().collect()))
                }))
            }
            (Value::List(xs), "sorted") | (Value::Tuple(xs), "sorted") => {
                let xs = xs.clone();
                Some(NativeFn::new("sorted", move |args| {
                    no_args(args, "sorted")?;
                    sort_values(xs.clone())
                }))
            }
            _ => None,
        }
    }
}

/// Join string elements with a separator. Shared by the `join` method and
/// any native helper that wants the same semantics.
pub(crate) fn join_strings(items: &[Value], sep: &str) -> NativeResult {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Str(s) => parts.push(s.as_str()),
            other => {
                return Err(EvalError::Type(format!(
                    "join() expects string elements, found {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Str(parts.join(sep)))
}

/// Sort values into a list; elements must be mutually comparable.
pub(crate) fn sort_values(mut items: Vec<Value>) -> NativeResult {
    if let Some(first) = items.first() {
        for item in &items {
            if compare(first, item).is_none() {
                return Err(EvalError::Type(format!(
                    "cannot order {} and {} values",
                    first.type_name(),
                    item.type_name()
                )));
            }
        }
    }
    items.sort_by(|a, b| compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Value::List(items))
}

pub(crate) fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn norm_index(index: i64, len: usize) -> Result<usize, EvalError> {
    let len_i = len as i64;
    let at = if index < 0 { index + len_i } else { index };
    if at < 0 || at >= len_i {
        Err(EvalError::IndexOutOfBounds { index, len })
    } else {
        Ok(at as usize)
    }
}

fn clamp_range(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len_i = len as i64;
    let norm = |bound: i64| {
        let b = if bound < 0 { bound + len_i } else { bound };
        b.clamp(0, len_i) as usize
    };
    let lo = start.map(norm).unwrap_or(0);
    let hi = end.map(norm).unwrap_or(len);
    if lo > hi { (lo, lo) } else { (lo, hi) }
}

fn no_args(args: &[Value], name: &str) -> Result<(), EvalError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(EvalError::Type(format!("{name}() takes no arguments")))
    }
}

fn str_arg<'a>(args: &'a [Value], name: &str) -> Result<&'a str, EvalError> {
    match args {
        [Value::Str(s)] => Ok(s),
        _ => Err(EvalError::Type(format!(
            "{name}() takes one string argument"
        ))),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // A bare string renders without quotes; nested strings are quoted.
            Value::Str(s) => write!(f, "{s}"),
            other => write_repr(other, f),
        }
    }
}

fn write_repr(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::Unit => write!(f, "()"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(n) => write!(f, "{n}"),
        Value::Float(x) => write!(f, "{x}"),
        Value::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::List(xs) => {
            write!(f, "[")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_repr(x, f)?;
            }
            write!(f, "]")
        }
        Value::Tuple(xs) => {
            write!(f, "(")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_repr(x, f)?;
            }
            if xs.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")
        }
        Value::Map(fields) => {
            write!(f, "{{")?;
            for (i, (k, x)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "'{k}': ")?;
                write_repr(x, f)?;
            }
            write!(f, "}}")
        }
        Value::Func(nf) => write!(f, "<function {}>", nf.name()),
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self {
        Value::List(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn test_strip_and_capitalize() {
        let v = s(" location  ");
        let stripped = v.attr("strip").unwrap().call(&[]).unwrap();
        assert_eq!(stripped, s("location"));
        let capped = stripped.attr("capitalize").unwrap().call(&[]).unwrap();
        assert_eq!(capped, s("Location"));
    }

    #[test]
    fn test_capitalize_lowers_rest() {
        let v = s("hELLO");
        assert_eq!(v.attr("capitalize").unwrap().call(&[]).unwrap(), s("Hello"));
    }

    #[test]
    fn test_split_default_and_separator() {
        let v = s("a b  c");
        assert_eq!(
            v.attr("split").unwrap().call(&[]).unwrap(),
            Value::List(vec![s("a"), s("b"), s("c")])
        );
        let csv = s("a,b");
        assert_eq!(
            csv.attr("split").unwrap().call(&[s(",")]).unwrap(),
            Value::List(vec![s("a"), s("b")])
        );
    }

    #[test]
    fn test_join_rejects_non_strings() {
        let v = Value::List(vec![s("a"), Value::Int(1)]);
        let err = v.attr("join").unwrap().call(&[s(",")]).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn test_tuple_join() {
        let v = Value::Tuple(vec![s("x"), s("y")]);
        assert_eq!(v.attr("join").unwrap().call(&[s(",")]).unwrap(), s("x,y"));
    }

    #[test]
    fn test_index_negative() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(v.index(&Value::Int(-1)).unwrap(), Value::Int(3));
        assert_eq!(v.index(&Value::Int(0)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let v = Value::List(vec![Value::Int(1)]);
        assert_eq!(
            v.index(&Value::Int(5)).unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, len: 1 }
        );
    }

    #[test]
    fn test_slice_clamps() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            v.slice(None, Some(2)).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            v.slice(Some(-2), None).unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(3)])
        );
        assert_eq!(v.slice(Some(10), Some(20)).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_str_slice_is_char_based() {
        let v = s("héllo");
        assert_eq!(v.slice(Some(1), Some(3)).unwrap(), s("él"));
    }

    #[test]
    fn test_map_field_shadows_method() {
        let mut fields = BTreeMap::new();
        fields.insert("size".to_string(), Value::Int(7));
        let v = Value::Map(fields);
        assert_eq!(v.attr("size").unwrap(), Value::Int(7));
        assert!(v.attr("missing").is_err());
    }

    #[test]
    fn test_unknown_attribute() {
        let err = Value::Int(1).attr("strip").unwrap_err();
        assert_eq!(
            err,
            EvalError::UnknownAttribute {
                type_name: "int",
                attr: "strip".to_string()
            }
        );
    }

    #[test]
    fn test_not_callable() {
        let err = Value::Int(1).call(&[]).unwrap_err();
        assert_eq!(err, EvalError::NotCallable("int"));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(s("plain").to_string(), "plain");
        let mixed = Value::List(vec![Value::Int(-1), s("a")]);
        assert_eq!(mixed.to_string(), "[-1, 'a']");
        let pair = Value::Tuple(vec![s("x"), s("y")]);
        assert_eq!(pair.to_string(), "('x', 'y')");
        let single = Value::Tuple(vec![Value::Int(1)]);
        assert_eq!(single.to_string(), "(1,)");
    }

    #[test]
    fn test_native_fn_identity_eq() {
        let f = NativeFn::new("id", |args| Ok(args[0].clone()));
        let g = f.clone();
        assert_eq!(Value::Func(f.clone()), Value::Func(g));
        let h = NativeFn::new("id", |args| Ok(args[0].clone()));
        assert_ne!(Value::Func(f), Value::Func(h));
    }

    #[test]
    fn test_sorted_mixed_fails() {
        let v = Value::List(vec![Value::Int(2), s("a")]);
        assert!(v.attr("sorted").unwrap().call(&[]).is_err());
    }

    #[test]
    fn test_sorted_and_reverse() {
        let v = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(
            v.attr("sorted").unwrap().call(&[]).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            v.attr("reverse").unwrap().call(&[]).unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(1), Value::Int(3)])
        );
    }
}
