//! Ordered step trace accumulated while a pipeline runs.
//!
//! Every value-changing statement appends one `(label, value)` entry.
//! Duplicate labels are allowed; positional indices stay stable either way.

use std::fmt;

use crate::value::Value;

/// One completed pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub label: String,
    pub value: Value,
}

/// The steps of one invocation, in execution order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepTrace {
    steps: Vec<Step>,
}

/// Result of a by-name lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedLookup {
    /// Exactly one step carried the label.
    Single(Value),
    /// Several steps carried the label; a sub-trace of just those.
    Filtered(StepTrace),
}

impl StepTrace {
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Signed positional lookup; negative indices count from the end.
    pub fn get(&self, index: isize) -> Option<&Value> {
        let len = self.steps.len() as isize;
        let at = if index < 0 { index + len } else { index };
        if at < 0 || at >= len {
            None
        } else {
            Some(&self.steps[at as usize].value)
        }
    }

    /// Look a step up by label. A unique match yields its value directly; a
    /// repeated label yields the sub-trace of all matching steps.
    pub fn by_name(&self, name: &str) -> Option<NamedLookup> {
        let matches: Vec<&Step> = self.steps.iter().filter(|s| s.label == name).collect();
        match matches.as_slice() {
            [] => None,
            [only] => Some(NamedLookup::Single(only.value.clone())),
            many => Some(NamedLookup::Filtered(StepTrace::from_steps(
                many.iter().map(|s| (*s).clone()).collect(),
            ))),
        }
    }

    /// The value of the nth step (0-based) carrying the label.
    pub fn nth_named(&self, name: &str, occurrence: usize) -> Option<&Value> {
        self.steps
            .iter()
            .filter(|s| s.label == name)
            .nth(occurrence)
            .map(|s| &s.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.steps.iter().map(|s| (s.label.as_str(), &s.value))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Render the trace, letting the hook substitute its own text for
    /// values it wants to special-case. The hook never affects lookup.
    pub fn render_with(&self, hook: impl Fn(&Value) -> Option<String>) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            let header = format!("{i:02}: {}", step.label);
            out.push_str(&header);
            out.push('\n');
            out.push_str(&"-".repeat(header.len()));
            out.push('\n');
            match hook(&step.value) {
                Some(text) => out.push_str(&text),
                None => out.push_str(&step.value.to_string()),
            }
            out.push_str("\n\n");
        }
        out
    }
}

impl fmt::Display for StepTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with(|_| None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> StepTrace {
        StepTrace::from_steps(vec![
            Step {
                label: "strip".to_string(),
                value: Value::from("location"),
            },
            Step {
                label: "concat".to_string(),
                value: Value::from("a"),
            },
            Step {
                label: "concat".to_string(),
                value: Value::from("b"),
            },
        ])
    }

    #[test]
    fn test_get_signed() {
        let t = trace();
        assert_eq!(t.get(0), Some(&Value::from("location")));
        assert_eq!(t.get(-1), Some(&Value::from("b")));
        assert_eq!(t.get(-3), Some(&Value::from("location")));
        assert_eq!(t.get(3), None);
        assert_eq!(t.get(-4), None);
    }

    #[test]
    fn test_by_name_single_and_filtered() {
        let t = trace();
        assert_eq!(
            t.by_name("strip"),
            Some(NamedLookup::Single(Value::from("location")))
        );
        match t.by_name("concat") {
            Some(NamedLookup::Filtered(sub)) => {
                assert_eq!(sub.len(), 2);
                assert_eq!(sub.get(1), Some(&Value::from("b")));
            }
            other => panic!("expected filtered lookup, got {other:?}"),
        }
        assert_eq!(t.by_name("missing"), None);
    }

    #[test]
    fn test_nth_named() {
        let t = trace();
        assert_eq!(t.nth_named("concat", 0), Some(&Value::from("a")));
        assert_eq!(t.nth_named("concat", 1), Some(&Value::from("b")));
        assert_eq!(t.nth_named("concat", 2), None);
    }

    #[test]
    fn test_display_layout() {
        let t = StepTrace::from_steps(vec![Step {
            label: "strip".to_string(),
            value: Value::from("x"),
        }]);
        assert_eq!(t.to_string(), "00: strip\n---------\nx\n\n");
    }

    #[test]
    fn test_render_hook_substitutes() {
        let t = trace();
        let rendered = t.render_with(|v| match v {
            Value::Str(s) if s == "a" => Some("<<a>>".to_string()),
            _ => None,
        });
        assert!(rendered.contains("<<a>>"));
        assert!(rendered.contains("location"));
    }
}
