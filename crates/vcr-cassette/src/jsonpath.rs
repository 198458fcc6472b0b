//! JSONPath-lite: a tiny subset of JSONPath used only to name a subtree for
//! deletion from a parsed JSON body.
//!
//! Grammar: `$` followed by a sequence of `.name` or `[index]` steps, where
//! `name` matches `[A-Za-z_][A-Za-z0-9_]*`. No wildcards, no filters.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
}

/// A parsed JSONPath-lite expression.
#[derive(Debug, Clone)]
pub struct JsonPathLite {
    steps: Vec<Step>,
}

impl JsonPathLite {
    /// Parse an expression. Returns `None` if it doesn't start with `$` or
    /// contains a malformed step — callers treat a non-parsing expression as
    /// a silent no-op (forward compatibility), so this is not a hard error.
    pub fn parse(expr: &str) -> Option<Self> {
        let mut chars = expr.chars().peekable();
        if chars.next() != Some('$') {
            return None;
        }

        let mut steps = Vec::new();
        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() || !is_valid_name(&name) {
                        return None;
                    }
                    steps.push(Step::Key(name));
                }
                '[' => {
                    chars.next();
                    let mut digits = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_digit() {
                            digits.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if chars.next() != Some(']') || digits.is_empty() {
                        return None;
                    }
                    let idx: usize = digits.parse().ok()?;
                    steps.push(Step::Index(idx));
                }
                _ => return None,
            }
        }
        Some(Self { steps })
    }

    /// Delete the subtree selected by this path from `root`, if present.
    /// A path that doesn't resolve (missing key, out-of-range index, or a
    /// type mismatch along the way) is silently a no-op.
    pub fn delete_from(&self, root: &mut serde_json::Value) {
        if self.steps.is_empty() {
            return;
        }
        delete_recursive(root, &self.steps);
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn delete_recursive(node: &mut serde_json::Value, steps: &[Step]) {
    if steps.len() == 1 {
        match (&steps[0], node) {
            (Step::Key(name), serde_json::Value::Object(map)) => {
                map.remove(name);
            }
            (Step::Index(i), serde_json::Value::Array(arr)) => {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
            _ => {}
        }
        return;
    }

    let (first, rest) = (&steps[0], &steps[1..]);
    match (first, node) {
        (Step::Key(name), serde_json::Value::Object(map)) => {
            if let Some(child) = map.get_mut(name) {
                delete_recursive(child, rest);
            }
        }
        (Step::Index(i), serde_json::Value::Array(arr)) => {
            if let Some(child) = arr.get_mut(*i) {
                delete_recursive(child, rest);
            }
        }
        _ => {}
    }
}
