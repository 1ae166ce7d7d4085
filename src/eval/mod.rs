//! Restricted arithmetic expression evaluation.
//!
//! Derived values and column expressions in the dashboard configuration are
//! plain arithmetic over named values. The grammar is an explicit allow-list:
//!
//! | Form | Example |
//! |------|---------|
//! | Numeric literal | `100`, `0.5`, `1e6` |
//! | Name reference | `cpu`, `mem_used` |
//! | Unary | `-x`, `+x` |
//! | Binary | `+` `-` `*` `/` `//` `%` `**` |
//! | Grouping | `(a + b) * c` |
//!
//! Anything else (calls, comparisons, strings, subscripts) fails to parse.
//! Expressions are parsed once, when the configuration is compiled, and
//! evaluated once per refresh cycle per context.
//!
//! Evaluation never fails: a name that is missing or bound to a non-numeric
//! value yields `None`, any operation on `None` yields `None`, and division
//! or modulo by zero yields `None`. `None` is the "unknown" state that the
//! renderers later display as the missing-value placeholder.

mod parser;

use std::collections::HashMap;

/// A value bound to a name in an evaluation scope.
///
/// Row labels are strings in the wire format; numeric-looking labels are
/// coerced to `Num` when the row context is built so expressions can use
/// them. `Unknown` is stored explicitly (rather than the name being absent)
/// so a later resolver pass can overwrite a known value with unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    Unknown,
}

impl Value {
    /// Returns the numeric content, if any. `Str` and `Unknown` yield `None`.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerces a label string: values that parse as numbers become `Num`,
    /// everything else stays a string.
    pub fn from_label(raw: &str) -> Value {
        match raw.trim().parse::<f64>() {
            Ok(n) => Value::Num(n),
            Err(_) => Value::Str(raw.to_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        match n {
            Some(n) => Value::Num(n),
            None => Value::Unknown,
        }
    }
}

/// Layered name lookup for evaluation.
///
/// Layers are searched last-to-first, so a layer pushed later shadows
/// earlier ones. This mirrors how derived values are resolved: global
/// metrics, then global derived values, then row values, then row derived
/// values.
#[derive(Default)]
pub struct Scope<'a> {
    layers: Vec<&'a HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Adds a layer that shadows all previously pushed layers.
    pub fn push(&mut self, layer: &'a HashMap<String, Value>) {
        self.layers.push(layer);
    }

    /// Builder-style `push`.
    pub fn with(mut self, layer: &'a HashMap<String, Value>) -> Self {
        self.push(layer);
        self
    }

    /// Looks a name up across all layers.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Looks a name up and extracts its numeric content.
    pub fn num(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_num)
    }
}

/// Error for expressions that use syntax outside the allowed grammar.
#[derive(Debug, Clone)]
pub struct ExprError {
    pub expr: String,
    pub message: String,
}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid expression '{}': {}", self.expr, self.message)
    }
}

impl std::error::Error for ExprError {}

/// Operators allowed in unary position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Pos,
    Neg,
}

/// Operators allowed in binary position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Num(f64),
    Var(String),
    Unary(UnaryOp, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
}

/// A compiled arithmetic expression.
#[derive(Debug, Clone)]
pub struct Expr {
    text: String,
    root: Node,
}

impl Expr {
    /// Parses an expression, rejecting any construct outside the grammar.
    pub fn parse(text: &str) -> Result<Expr, ExprError> {
        let root = parser::parse(text)?;
        Ok(Expr {
            text: text.to_string(),
            root,
        })
    }

    /// Returns the original expression text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluates against a scope. `None` means the result is unknown.
    pub fn eval(&self, scope: &Scope<'_>) -> Option<f64> {
        eval_node(&self.root, scope)
    }
}

fn eval_node(node: &Node, scope: &Scope<'_>) -> Option<f64> {
    match node {
        Node::Num(n) => Some(*n),
        Node::Var(name) => scope.num(name),
        Node::Unary(op, inner) => {
            let v = eval_node(inner, scope)?;
            Some(match op {
                UnaryOp::Pos => v,
                UnaryOp::Neg => -v,
            })
        }
        Node::Binary(op, lhs, rhs) => {
            let a = eval_node(lhs, scope)?;
            let b = eval_node(rhs, scope)?;
            match op {
                BinOp::Add => Some(a + b),
                BinOp::Sub => Some(a - b),
                BinOp::Mul => Some(a * b),
                BinOp::Div => {
                    if b == 0.0 {
                        None
                    } else {
                        Some(a / b)
                    }
                }
                BinOp::FloorDiv => {
                    if b == 0.0 {
                        None
                    } else {
                        Some((a / b).floor())
                    }
                }
                BinOp::Mod => {
                    if b == 0.0 {
                        None
                    } else {
                        // Floored modulo: result takes the sign of the divisor.
                        Some(a - b * (a / b).floor())
                    }
                }
                BinOp::Pow => Some(a.powf(b)),
            }
        }
    }
}
