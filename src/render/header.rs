//! Header template rendering.
//!
//! A header view holds a template scanned left to right for `${...}`
//! tokens. Token grammar: `name`, `name|format`, or `name|format:decimals`.
//! Names resolve against computed values first, then global derived values,
//! then the global metric context; unresolved names render as the
//! missing-value placeholder. After all substitution the result gets one
//! escape-interpretation pass, so `\x1b[...m` color codes and `\t` written
//! literally in the YAML template become real control characters.

use std::collections::HashMap;

use crate::config::{ComputedSpec, FormatKind, HeaderViewDef};
use crate::engine::{CycleValues, SeriesIndex};
use crate::eval::Value;
use crate::util;

use super::format::fmt_value;

/// Renders the header line for one cycle.
pub fn render_header(
    view: &HeaderViewDef,
    idx: &SeriesIndex,
    cycle: &CycleValues,
    missing: &str,
) -> String {
    let computed = compute_values(&view.computed_values, idx);

    let template = view.template.as_str();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) => {
                let token = tail[..end].trim();
                out.push_str(&resolve_token(token, &computed, cycle, missing));
                rest = &tail[end + 1..];
            }
            None => {
                // Unterminated token: keep the raw text.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    util::interpret_escapes(&out)
}

/// Evaluates the view's computed-value specs against the current index.
///
/// An unknown builtin name is omitted entirely so the token can still fall
/// through to derived/global lookup; an unsupported op renders as unknown.
fn compute_values(
    specs: &HashMap<String, ComputedSpec>,
    idx: &SeriesIndex,
) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for (name, spec) in specs {
        match spec {
            ComputedSpec::Builtin { builtin } => {
                if builtin == "uptime" {
                    let uptime = util::format_uptime(util::read_uptime_secs());
                    out.insert(name.clone(), Value::Str(uptime));
                }
            }
            ComputedSpec::FromRows { from_rows, op } => {
                let value = if *from_rows && op == "count" {
                    Value::Num(idx.rows.len() as f64)
                } else {
                    Value::Unknown
                };
                out.insert(name.clone(), value);
            }
            ComputedSpec::FromMetric { from_metric, op } => {
                let value = if op == "count" {
                    let count = idx.by_metric.get(from_metric).map_or(0, Vec::len);
                    Value::Num(count as f64)
                } else {
                    Value::Unknown
                };
                out.insert(name.clone(), value);
            }
        }
    }
    out
}

fn resolve_token(
    token: &str,
    computed: &HashMap<String, Value>,
    cycle: &CycleValues,
    missing: &str,
) -> String {
    let (name, format, decimals) = split_token(token);
    let decimals = decimals.unwrap_or(1);

    if let Some(value) = computed.get(name) {
        return match value {
            // Computed numbers only pass through a formatter when the token
            // asks for one; a bare count renders as-is.
            Value::Num(n) => match &format {
                Some(kind) => fmt_value(Some(*n), kind, decimals, missing),
                None => n.to_string(),
            },
            Value::Str(s) => s.clone(),
            Value::Unknown => missing.to_string(),
        };
    }

    let kind = format.unwrap_or(FormatKind::Number);
    if let Some(value) = cycle.derived.global.get(name) {
        return fmt_value(value.as_num(), &kind, decimals, missing);
    }
    if let Some(value) = cycle.global.get(name).and_then(Value::as_num) {
        return fmt_value(Some(value), &kind, decimals, missing);
    }

    missing.to_string()
}

/// Splits `name|format:decimals` into its parts. A decimals field that is
/// not a number is ignored.
fn split_token(token: &str) -> (&str, Option<FormatKind>, Option<usize>) {
    match token.split_once('|') {
        None => (token, None, None),
        Some((name, rest)) => match rest.split_once(':') {
            None => (name, Some(FormatKind::from(rest.to_string())), None),
            Some((format, decimals)) => (
                name,
                Some(FormatKind::from(format.to_string())),
                decimals.trim().parse().ok(),
            ),
        },
    }
}
