//! Textual rewrite passes over the raw configuration tree.
//!
//! These are plain string replacements, not a templating engine. The color
//! pass runs before typed deserialization so every string leaf of the
//! document (templates, column values, style prefixes) can carry
//! `${colors.path.to.value}` macros. Query variables are substituted later
//! and only inside query strings: render tokens share the `${...}` syntax,
//! so a tree-wide variable pass would clobber them.

use std::collections::HashMap;

use serde_yaml::Value;

/// Resolves `${colors.path}` macros across all string leaves of the tree.
///
/// The lookup table is the document's own `colors:` mapping. A macro whose
/// path does not resolve to a string is left verbatim.
pub(super) fn apply_color_macros(tree: &mut Value) {
    let colors = match tree.get("colors") {
        Some(colors) => colors.clone(),
        None => return,
    };
    rewrite_strings(tree, &|s| replace_color_tokens(s, &colors));
}

/// Replaces `${name}` with the named variable's text, for every variable.
pub fn substitute_vars(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (name, replacement) in vars {
        out = out.replace(&format!("${{{}}}", name), replacement);
    }
    out
}

fn rewrite_strings(node: &mut Value, rewrite: &dyn Fn(&str) -> String) {
    match node {
        Value::String(s) => *s = rewrite(s),
        Value::Sequence(items) => {
            for item in items {
                rewrite_strings(item, rewrite);
            }
        }
        Value::Mapping(map) => {
            for (_, value) in map.iter_mut() {
                rewrite_strings(value, rewrite);
            }
        }
        _ => {}
    }
}

fn replace_color_tokens(text: &str, colors: &Value) -> String {
    const OPEN: &str = "${colors.";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let tail = &rest[start + OPEN.len()..];
        match tail.find('}') {
            Some(end) => {
                let path = &tail[..end];
                match resolve_color_path(colors, path) {
                    Some(replacement) => out.push_str(&replacement),
                    // Unknown macro: keep the original token.
                    None => out.push_str(&rest[start..start + OPEN.len() + end + 1]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_color_path(colors: &Value, path: &str) -> Option<String> {
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return None;
    }

    let mut node = colors;
    for part in path.split('.') {
        node = node.get(part)?;
    }
    node.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Value {
        serde_yaml::from_str(
            r#"
status:
  ok: "GREEN"
  bad: "RED"
reset: "RESET"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_color_token_replaced() {
        let out = replace_color_tokens("${colors.status.ok}text${colors.reset}", &colors());
        assert_eq!(out, "GREENtextRESET");
    }

    #[test]
    fn test_unknown_color_path_left_verbatim() {
        let out = replace_color_tokens("${colors.status.missing} x", &colors());
        assert_eq!(out, "${colors.status.missing} x");
    }

    #[test]
    fn test_non_color_tokens_untouched() {
        let out = replace_color_tokens("CPU ${cpu|percent:1}", &colors());
        assert_eq!(out, "CPU ${cpu|percent:1}");
    }

    #[test]
    fn test_unterminated_macro_kept() {
        let out = replace_color_tokens("x ${colors.reset", &colors());
        assert_eq!(out, "x ${colors.reset");
    }

    #[test]
    fn test_tree_rewrite_touches_nested_strings() {
        let mut tree: Value = serde_yaml::from_str(
            r#"
colors:
  reset: "RESET"
views:
  - columns:
      - style: {reset: "${colors.reset}"}
"#,
        )
        .unwrap();
        apply_color_macros(&mut tree);
        let reset = tree["views"][0]["columns"][0]["style"]["reset"].as_str();
        assert_eq!(reset, Some("RESET"));
    }

    #[test]
    fn test_substitute_vars_in_query() {
        let mut vars = HashMap::new();
        vars.insert("node".to_string(), "node/r440".to_string());
        assert_eq!(
            substitute_vars("up{instance=\"${node}\"}", &vars),
            "up{instance=\"node/r440\"}"
        );
        assert_eq!(substitute_vars("no tokens", &vars), "no tokens");
    }
}
