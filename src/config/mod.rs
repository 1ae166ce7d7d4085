//! Dashboard configuration.
//!
//! The configuration is a YAML document describing the metrics backend, the
//! queries to run, derived-value expressions, and the views to render.
//! Loading happens in three steps:
//!
//! 1. The raw document tree is parsed and `${colors.path.to.value}` macros
//!    are resolved textually across all string fields (see [`rewrite`]).
//! 2. The tree is deserialized into the typed model below. View kinds are a
//!    closed `type: header | table` enum, so an unknown kind fails here.
//! 3. `${var}` substitutions from `globals.vars` are applied to metric query
//!    strings, and structural invariants are checked (`validate`).
//!
//! Only structural problems are fatal: I/O failures, YAML syntax errors,
//! a missing backend URL, and broken layout references. Bad expressions are
//! reported later, when the engine compiles them, and render as unknown.

mod rewrite;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

pub use rewrite::substitute_vars;

/// Error type for configuration loading failures.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Reading the document failed.
    Io(String),
    /// YAML syntax or schema mismatch.
    Parse(String),
    /// A required field is missing or empty.
    MissingField(String),
    /// The layout references a view id that does not exist.
    UnknownView(String),
    /// Two views share an id.
    DuplicateView(String),
    /// The layout is empty or starts with a non-header view.
    BadLayout(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "cannot read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "cannot parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "config field '{}' is required", field),
            ConfigError::UnknownView(id) => write!(f, "layout references unknown view '{}'", id),
            ConfigError::DuplicateView(id) => write!(f, "duplicate view id '{}'", id),
            ConfigError::BadLayout(msg) => write!(f, "bad layout: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub datasources: Datasources,
    #[serde(default)]
    pub globals: Globals,
    #[serde(default)]
    pub metrics: Vec<MetricDef>,
    #[serde(default)]
    pub derived: Vec<DerivedDef>,
    #[serde(default)]
    pub views: Vec<ViewDef>,
    #[serde(default)]
    pub layout: Vec<LayoutEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datasources {
    pub prometheus: PrometheusConfig,
}

/// Connection settings for the Prometheus-compatible backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
}

fn default_timeout_s() -> f64 {
    3.0
}

/// `globals:` section — refresh cadence, query variables, display defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Globals {
    #[serde(default)]
    pub refresh: Refresh,
    /// Textual `${var}` substitutions applied to metric query strings.
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub defaults: Defaults,
    /// Label whose value groups samples into table rows.
    #[serde(default = "default_row_label")]
    pub row_label: String,
}

fn default_row_label() -> String {
    "id".to_string()
}

impl Default for Globals {
    fn default() -> Self {
        Globals {
            refresh: Refresh::default(),
            vars: HashMap::default(),
            defaults: Defaults::default(),
            row_label: default_row_label(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refresh {
    /// Header repaint interval in seconds.
    #[serde(default = "default_fast_s")]
    pub fast_s: f64,
    /// Full fetch + table rebuild interval in seconds.
    #[serde(default = "default_bulk_s")]
    pub bulk_s: f64,
}

fn default_fast_s() -> f64 {
    0.2
}

fn default_bulk_s() -> f64 {
    5.0
}

impl Default for Refresh {
    fn default() -> Self {
        Refresh {
            fast_s: default_fast_s(),
            bulk_s: default_bulk_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    /// Placeholder shown for values that cannot be resolved.
    #[serde(default = "default_missing_value")]
    pub missing_value: String,
}

fn default_missing_value() -> String {
    "---".to_string()
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            missing_value: default_missing_value(),
        }
    }
}

/// One backend query and the labels it exposes on rows.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricDef {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub query_type: QueryKind,
    /// Labels copied onto the row record when this metric's samples carry
    /// the row label.
    #[serde(default)]
    pub expose_labels: Vec<String>,
}

/// Query kinds understood by the backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Instant,
}

/// A derived quantity computed from an arithmetic expression.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedDef {
    pub id: String,
    pub expr: String,
    /// Computed once per table row instead of once globally.
    #[serde(default)]
    pub per_row: bool,
}

/// A renderable unit: scalar header line or entity table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewDef {
    Header(HeaderViewDef),
    Table(TableViewDef),
}

impl ViewDef {
    pub fn id(&self) -> &str {
        match self {
            ViewDef::Header(v) => &v.id,
            ViewDef::Table(v) => &v.id,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, ViewDef::Header(_))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderViewDef {
    pub id: String,
    pub title: Option<String>,
    /// Template with `${name|format:decimals}` tokens.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub computed_values: HashMap<String, ComputedSpec>,
}

/// A named value computed outside the expression language.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ComputedSpec {
    /// Host-side built-in, e.g. `{builtin: uptime}`.
    Builtin { builtin: String },
    /// Count of the emergent row set: `{from_rows: true, op: count}`.
    FromRows {
        from_rows: bool,
        #[serde(default = "default_op")]
        op: String,
    },
    /// Count of a metric's sample bucket: `{from_metric: m, op: count}`.
    FromMetric {
        from_metric: String,
        #[serde(default = "default_op")]
        op: String,
    },
}

fn default_op() -> String {
    "count".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableViewDef {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub source: TableSourceDef,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

/// Row selection spec for a table view: optional filter and sort.
/// An unconfigured source passes every indexed row through unsorted.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TableSourceDef {
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortSpec {
    /// Name resolved per row (derived value, metric value, or label).
    pub by: String,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Exact-match row filter on a resolved name.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterSpec {
    pub by: String,
    pub equals: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    /// Column header text; falls back to `id`.
    pub title: Option<String>,
    /// Literal cell text, or a `${name}` reference.
    pub value: String,
    #[serde(default)]
    pub format: FormatKind,
    #[serde(default = "default_decimals")]
    pub decimals: usize,
    /// Fixed visible width; unset columns are left unpadded.
    pub width: Option<usize>,
    #[serde(default)]
    pub align: Align,
    pub style: Option<StyleDef>,
}

fn default_decimals() -> usize {
    1
}

/// Value formatting kinds. Anything that is not a known kind is kept as a
/// legacy printf-style pattern and applied to the value directly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum FormatKind {
    Percent,
    #[default]
    Number,
    TempC,
    Kb,
    Mb,
    /// Auto-scaled bytes (`-b` in the document).
    AutoBytes,
    Pattern(String),
}

impl From<String> for FormatKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "percent" => FormatKind::Percent,
            "number" => FormatKind::Number,
            "temp_c" => FormatKind::TempC,
            "kb" => FormatKind::Kb,
            "mb" => FormatKind::Mb,
            "-b" => FormatKind::AutoBytes,
            _ => FormatKind::Pattern(s),
        }
    }
}

/// Cell padding alignment within a fixed-width column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
}

/// Per-column styling rules.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleDef {
    /// `label name -> (label value -> color prefix)`. The first rule whose
    /// label value matches the row exactly wraps the cell; rules are
    /// checked in label-name order.
    #[serde(default)]
    pub color_by_label: BTreeMap<String, HashMap<String, String>>,
    /// Sequence appended after a styled cell.
    #[serde(default)]
    pub reset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutEntry {
    pub view: String,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Config::from_yaml(&text)
    }

    /// Parses and validates a configuration document.
    pub fn from_yaml(text: &str) -> Result<Config, ConfigError> {
        let mut tree: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        rewrite::apply_color_macros(&mut tree);

        let mut config: Config =
            serde_yaml::from_value(tree).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let vars = config.var_strings();
        for metric in &mut config.metrics {
            metric.query = substitute_vars(&metric.query, &vars);
        }

        config.validate()?;
        Ok(config)
    }

    /// `globals.vars` with scalar values rendered as replacement text.
    fn var_strings(&self) -> HashMap<String, String> {
        self.globals
            .vars
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.datasources.prometheus.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField(
                "datasources.prometheus.base_url".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for view in &self.views {
            if !ids.insert(view.id()) {
                return Err(ConfigError::DuplicateView(view.id().to_string()));
            }
        }

        if self.layout.is_empty() {
            return Err(ConfigError::BadLayout(
                "layout must list at least one view".to_string(),
            ));
        }
        for entry in &self.layout {
            if !ids.contains(entry.view.as_str()) {
                return Err(ConfigError::UnknownView(entry.view.clone()));
            }
        }

        let first = self.layout[0].view.as_str();
        let first_is_header = self
            .views
            .iter()
            .any(|v| v.id() == first && v.is_header());
        if !first_is_header {
            return Err(ConfigError::BadLayout(format!(
                "first layout entry '{}' must be a header view",
                first
            )));
        }

        Ok(())
    }

    /// Finds a view by id. Valid for any id that passed `validate`.
    pub fn view(&self, id: &str) -> Option<&ViewDef> {
        self.views.iter().find(|v| v.id() == id)
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
datasources:
  prometheus:
    base_url: http://localhost:9090
    timeout_s: 2.5
globals:
  refresh: {fast_s: 0.5, bulk_s: 10}
  vars: {node: "node/r440", port: 9100}
  defaults: {missing_value: "n/a"}
colors:
  guest:
    lxc: "\x1b[1;36m"
  reset: "\x1b[0m"
metrics:
  - id: cpu
    query: pve_cpu_usage_ratio{instance="${node}:${port}"}
    expose_labels: [name, type]
derived:
  - id: cpu_pct
    expr: cpu * 100
    per_row: true
views:
  - id: host
    type: header
    template: "CPU ${cpu|percent:1}"
    computed_values:
      up: {builtin: uptime}
      vms: {from_rows: true, op: count}
  - id: guests
    type: table
    source:
      sort: {by: cpu_pct, order: desc}
    columns:
      - id: name
        title: VM/CT
        value: "${name}"
        width: 12
        style:
          color_by_label:
            type:
              lxc: "${colors.guest.lxc}"
          reset: "${colors.reset}"
      - id: cpu
        value: "${cpu_pct}"
        format: percent
        decimals: 1
        align: right
layout:
  - view: host
  - view: guests
"#;

    #[test]
    fn test_full_document_parses() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.datasources.prometheus.base_url, "http://localhost:9090");
        assert_eq!(config.globals.refresh.bulk_s, 10.0);
        assert_eq!(config.globals.defaults.missing_value, "n/a");
        assert_eq!(config.globals.row_label, "id");
        assert_eq!(config.metrics.len(), 1);
        assert!(config.derived[0].per_row);
        assert_eq!(config.layout.len(), 2);

        match config.view("guests").unwrap() {
            ViewDef::Table(table) => {
                let sort = table.source.sort.as_ref().unwrap();
                assert_eq!(sort.by, "cpu_pct");
                assert_eq!(sort.order, SortOrder::Desc);
                assert_eq!(table.columns[0].width, Some(12));
                assert_eq!(table.columns[1].format, FormatKind::Percent);
                assert_eq!(table.columns[1].align, Align::Right);
                assert_eq!(table.columns[0].align, Align::Left);
            }
            _ => panic!("guests should be a table view"),
        }
    }

    #[test]
    fn test_query_vars_are_substituted() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.metrics[0].query,
            "pve_cpu_usage_ratio{instance=\"node/r440:9100\"}"
        );
    }

    #[test]
    fn test_color_macros_resolve_in_styles() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let table = match config.view("guests").unwrap() {
            ViewDef::Table(t) => t,
            _ => panic!(),
        };
        let style = table.columns[0].style.as_ref().unwrap();
        assert_eq!(style.color_by_label["type"]["lxc"], "\x1b[1;36m");
        assert_eq!(style.reset, "\x1b[0m");
    }

    #[test]
    fn test_format_kind_from_document_strings() {
        assert_eq!(FormatKind::from("percent".to_string()), FormatKind::Percent);
        assert_eq!(FormatKind::from("-b".to_string()), FormatKind::AutoBytes);
        assert_eq!(
            FormatKind::from("%5.1f".to_string()),
            FormatKind::Pattern("%5.1f".to_string())
        );
    }

    #[test]
    fn test_unknown_view_type_is_fatal() {
        let text = SAMPLE.replace("type: table", "type: gauge");
        assert!(matches!(
            Config::from_yaml(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_base_url_is_fatal() {
        let text = SAMPLE.replace("http://localhost:9090", "\"\"");
        assert!(matches!(
            Config::from_yaml(&text),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_layout_must_start_with_header_view() {
        let text = SAMPLE.replace("  - view: host\n  - view: guests", "  - view: guests");
        assert!(matches!(
            Config::from_yaml(&text),
            Err(ConfigError::BadLayout(_))
        ));
    }

    #[test]
    fn test_layout_reference_must_resolve() {
        let text = SAMPLE.replace("  - view: guests", "  - view: nonexistent");
        assert!(matches!(
            Config::from_yaml(&text),
            Err(ConfigError::UnknownView(_))
        ));
    }

    #[test]
    fn test_duplicate_view_ids_rejected() {
        let text = SAMPLE.replace("id: guests", "id: host");
        assert!(matches!(
            Config::from_yaml(&text),
            Err(ConfigError::DuplicateView(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.views.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/dashboard.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
