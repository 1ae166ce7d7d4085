//! ttydash - Configuration-driven TTY metrics dashboard library.
//!
//! This library provides the core functionality behind the `ttydash` binary:
//! - `config` - YAML dashboard definition (metrics, derived values, views)
//! - `source` - metrics backend client (Prometheus HTTP API)
//! - `eval` - restricted arithmetic expression evaluation
//! - `engine` - series indexing and derived-value resolution
//! - `render` - header template and table rendering
//! - `term` - terminal device output
//! - `app` - fast/bulk refresh loop

pub mod app;
pub mod config;
pub mod engine;
pub mod eval;
pub mod render;
pub mod source;
pub mod term;
pub mod util;
