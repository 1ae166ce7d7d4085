//! The refresh loop.
//!
//! One thread, two cadences. The bulk tick (slow) re-fetches samples,
//! rebuilds the index and the table body, and paints a full frame. Between
//! bulk ticks the fast tick recomputes contexts and derived values from
//! the unchanged sample index and repaints only the header line, so
//! header figures feel live while the comparatively expensive table
//! tolerates staleness.
//!
//! A bulk tick whose every query fails is tolerated: the previous index
//! and rendered body are kept and the frame stays visually unchanged.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ViewDef;
use crate::engine::{CycleValues, Engine, SampleSet, SeriesIndex};
use crate::render::{render_header, render_table};
use crate::source::{FetchError, MetricsSource};
use crate::term::Screen;

/// The dashboard application: engine, backend client, and display.
pub struct App<S: MetricsSource, W: Write> {
    engine: Engine,
    source: S,
    screen: Screen<W>,
}

impl<S: MetricsSource, W: Write> App<S, W> {
    pub fn new(engine: Engine, source: S, screen: Screen<W>) -> Self {
        App {
            engine,
            source,
            screen,
        }
    }

    /// Runs until `running` is cleared. The cursor is re-shown on the way
    /// out even when drawing failed mid-cycle.
    pub fn run(mut self, running: Arc<AtomicBool>) -> io::Result<()> {
        self.screen.init()?;
        let result = self.run_loop(&running);
        let restored = self.screen.restore();
        result.and(restored)
    }

    fn run_loop(&mut self, running: &AtomicBool) -> io::Result<()> {
        let refresh = &self.engine.config().globals.refresh;
        let fast = Duration::from_secs_f64(refresh.fast_s);
        let bulk = Duration::from_secs_f64(refresh.bulk_s);

        let mut index = SeriesIndex::default();
        let mut cached_body = String::new();
        let mut last_bulk: Option<Instant> = None;

        while running.load(Ordering::SeqCst) {
            let bulk_due = last_bulk.is_none_or(|t| t.elapsed() >= bulk);
            if bulk_due {
                match self.fetch_samples() {
                    Ok(samples) => {
                        index = self.engine.index(&samples);
                        let cycle = self.engine.cycle(&index);
                        cached_body = self.render_body(&index, &cycle);
                        let header = self.render_header_line(&index, &cycle);
                        self.screen.draw_full(&header, &cached_body)?;
                    }
                    Err(e) => {
                        // Keep the previous index and body on a fully
                        // failed fetch; only the header is repainted.
                        warn!("bulk fetch failed, keeping previous frame: {}", e);
                        let cycle = self.engine.cycle(&index);
                        let header = self.render_header_line(&index, &cycle);
                        self.screen.draw_header(&header)?;
                    }
                }
                last_bulk = Some(Instant::now());
            } else {
                let cycle = self.engine.cycle(&index);
                let header = self.render_header_line(&index, &cycle);
                self.screen.draw_header(&header)?;
            }

            std::thread::sleep(fast);
        }

        Ok(())
    }

    /// Queries every configured metric. Individual failures are logged and
    /// skipped; only a tick where every query failed is an error.
    fn fetch_samples(&self) -> Result<SampleSet, FetchError> {
        let mut set = SampleSet::default();
        let mut last_error = None;
        let mut failures = 0;

        for metric in self.engine.metrics() {
            match self.source.query(&metric.query) {
                Ok(samples) => {
                    debug!("metric '{}': {} series", metric.id, samples.len());
                    set.push(&metric.id, samples);
                }
                Err(e) => {
                    warn!("metric '{}' query failed: {}", metric.id, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failures == self.engine.metrics().len() => Err(e),
            _ => Ok(set),
        }
    }

    /// Renders every table view in layout order into the frame body.
    fn render_body(&self, idx: &SeriesIndex, cycle: &CycleValues) -> String {
        self.engine
            .layout_views()
            .filter_map(|view| match view {
                ViewDef::Table(table) => {
                    Some(render_table(table, idx, cycle, self.engine.missing_value()))
                }
                ViewDef::Header(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Renders the first layout view, which validation guarantees to be a
    /// header view.
    fn render_header_line(&self, idx: &SeriesIndex, cycle: &CycleValues) -> String {
        match self.engine.layout_views().next() {
            Some(ViewDef::Header(header)) => {
                render_header(header, idx, cycle, self.engine.missing_value())
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::{MockSource, Sample};

    const CONFIG: &str = r#"
datasources:
  prometheus: {base_url: "http://localhost:9090"}
metrics:
  - id: cpu
    query: q_cpu
  - id: mem
    query: q_mem
  - id: info
    query: q_info
    expose_labels: [name, type]
derived:
  - id: cpu_pct
    expr: cpu * 100
    per_row: true
  - id: host_cpu_pct
    expr: cpu * 100
views:
  - id: host
    type: header
    template: "CPU ${host_cpu_pct|percent:1}  VMs:${vms}"
    computed_values:
      vms: {from_rows: true, op: count}
  - id: guests
    type: table
    source:
      sort: {by: cpu_pct, order: desc}
    columns:
      - id: name
        title: VM/CT
        value: "${name}"
        width: 8
      - id: cpu
        title: CPU%
        value: "${cpu_pct}"
        format: percent
        decimals: 1
layout:
  - view: host
  - view: guests
"#;

    fn mock() -> MockSource {
        MockSource::new()
            .with_series("q_cpu", vec![Sample::new(&[("id", "100")], "0.42")])
            .with_series("q_mem", vec![Sample::new(&[("id", "100")], "512000")])
            .with_series(
                "q_info",
                vec![Sample::new(
                    &[("id", "100"), ("name", "web"), ("type", "lxc")],
                    "1",
                )],
            )
    }

    fn app(source: MockSource) -> App<MockSource, Vec<u8>> {
        let engine = Engine::new(Config::from_yaml(CONFIG).unwrap());
        App::new(engine, source, Screen::new(Vec::new()))
    }

    #[test]
    fn test_fetch_tolerates_partial_failure() {
        // Only q_cpu is registered; the other queries return empty, not
        // failure, so everything succeeds.
        let app = app(MockSource::new().with_series(
            "q_cpu",
            vec![Sample::new(&[("id", "100")], "0.42")],
        ));
        let set = app.fetch_samples().unwrap();
        assert_eq!(set.entries.len(), 3);
    }

    #[test]
    fn test_fetch_fails_only_when_everything_fails() {
        let app = app(MockSource::failing());
        assert!(app.fetch_samples().is_err());
    }

    #[test]
    fn test_full_cycle_renders_expected_frame() {
        let app = app(mock());
        let samples = app.fetch_samples().unwrap();
        let idx = app.engine.index(&samples);
        let cycle = app.engine.cycle(&idx);

        let header = app.render_header_line(&idx, &cycle);
        assert_eq!(header, "CPU 42.0%  VMs:1");

        let body = app.render_body(&idx, &cycle);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "VM/CT   \tCPU%");
        assert_eq!(lines[1], "web     \t42.0%");
    }

    #[test]
    fn test_empty_fetch_renders_placeholders() {
        let app = app(MockSource::new());
        let samples = app.fetch_samples().unwrap();
        let idx = app.engine.index(&samples);
        let cycle = app.engine.cycle(&idx);
        assert_eq!(app.render_header_line(&idx, &cycle), "CPU ---  VMs:0");
    }
}
