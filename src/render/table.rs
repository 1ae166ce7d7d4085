//! Table rendering: select, filter, sort, format, and style entity rows
//! into an aligned grid.
//!
//! Cell values resolve per row in a fixed order: per-row derived value,
//! then numeric base value, then label text, then the missing placeholder.
//! Rows whose sort key is unknown always come after rows with a known key,
//! in both sort directions.

use crate::config::{ColumnDef, FilterSpec, SortOrder, TableViewDef};
use crate::engine::{CycleValues, SeriesIndex};
use crate::eval::Value;

use super::format::{fmt_value, pad_visible};

/// Separator between columns, identical for header and body rows.
const COLUMN_DELIMITER: &str = "\t";

/// Renders a table view for one cycle: a header row followed by one line
/// per (filtered, sorted) entity row.
pub fn render_table(
    view: &TableViewDef,
    idx: &SeriesIndex,
    cycle: &CycleValues,
    missing: &str,
) -> String {
    let mut row_ids: Vec<&String> = cycle.row_ctxs.keys().collect();

    if let Some(filter) = &view.source.filter {
        row_ids.retain(|row_id| matches_filter(row_id, filter, idx, cycle));
    }

    if let Some(sort) = &view.source.sort {
        row_ids = sorted_row_ids(row_ids, &sort.by, sort.order, cycle);
    }

    let header = view
        .columns
        .iter()
        .map(|col| {
            let title = col.title.as_deref().unwrap_or(&col.id);
            match col.width {
                Some(width) => pad_visible(title, width, col.align),
                None => title.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(COLUMN_DELIMITER);

    let mut lines = vec![header];
    for row_id in row_ids {
        let cells: Vec<String> = view
            .columns
            .iter()
            .map(|col| render_cell(col, row_id, idx, cycle, missing))
            .collect();
        lines.push(cells.join(COLUMN_DELIMITER));
    }

    lines.join("\n")
}

/// Numeric sort/filter key for a row: per-row derived first (even when it
/// is unknown — a derived name never falls through to the base value),
/// then any numeric base entry.
fn resolve_num(row_id: &str, name: &str, cycle: &CycleValues) -> Option<f64> {
    if let Some(derived) = cycle.derived.rows.get(row_id)
        && let Some(value) = derived.get(name)
    {
        return value.as_num();
    }
    cycle
        .row_ctxs
        .get(row_id)
        .and_then(|ctx| ctx.get(name))
        .and_then(Value::as_num)
}

fn sorted_row_ids<'a>(
    row_ids: Vec<&'a String>,
    by: &str,
    order: SortOrder,
    cycle: &CycleValues,
) -> Vec<&'a String> {
    let (mut known, unknown): (Vec<_>, Vec<_>) = row_ids
        .into_iter()
        .map(|row_id| (row_id, resolve_num(row_id, by, cycle)))
        .partition(|(_, key)| key.is_some());

    known.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if order == SortOrder::Desc {
        known.reverse();
    }

    known
        .into_iter()
        .chain(unknown)
        .map(|(row_id, _)| row_id)
        .collect()
}

fn matches_filter(row_id: &str, filter: &FilterSpec, idx: &SeriesIndex, cycle: &CycleValues) -> bool {
    if let Some(n) = resolve_num(row_id, &filter.by, cycle) {
        return filter
            .equals
            .trim()
            .parse::<f64>()
            .is_ok_and(|wanted| wanted == n);
    }
    if let Some(Value::Str(s)) = cycle
        .row_ctxs
        .get(row_id)
        .and_then(|ctx| ctx.get(&filter.by))
    {
        return *s == filter.equals;
    }
    idx.rows
        .get(row_id)
        .and_then(|row| row.labels.get(&filter.by))
        .is_some_and(|label| *label == filter.equals)
}

fn render_cell(
    col: &ColumnDef,
    row_id: &str,
    idx: &SeriesIndex,
    cycle: &CycleValues,
    missing: &str,
) -> String {
    let raw = col.value.as_str();
    let mut cell = match token_name(raw) {
        Some(name) => resolve_cell_value(name, col, row_id, idx, cycle, missing),
        None => raw.to_string(),
    };

    if let Some(style) = &col.style
        && let Some(row) = idx.rows.get(row_id)
    {
        for (label_name, value_map) in &style.color_by_label {
            if let Some(label_value) = row.labels.get(label_name)
                && let Some(prefix) = value_map.get(label_value)
            {
                cell = format!("{}{}{}", prefix, cell, style.reset);
                break;
            }
        }
    }

    if let Some(width) = col.width {
        cell = pad_visible(cell.trim(), width, col.align);
    }
    cell
}

/// `${name}` column values reference a per-row value; anything else is a
/// literal.
fn token_name(raw: &str) -> Option<&str> {
    raw.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::trim)
}

fn resolve_cell_value(
    name: &str,
    col: &ColumnDef,
    row_id: &str,
    idx: &SeriesIndex,
    cycle: &CycleValues,
    missing: &str,
) -> String {
    if let Some(derived) = cycle.derived.rows.get(row_id)
        && let Some(value) = derived.get(name)
    {
        return fmt_value(value.as_num(), &col.format, col.decimals, missing);
    }

    if let Some(value) = cycle.row_ctxs.get(row_id).and_then(|ctx| ctx.get(name)) {
        return match value {
            Value::Num(n) => fmt_value(Some(*n), &col.format, col.decimals, missing),
            Value::Str(s) => s.clone(),
            Value::Unknown => missing.to_string(),
        };
    }

    match idx
        .rows
        .get(row_id)
        .and_then(|row| row.labels.get(name))
    {
        Some(label) if !label.is_empty() => label.clone(),
        _ => missing.to_string(),
    }
}
