//! Value formatting and ANSI-aware cell padding.
//!
//! Decimal units are decimal: `kb` divides by 1000 and `mb` by 1,000,000.
//! The `-b` auto-unit format truncates the running value to an integer
//! before every 10-bit shift, so fractional precision beyond the first
//! step is lost; that behavior is part of the display contract and the
//! tests pin its exact output.

use crate::config::{Align, FormatKind};

const AUTO_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Formats a possibly-unknown value. Unknown always renders as the
/// missing-value placeholder, whatever the requested format.
pub fn fmt_value(value: Option<f64>, kind: &FormatKind, decimals: usize, missing: &str) -> String {
    let value = match value {
        Some(v) => v,
        None => return missing.to_string(),
    };

    match kind {
        FormatKind::Percent => format!("{:.*}%", decimals, value),
        FormatKind::Number => format!("{:.*}", decimals, value),
        FormatKind::TempC => format!("{:.0}°C", value),
        FormatKind::Kb => format!("{:.*} KB", decimals, value / 1_000.0),
        FormatKind::Mb => format!("{:.*} MB", decimals, value / 1_000_000.0),
        FormatKind::AutoBytes => {
            let mut size = value;
            let mut unit = 0;
            while size >= 1024.0 && unit < AUTO_UNITS.len() - 1 {
                // Truncate, then shift.
                size = ((size as i64) >> 10) as f64;
                unit += 1;
            }
            format!("{:.*} {}", decimals, size, AUTO_UNITS[unit])
        }
        FormatKind::Pattern(pattern) => {
            legacy_pattern(pattern, value).unwrap_or_else(|| plain(value))
        }
    }
}

/// Best-effort conversion used when a legacy pattern cannot be applied.
fn plain(value: f64) -> String {
    value.to_string()
}

/// Applies a printf-style pattern (`%5.1f`, `%d`, ...) to a value.
///
/// Exactly one conversion is supported; `None` means the pattern is not
/// usable and the caller falls back to a plain conversion.
fn legacy_pattern(pattern: &str, value: f64) -> Option<String> {
    let start = pattern.find('%')?;
    let spec = &pattern[start + 1..];
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;

    let mut left_align = false;
    let mut zero_pad = false;
    let mut plus_sign = false;
    while i < chars.len() {
        match chars[i] {
            '-' => left_align = true,
            '0' => zero_pad = true,
            '+' => plus_sign = true,
            _ => break,
        }
        i += 1;
    }

    let mut width = 0usize;
    while i < chars.len() && chars[i].is_ascii_digit() {
        width = width * 10 + chars[i].to_digit(10).unwrap() as usize;
        i += 1;
    }

    let mut precision = None;
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let mut p = 0usize;
        while i < chars.len() && chars[i].is_ascii_digit() {
            p = p * 10 + chars[i].to_digit(10).unwrap() as usize;
            i += 1;
        }
        precision = Some(p);
    }

    let conv = *chars.get(i)?;
    let mut body = match conv {
        'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), value),
        'd' | 'i' => format!("{}", value as i64),
        'g' | 's' => plain(value),
        _ => return None,
    };
    let tail: String = chars[i + 1..].iter().collect();
    // A second conversion in the remainder is beyond this fallback.
    if tail.contains('%') {
        return None;
    }

    if plus_sign && !body.starts_with('-') {
        body.insert(0, '+');
    }
    if body.len() < width {
        let pad = width - body.len();
        if left_align {
            body.push_str(&" ".repeat(pad));
        } else if zero_pad && conv != 's' {
            let sign_len = if body.starts_with('-') || body.starts_with('+') {
                1
            } else {
                0
            };
            body.insert_str(sign_len, &"0".repeat(pad));
        } else {
            body.insert_str(0, &" ".repeat(pad));
        }
    }

    Some(format!("{}{}{}", &pattern[..start], body, tail))
}

/// Display width of a string, with ANSI CSI sequences excluded.
pub fn visible_width(s: &str) -> usize {
    let chars: Vec<char> = s.chars().collect();
    let mut width = 0;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\x1b' && chars.get(i + 1) == Some(&'[') {
            i += 2;
            // Parameter bytes, then intermediates, then one final byte.
            while i < chars.len() && matches!(chars[i], '0'..='9' | ';' | ':' | '<'..='?') {
                i += 1;
            }
            while i < chars.len() && matches!(chars[i], ' '..='/') {
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
        } else {
            width += 1;
            i += 1;
        }
    }
    width
}

/// Pads a string to a fixed visible width. Strings already at or over the
/// width are returned unchanged.
pub fn pad_visible(s: &str, width: usize, align: Align) -> String {
    let pad = width.saturating_sub(visible_width(s));
    if pad == 0 {
        return s.to_string();
    }
    match align {
        Align::Left => format!("{}{}", s, " ".repeat(pad)),
        Align::Right => format!("{}{}", " ".repeat(pad), s),
        Align::Center => {
            let left = pad / 2;
            format!("{}{}{}", " ".repeat(left), s, " ".repeat(pad - left))
        }
    }
}
