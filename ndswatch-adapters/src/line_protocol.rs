//! InfluxDB line protocol encoding.
//!
//! Each point becomes `measurement[,tag=value...] value=<n> <seconds>`. The
//! `value` field is written without an integer suffix so it lands as a float
//! field, matching series written by earlier collectors.

use ndswatch_types::{MetricBatch, MetricPoint};

/// Encode one point as a line-protocol line (no trailing newline).
///
/// Tags with empty values are omitted, since the protocol has no way to
/// express them.
pub fn encode_point(point: &MetricPoint) -> String {
    let mut line = escape(&point.measurement, &[',', ' ']);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    line.push_str(" value=");
    line.push_str(&point.value.to_string());
    line.push(' ');
    line.push_str(&point.timestamp_secs.to_string());
    line
}

/// Encode a whole batch, one point per line.
pub fn encode_batch(batch: &MetricBatch) -> String {
    batch
        .iter()
        .map(encode_point)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
