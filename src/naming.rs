//! Output names that encode a combination.
//!
//! A name is the prefix followed by one `<node>-<param>-<value>` segment per
//! axis, joined with `__`. Unsafe characters are percent-encoded rather than
//! replaced so two different values can never produce the same name.

use crate::combination::Combination;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Separator between the prefix and each axis segment.
pub const SEGMENT_SEPARATOR: &str = "__";

/// Subdirectory of the output folder that receives images.
pub const IMAGES_DIR: &str = "images";

/// Deterministic name for `combo` under `prefix`.
pub fn output_name(combo: &Combination, prefix: &str) -> String {
    let mut parts = Vec::with_capacity(combo.values.len() + 1);
    parts.push(sanitize(prefix));
    for (target, value) in &combo.values {
        parts.push(format!(
            "{}-{}-{}",
            sanitize(&target.node),
            sanitize(&target.param),
            sanitize(&render_value(value))
        ));
    }
    parts.join(SEGMENT_SEPARATOR)
}

/// `<output_folder>/images/<name>`.
pub fn output_path(output_folder: &Path, combo: &Combination, prefix: &str) -> PathBuf {
    output_folder.join(IMAGES_DIR).join(output_name(combo, prefix))
}

/// Render a value without float noise, exponents, or trailing zeros.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map(render_f64).unwrap_or_else(|| n.to_string())
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_f64(v: f64) -> String {
    // Display for f64 is the shortest round-trip form and never uses an exponent.
    let text = format!("{}", v);
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

fn is_unsafe(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(
            c,
            '/' | '\\' | ':' | ',' | ';' | '"' | '\'' | '*' | '?' | '<' | '>' | '|' | '%'
        )
}

/// Make a fragment filesystem-safe. Unsafe characters become `%XX` per UTF-8
/// byte, and an underscore directly after another underscore is encoded so a
/// fragment never contains the segment separator.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_underscore = false;
    for c in text.chars() {
        if is_unsafe(c) || (c == '_' && prev_underscore) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
            prev_underscore = false;
        } else {
            out.push(c);
            prev_underscore = c == '_';
        }
    }
    out
}
