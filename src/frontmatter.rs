//! Markdown frontmatter encode/decode
//!
//! An entry file is a `---`-delimited YAML prefix followed by the rendered
//! body. The emitter writes one field per line with `serde_yaml` doing the
//! scalar quoting, except `tags`, which is emitted as a JSON-style flow
//! sequence (valid YAML) to match the on-disk format. The decoder is plain
//! `serde_yaml`, so anything we emit parses back identically.

use serde_yaml::{Mapping, Value};

/// Frontmatter delimiter line.
const FENCE: &str = "---";

/// Encode frontmatter fields plus body into full file content.
pub fn encode(fields: &Mapping, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 256);
    out.push_str(FENCE);
    out.push('\n');
    for (key, value) in fields {
        emit_field(&mut out, key, value);
    }
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Split file content into frontmatter fields and body.
///
/// Returns `None` when the `---` fence is absent or the YAML between the
/// fences does not parse to a mapping.
pub fn decode(content: &str) -> Option<(Mapping, String)> {
    let rest = content.strip_prefix("---\n")?;
    let (yaml, body) = match rest.find("\n---\n") {
        Some(pos) => (&rest[..pos + 1], &rest[pos + 5..]),
        // Fence at end of file with no body
        None => (rest.strip_suffix("---\n").or_else(|| rest.strip_suffix("---"))?, ""),
    };
    let fields: Mapping = serde_yaml::from_str(yaml).ok()?;
    Some((fields, body.to_string()))
}

fn emit_field(out: &mut String, key: &Value, value: &Value) {
    // JSON flow style for sequences ("tags: [\"a\", \"b\"]"); JSON is a YAML
    // subset so the decoder reads it back unchanged.
    if let (Value::String(name), Value::Sequence(_)) = (key, value) {
        if let Ok(json) = serde_json::to_string(&yaml_to_json(value)) {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&json);
            out.push('\n');
            return;
        }
    }
    let mut single = Mapping::new();
    single.insert(key.clone(), value.clone());
    match serde_yaml::to_string(&single) {
        Ok(line) => out.push_str(&line),
        Err(e) => tracing::warn!(error = %e, "Unencodable frontmatter field skipped"),
    }
}

/// Convert a YAML value to its JSON counterpart.
///
/// Non-string mapping keys are stringified; this matches the restricted
/// frontmatter subset where keys are always strings.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(yaml_to_json).collect()),
        Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (yaml_key_to_string(k), yaml_to_json(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

/// Convert a JSON value to YAML for frontmatter emission.
pub fn json_to_yaml(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                Value::Number(serde_yaml::Number::from(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(arr) => Value::Sequence(arr.iter().map(json_to_yaml).collect()),
        serde_json::Value::Object(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (Value::String(k.clone()), json_to_yaml(v)))
                .collect(),
        ),
    }
}

fn yaml_key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}
