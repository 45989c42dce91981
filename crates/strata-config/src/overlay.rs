//! JSON-tree layering used by the loader.
//!
//! Documents are decoded to `serde_json::Value` and laid over the serialized
//! target before the final deserialization, so fields a document omits keep
//! whatever the target held (defaults, or `before_load` mutations).

use serde_json::{Map, Value};

/// Lays `doc` over `base`.
///
/// Objects merge key by key; every other value in `doc` replaces the value in
/// `base`. A `null` in `doc` (an empty YAML section or key) leaves `base`
/// untouched. With `case_insensitive`, a document key that matches an existing
/// base key ignoring ASCII case takes the base key's spelling.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use strata_config::overlay;
///
/// let mut base = json!({"http_server": {"host": "0.0.0.0", "port": 8080}});
/// overlay(&mut base, json!({"HTTP_Server": {"Port": 9090}}), true);
/// assert_eq!(base, json!({"http_server": {"host": "0.0.0.0", "port": 9090}}));
/// ```
pub fn overlay(base: &mut Value, doc: Value, case_insensitive: bool) {
    match (base, doc) {
        (Value::Object(base_map), Value::Object(doc_map)) => {
            for (key, value) in doc_map {
                let key = if case_insensitive {
                    canonical_key(base_map, key)
                } else {
                    key
                };
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value, case_insensitive),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (slot, doc) => *slot = doc,
    }
}

fn canonical_key(base: &Map<String, Value>, key: String) -> String {
    if base.contains_key(&key) {
        return key;
    }
    base.keys()
        .find(|existing| existing.eq_ignore_ascii_case(&key))
        .cloned()
        .unwrap_or(key)
}

/// Builds an override tree from `PREFIX__A__B=value` variables.
///
/// Segments are lowercased; the loader's case folding maps them onto the real
/// field names. Values are parsed as JSON scalars when possible
/// (`9000`, `true`, `1.5`, `null`) and kept as strings otherwise.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use strata_config::env_overrides;
///
/// let vars = vec![("APP__HTTP_SERVER__PORT".to_string(), "9000".to_string())];
/// assert_eq!(env_overrides("APP", vars), json!({"http_server": {"port": 9000}}));
/// ```
pub fn env_overrides<I>(prefix: &str, vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let marker = format!("{}__", prefix.to_ascii_uppercase());
    let mut root = Value::Object(Map::new());

    for (key, raw) in vars {
        let Some(rest) = key.to_ascii_uppercase().strip_prefix(&marker).map(str::to_string) else {
            continue;
        };
        let segments: Vec<String> = rest
            .split("__")
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        if segments.is_empty() {
            continue;
        }
        insert_path(&mut root, &segments, parse_env_value(&raw));
    }
    root
}

fn insert_path(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert_path(child, rest, value);
    }
}

/// Interprets an environment variable value.
pub fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => value,
        Ok(value @ (Value::Array(_) | Value::Object(_))) if !trimmed.is_empty() => value,
        _ => Value::String(raw.to_string()),
    }
}
