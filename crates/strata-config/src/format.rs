//! Document formats and their decoders.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{ConfigError, ConfigResult};

/// Supported configuration document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// JSON (`.json`).
    Json,
    /// TOML (`.toml`).
    Toml,
}

impl Format {
    /// Maps a file extension (case-insensitive, without the dot) to a format.
    ///
    /// # Example
    ///
    /// ```
    /// use strata_config::Format;
    ///
    /// assert_eq!(Format::from_extension("YML"), Some(Format::Yaml));
    /// assert_eq!(Format::from_extension("ini"), None);
    /// ```
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Format of `path`, judged by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Decoder name used in errors and metadata.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Extension used when creating a new file in this format.
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Decodes `text` into a JSON tree.
    ///
    /// An empty YAML document decodes to an empty object.
    pub fn decode(self, text: &str, path: &Path) -> ConfigResult<Value> {
        let value = match self {
            Self::Yaml => serde_yaml::from_str::<Value>(text)
                .map_err(|e| ConfigError::decode(path, self.as_str(), e))?,
            Self::Json => serde_json::from_str::<Value>(text)
                .map_err(|e| ConfigError::decode(path, self.as_str(), e))?,
            Self::Toml => toml::from_str::<Value>(text)
                .map_err(|e| ConfigError::decode(path, self.as_str(), e))?,
        };

        match value {
            Value::Null => Ok(Value::Object(serde_json::Map::new())),
            Value::Object(_) => Ok(value),
            other => Err(ConfigError::decode(
                path,
                self.as_str(),
                format!("expected a mapping at the document root, found {}", kind_of(&other)),
            )),
        }
    }

    /// Encodes `value` in this format.
    pub fn encode<T: Serialize>(self, value: &T) -> ConfigResult<String> {
        match self {
            Self::Yaml => serde_yaml::to_string(value)
                .map_err(|e| ConfigError::internal(format!("yaml encode failed: {e}"))),
            Self::Json => serde_json::to_string_pretty(value)
                .map_err(|e| ConfigError::internal(format!("json encode failed: {e}"))),
            Self::Toml => toml::to_string_pretty(value)
                .map_err(|e| ConfigError::internal(format!("toml encode failed: {e}"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::ErrorKind;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(Format::from_extension("yaml"), Some(Format::Yaml));
        assert_eq!(Format::from_extension("Json"), Some(Format::Json));
        assert_eq!(Format::from_extension("TOML"), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("conf/app.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_decode_each_format() {
        let path = Path::new("mem");
        let yaml = Format::Yaml.decode("http_server:\n  port: 8080\n", path).unwrap();
        let json = Format::Json.decode(r#"{"http_server": {"port": 8080}}"#, path).unwrap();
        let toml = Format::Toml.decode("[http_server]\nport = 8080\n", path).unwrap();
        let expected = json!({"http_server": {"port": 8080}});
        assert_eq!(yaml, expected);
        assert_eq!(json, expected);
        assert_eq!(toml, expected);
    }

    #[test]
    fn test_empty_yaml_is_empty_object() {
        let value = Format::Yaml.decode("", Path::new("empty.yaml")).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_decode_errors() {
        let err = Format::Json.decode("{not json", Path::new("a.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = Format::Yaml.decode("- a\n- b\n", Path::new("list.yaml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("a sequence"));
    }

    #[test]
    fn test_encode_then_decode() {
        let value = json!({"cache": {"ttl": "30s", "enabled": true}});
        for format in [Format::Yaml, Format::Json, Format::Toml] {
            let text = format.encode(&value).unwrap();
            assert_eq!(format.decode(&text, Path::new("x")).unwrap(), value, "{format}");
        }
    }
}
