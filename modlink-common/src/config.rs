use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logging_config() {
        let config: LoggingConfig = serde_json::from_str(r#"{ "level": "debug" }"#).unwrap();

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_default_config() {
        let config: LoggingConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_json_logging_format() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{ "level": "warn", "format": "json" }"#).unwrap();

        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
    }
}
