//! modlink Common Library
//!
//! This crate provides shared types and utilities for modlink device links:
//!
//! - [`attribute`] - Attribute identity and published updates (`AttributeRef`, `AttributeUpdate`)
//! - [`value`] - Typed application values and coercion (`Value`, `AttributeType`)
//! - [`config`] - Logging configuration
//! - [`error`] - Error types

pub mod attribute;
pub mod config;
pub mod error;
pub mod value;

// Re-export commonly used types at the crate root
pub use attribute::{AttributeRef, AttributeUpdate, current_timestamp_millis};
pub use config::{LogFormat, LoggingConfig};
pub use error::{Error, Result};
pub use value::{AttributeType, CoercionError, Value};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use modlink_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
