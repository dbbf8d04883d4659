use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable identity of an application data point: the owning asset plus the
/// attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeRef {
    /// Identifier of the asset owning the attribute.
    pub asset_id: String,
    /// Attribute name within the asset.
    pub attribute: String,
}

impl AttributeRef {
    /// Create a new attribute reference.
    pub fn new(asset_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            attribute: attribute.into(),
        }
    }
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.asset_id, self.attribute)
    }
}

/// A value pushed for a linked attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeUpdate {
    /// Unix epoch milliseconds when the value was read.
    pub timestamp: i64,

    /// The attribute the value belongs to.
    #[serde(rename = "ref")]
    pub attribute_ref: AttributeRef,

    /// The coerced value.
    pub value: Value,
}

impl AttributeUpdate {
    /// Create a new update stamped with the current time.
    pub fn new(attribute_ref: AttributeRef, value: Value) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            attribute_ref,
            value,
        }
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
