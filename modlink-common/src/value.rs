use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed application value.
///
/// Produced by decoding register contents, consumed by writes. `Registers`
/// carries a word sequence that could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value (coils, discrete inputs, bit encodings).
    Boolean(bool),

    /// Signed integer, also used for unsigned values up to 32 bits.
    Integer(i64),

    /// Unsigned 64-bit integer.
    Unsigned(u64),

    /// Floating-point number.
    Number(f64),

    /// Text value.
    Text(String),

    /// Undecoded register words.
    Registers(Vec<u16>),
}

/// Declared runtime type of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Boolean,
    Integer,
    #[default]
    Number,
    Text,
}

impl AttributeType {
    /// Get the string name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Boolean => "boolean",
            AttributeType::Integer => "integer",
            AttributeType::Number => "number",
            AttributeType::Text => "text",
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value could not be converted to the requested attribute type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot coerce {value} to {target}")]
pub struct CoercionError {
    /// Rendering of the rejected value.
    pub value: String,
    /// The requested type.
    pub target: AttributeType,
}

impl CoercionError {
    fn new(value: &Value, target: AttributeType) -> Self {
        Self {
            value: format!("{:?}", value),
            target,
        }
    }
}

impl Value {
    /// Short name of the variant, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Unsigned(_) => "unsigned",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Registers(_) => "registers",
        }
    }

    /// Whether this is one of the numeric variants.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Integer(_) | Value::Unsigned(_) | Value::Number(_)
        )
    }

    /// Numeric view as `f64`, `None` for non-numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view, truncating floats toward zero. `None` when the value is
    /// not numeric or does not fit in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            Value::Number(v) => f64_to_i64(*v),
            _ => None,
        }
    }

    /// Convert to the declared attribute type.
    ///
    /// Numbers widen or narrow (floats truncate toward zero), booleans map to
    /// 0/1 and back (nonzero is `true`), and text is parsed.
    pub fn coerce(&self, target: AttributeType) -> Result<Value, CoercionError> {
        let fail = || CoercionError::new(self, target);

        match target {
            AttributeType::Boolean => match self {
                Value::Boolean(b) => Ok(Value::Boolean(*b)),
                Value::Integer(v) => Ok(Value::Boolean(*v != 0)),
                Value::Unsigned(v) => Ok(Value::Boolean(*v != 0)),
                Value::Number(v) if !v.is_nan() => Ok(Value::Boolean(*v != 0.0)),
                Value::Text(s) => parse_bool(s).map(Value::Boolean).ok_or_else(fail),
                _ => Err(fail()),
            },
            AttributeType::Integer => match self {
                Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
                Value::Text(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(f64_to_i64))
                        .map(Value::Integer)
                        .ok_or_else(fail)
                }
                other => other.as_i64().map(Value::Integer).ok_or_else(fail),
            },
            AttributeType::Number => match self {
                Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| fail()),
                other => other.as_f64().map(Value::Number).ok_or_else(fail),
            },
            AttributeType::Text => match self {
                Value::Registers(_) => Err(fail()),
                other => Ok(Value::Text(other.to_string())),
            },
        }
    }
}

fn f64_to_i64(v: f64) -> Option<i64> {
    let t = v.trunc();
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        s.parse::<f64>().ok().filter(|v| !v.is_nan()).map(|v| v != 0.0)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Registers(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
