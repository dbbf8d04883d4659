//! Conversion between raw register contents and typed values.
//!
//! Multi-word values are big-endian: the first word holds the most
//! significant bits. `*Swap` encodings reverse the word order before
//! interpretation.

use modlink_common::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::ValueEncoding;

/// Raw result of a single read, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// A coil or discrete input.
    Bit(bool),
    /// Holding or input register words.
    Words(Vec<u16>),
}

impl RawValue {
    /// The undecoded value as handed to callers when decoding fails.
    pub fn into_value(self) -> Value {
        match self {
            RawValue::Bit(bit) => Value::Boolean(bit),
            RawValue::Words(words) => Value::Registers(words),
        }
    }
}

/// Encoding or decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{encoding:?} needs {expected} register(s), got {actual}")]
    TooFewWords {
        encoding: ValueEncoding,
        expected: usize,
        actual: usize,
    },
    #[error("a single bit cannot be decoded as {0:?}")]
    BitMismatch(ValueEncoding),
    #[error("{kind} value cannot be encoded as {encoding:?}")]
    NotNumeric {
        kind: &'static str,
        encoding: ValueEncoding,
    },
    #[error("{value} is out of range for {encoding:?}")]
    OutOfRange {
        value: String,
        encoding: ValueEncoding,
    },
}

/// Decode a raw read result.
///
/// Never fails: when the raw value cannot be interpreted with `encoding`, a
/// warning is logged and the undecoded value is returned.
pub fn decode(raw: &RawValue, encoding: ValueEncoding) -> Value {
    let decoded = match raw {
        RawValue::Bit(bit) => decode_bit(*bit, encoding),
        RawValue::Words(words) => decode_words(words, encoding),
    };

    decoded.unwrap_or_else(|e| {
        warn!(error = %e, "Returning undecoded value");
        raw.clone().into_value()
    })
}

fn decode_bit(bit: bool, encoding: ValueEncoding) -> Result<Value, CodecError> {
    match encoding {
        ValueEncoding::Bit => Ok(Value::Boolean(bit)),
        ValueEncoding::Int8
        | ValueEncoding::Int16
        | ValueEncoding::Int32
        | ValueEncoding::Int32Swap
        | ValueEncoding::Int64
        | ValueEncoding::Int64Swap => Ok(Value::Integer(i64::from(bit))),
        other => Err(CodecError::BitMismatch(other)),
    }
}

/// Decode register words.
pub fn decode_words(words: &[u16], encoding: ValueEncoding) -> Result<Value, CodecError> {
    let expected = encoding.word_count() as usize;
    if words.len() < expected {
        return Err(CodecError::TooFewWords {
            encoding,
            expected,
            actual: words.len(),
        });
    }

    let bits = combine(&words[..expected], encoding.is_swapped());

    let value = match encoding {
        ValueEncoding::Int8 => Value::Integer(bits as u8 as i8 as i64),
        ValueEncoding::UInt8 => Value::Integer((bits & 0xFF) as i64),
        ValueEncoding::Int16 => Value::Integer(bits as u16 as i16 as i64),
        ValueEncoding::UInt16 => Value::Integer((bits & 0xFFFF) as i64),
        ValueEncoding::Int32 | ValueEncoding::Int32Swap => {
            Value::Integer(bits as u32 as i32 as i64)
        }
        ValueEncoding::UInt32 | ValueEncoding::UInt32Swap => {
            Value::Integer((bits & 0xFFFF_FFFF) as i64)
        }
        ValueEncoding::Int64 | ValueEncoding::Int64Swap => Value::Integer(bits as i64),
        ValueEncoding::UInt64 | ValueEncoding::UInt64Swap => Value::Unsigned(bits),
        ValueEncoding::Float32 | ValueEncoding::Float32Swap => {
            Value::Number(f32::from_bits(bits as u32) as f64)
        }
        ValueEncoding::Bit => Value::Boolean(bits != 0),
    };

    Ok(value)
}

/// Encode a value into the register words for `encoding`.
///
/// Floats are truncated toward zero for integer encodings. 8-bit encodings
/// occupy the low byte of a single word.
pub fn encode(value: &Value, encoding: ValueEncoding) -> Result<Vec<u16>, CodecError> {
    let count = encoding.word_count();
    let swapped = encoding.is_swapped();

    let bits = match encoding {
        ValueEncoding::Bit => {
            let on = match value {
                Value::Boolean(b) => *b,
                other => other.as_f64().ok_or(CodecError::NotNumeric {
                    kind: other.kind(),
                    encoding,
                })? != 0.0,
            };
            u64::from(on)
        }
        ValueEncoding::Float32 | ValueEncoding::Float32Swap => {
            let v = value.as_f64().ok_or(CodecError::NotNumeric {
                kind: value.kind(),
                encoding,
            })?;
            let narrowed = v as f32;
            if v.is_finite() && !narrowed.is_finite() {
                return Err(CodecError::OutOfRange {
                    value: v.to_string(),
                    encoding,
                });
            }
            u64::from(narrowed.to_bits())
        }
        _ => {
            let v = integer_of(value, encoding)?;
            let (min, max) = integer_range(encoding);
            if v < min || v > max {
                return Err(CodecError::OutOfRange {
                    value: v.to_string(),
                    encoding,
                });
            }
            match encoding {
                ValueEncoding::Int8 | ValueEncoding::UInt8 => v as u64 & 0xFF,
                _ => v as u64,
            }
        }
    };

    Ok(split(bits, count, swapped))
}

fn integer_of(value: &Value, encoding: ValueEncoding) -> Result<i128, CodecError> {
    match value {
        Value::Integer(v) => Ok(i128::from(*v)),
        Value::Unsigned(v) => Ok(i128::from(*v)),
        Value::Number(v) if v.is_finite() => Ok(v.trunc() as i128),
        Value::Number(v) => Err(CodecError::OutOfRange {
            value: v.to_string(),
            encoding,
        }),
        other => Err(CodecError::NotNumeric {
            kind: other.kind(),
            encoding,
        }),
    }
}

/// Accepted integer range: the union of the signed and unsigned ranges of
/// the encoding's width.
fn integer_range(encoding: ValueEncoding) -> (i128, i128) {
    match encoding.word_count() {
        1 if matches!(encoding, ValueEncoding::Int8 | ValueEncoding::UInt8) => {
            (i128::from(i8::MIN), i128::from(u8::MAX))
        }
        1 => (i128::from(i16::MIN), i128::from(u16::MAX)),
        2 => (i128::from(i32::MIN), i128::from(u32::MAX)),
        _ => (i128::from(i64::MIN), i128::from(u64::MAX)),
    }
}

fn combine(words: &[u16], swapped: bool) -> u64 {
    let fold = |acc: u64, w: &u16| (acc << 16) | u64::from(*w);
    if swapped {
        words.iter().rev().fold(0, fold)
    } else {
        words.iter().fold(0, fold)
    }
}

fn split(bits: u64, count: u16, swapped: bool) -> Vec<u16> {
    let mut words: Vec<u16> = (0..count)
        .rev()
        .map(|i| (bits >> (16 * u32::from(i))) as u16)
        .collect();
    if swapped {
        words.reverse();
    }
    words
}
