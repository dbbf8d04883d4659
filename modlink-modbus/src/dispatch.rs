//! Mapping of register-space operations onto transport calls.

use modlink_common::Value;
use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{self, RawValue};
use crate::config::{RegisterSpace, ValueEncoding, WriteValueEncoding};
use crate::error::{ModbusError, Result, TransportError};
use crate::transport::ModbusTransport;

/// Issues single reads against a borrowed transport.
pub struct ReadDispatcher<'a, T: ModbusTransport> {
    transport: &'a T,
}

impl<'a, T: ModbusTransport> ReadDispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Read one value at `address`.
    ///
    /// Bit spaces always read a single bit. Register spaces read `quantity`
    /// words in one request, which is the word count of the value encoding.
    pub async fn read(
        &self,
        unit_id: u8,
        space: RegisterSpace,
        address: u16,
        quantity: u16,
    ) -> Result<RawValue> {
        debug!(unit_id, space = %space, address, quantity, "Modbus read");

        let raw = match space {
            RegisterSpace::Coil => {
                let bits = self.transport.read_coils(unit_id, address, 1).await?;
                RawValue::Bit(first(bits)?)
            }
            RegisterSpace::Discrete => {
                let bits = self
                    .transport
                    .read_discrete_inputs(unit_id, address, 1)
                    .await?;
                RawValue::Bit(first(bits)?)
            }
            RegisterSpace::Holding => {
                let words = self
                    .transport
                    .read_holding_registers(unit_id, address, quantity.max(1))
                    .await?;
                RawValue::Words(non_empty(words)?)
            }
            RegisterSpace::Input => {
                let words = self
                    .transport
                    .read_input_registers(unit_id, address, quantity.max(1))
                    .await?;
                RawValue::Words(non_empty(words)?)
            }
        };

        Ok(raw)
    }
}

fn first(bits: Vec<bool>) -> std::result::Result<bool, TransportError> {
    bits.first().copied().ok_or(TransportError::EmptyResponse)
}

fn non_empty(words: Vec<u16>) -> std::result::Result<Vec<u16>, TransportError> {
    if words.is_empty() {
        Err(TransportError::EmptyResponse)
    } else {
        Ok(words)
    }
}

/// Acknowledgment of a completed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteAck {
    pub unit_id: u8,
    pub space: RegisterSpace,
    pub address: u16,
    /// Words written to holding registers; a single 0/1 word for coils.
    pub words: Vec<u16>,
}

/// Issues writes against a borrowed transport.
pub struct WriteDispatcher<'a, T: ModbusTransport> {
    transport: &'a T,
}

impl<'a, T: ModbusTransport> WriteDispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Write `value` to `address`.
    ///
    /// Invalid spaces and values are rejected before any transport call.
    pub async fn write(
        &self,
        unit_id: u8,
        space: RegisterSpace,
        address: u16,
        encoding: WriteValueEncoding,
        value: &Value,
    ) -> Result<WriteAck> {
        match space {
            RegisterSpace::Coil => {
                let on = coil_state(value)?;
                info!(unit_id, address, value = on, "Writing coil");
                self.transport
                    .write_single_coil(unit_id, address, on)
                    .await?;
                Ok(WriteAck {
                    unit_id,
                    space,
                    address,
                    words: vec![u16::from(on)],
                })
            }
            RegisterSpace::Holding => {
                let encoding = ValueEncoding::from(encoding);
                let accepts = value.is_numeric()
                    || (encoding == ValueEncoding::Bit && matches!(value, Value::Boolean(_)));
                if !accepts {
                    return Err(ModbusError::invalid_argument(format!(
                        "cannot write non-numeric {} value '{}' to a holding register",
                        value.kind(),
                        value
                    )));
                }

                let words = codec::encode(value, encoding)?;
                info!(unit_id, address, encoding = ?encoding, words = ?words, "Writing holding register(s)");

                match words.as_slice() {
                    [word] => {
                        self.transport
                            .write_single_register(unit_id, address, *word)
                            .await?
                    }
                    many => {
                        self.transport
                            .write_multiple_registers(unit_id, address, many)
                            .await?
                    }
                }

                Ok(WriteAck {
                    unit_id,
                    space,
                    address,
                    words,
                })
            }
            RegisterSpace::Discrete | RegisterSpace::Input => Err(ModbusError::unsupported(
                format!("{} is a read-only register space", space),
            )),
        }
    }
}

/// Coil state for a value: `true` or any nonzero number switches the coil on.
fn coil_state(value: &Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Text(s) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") => Ok(true),
            t if t.eq_ignore_ascii_case("false") => Ok(false),
            t => t.parse::<f64>().map(|v| v != 0.0).map_err(|_| {
                ModbusError::invalid_argument(format!("cannot write '{}' to a coil", s))
            }),
        },
        other => other.as_f64().map(|v| v != 0.0).ok_or_else(|| {
            ModbusError::invalid_argument(format!("cannot write {} value to a coil", other.kind()))
        }),
    }
}
