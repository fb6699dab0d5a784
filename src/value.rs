//! Value
//!
//! The tagged variant carried in every key, value and metadata slot.
//!
//! ## Serialized Form
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ Type: u32 LE │ Size: u32 LE │ Payload (Size bytes) │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//! Strings are written without a terminator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Size of the `[type][size]` prefix
pub const VALUE_HEADER_SIZE: usize = 8;

const TYPE_INT: u32 = 0;
const TYPE_DOUBLE: u32 = 1;
const TYPE_STRING: u32 = 2;
const TYPE_RAW: u32 = 3;
const TYPE_NONE: u32 = 4;

/// A key, value or metadata item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    None,
    Int(i32),
    Double(f64),
    String(Vec<u8>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The string payload, if this is a ByteString holding valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    fn type_code(&self) -> u32 {
        match self {
            Value::None => TYPE_NONE,
            Value::Int(_) => TYPE_INT,
            Value::Double(_) => TYPE_DOUBLE,
            Value::String(_) => TYPE_STRING,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Value::None => 0,
            Value::Int(_) => 4,
            Value::Double(_) => 8,
            Value::String(bytes) => bytes.len(),
        }
    }

    /// Bytes needed by `serialize`
    pub fn serialized_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.payload_len()
    }

    /// Serialize into `buf`, returning the number of bytes written
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.serialized_size();
        if buf.len() < needed {
            return Err(HubError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        buf[0..4].copy_from_slice(&self.type_code().to_le_bytes());
        buf[4..8].copy_from_slice(&(self.payload_len() as u32).to_le_bytes());

        let payload = &mut buf[VALUE_HEADER_SIZE..needed];
        match self {
            Value::None => {}
            Value::Int(v) => payload.copy_from_slice(&v.to_le_bytes()),
            Value::Double(v) => payload.copy_from_slice(&v.to_le_bytes()),
            Value::String(bytes) => payload.copy_from_slice(bytes),
        }

        Ok(needed)
    }

    /// Serialize into a freshly allocated buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.serialized_size()];
        // The buffer is sized exactly, so this cannot fail
        let _ = self.serialize(&mut buf);
        buf
    }

    /// Deserialize from `buf`, returning the value and the bytes consumed
    pub fn deserialize(buf: &[u8]) -> Result<(Value, usize)> {
        if buf.len() < VALUE_HEADER_SIZE {
            return Err(HubError::InvalidData(format!(
                "truncated header: {} bytes",
                buf.len()
            )));
        }

        let type_code = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        let end = VALUE_HEADER_SIZE
            .checked_add(size)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| {
                HubError::InvalidData(format!(
                    "payload of {} bytes exceeds buffer of {}",
                    size,
                    buf.len() - VALUE_HEADER_SIZE
                ))
            })?;
        let payload = &buf[VALUE_HEADER_SIZE..end];

        let value = match type_code {
            TYPE_NONE => Value::None,
            TYPE_INT => {
                let bytes: [u8; 4] = payload.try_into().map_err(|_| {
                    HubError::InvalidData(format!("int payload must be 4 bytes, got {}", size))
                })?;
                Value::Int(i32::from_le_bytes(bytes))
            }
            TYPE_DOUBLE => {
                let bytes: [u8; 8] = payload.try_into().map_err(|_| {
                    HubError::InvalidData(format!("double payload must be 8 bytes, got {}", size))
                })?;
                Value::Double(f64::from_le_bytes(bytes))
            }
            TYPE_STRING | TYPE_RAW => Value::String(payload.to_vec()),
            other => {
                return Err(HubError::InvalidData(format!("unknown type code {}", other)));
            }
        };

        Ok((value, end))
    }

    /// Deserialize a buffer holding exactly one value
    pub fn from_bytes(buf: &[u8]) -> Result<Value> {
        Value::deserialize(buf).map(|(value, _)| value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "(none)"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::String(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::String(v.to_vec())
    }
}
