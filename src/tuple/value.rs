use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{Result, StrataError};

use super::DataType;

/// A typed value held in a tuple. Null is typeless and compares before
/// every non-null value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Serializes this value into `buf` according to `data_type`. Null is
    /// not written here; the tuple's null bitmap encodes it.
    pub fn serialize_into(&self, data_type: &DataType, buf: &mut Vec<u8>) -> Result<()> {
        match (self, data_type) {
            (Value::Null, _) => Ok(()),
            (Value::Boolean(b), DataType::Boolean) => {
                buf.put_u8(u8::from(*b));
                Ok(())
            }
            (Value::Integer(v), DataType::Integer) => {
                buf.put_i32_le(*v);
                Ok(())
            }
            (Value::Integer(v), DataType::BigInt) => {
                buf.put_i64_le(*v as i64);
                Ok(())
            }
            (Value::BigInt(v), DataType::BigInt) => {
                buf.put_i64_le(*v);
                Ok(())
            }
            (Value::String(s), DataType::VarChar(max_len)) => {
                if s.len() > *max_len as usize {
                    return Err(StrataError::ExecutionFailure(format!(
                        "string of {} bytes exceeds VARCHAR({max_len})",
                        s.len()
                    )));
                }
                buf.put_u16_le(s.len() as u16);
                buf.put_slice(s.as_bytes());
                Ok(())
            }
            (value, data_type) => Err(StrataError::ExecutionFailure(format!(
                "cannot store {value} as {data_type}"
            ))),
        }
    }

    /// Reads one value of `data_type` from the front of `buf`.
    pub fn deserialize_from(data_type: &DataType, buf: &mut &[u8]) -> Result<Value> {
        let short = || StrataError::ExecutionFailure("truncated tuple data".into());
        match data_type {
            DataType::Boolean => {
                if buf.remaining() < 1 {
                    return Err(short());
                }
                Ok(Value::Boolean(buf.get_u8() != 0))
            }
            DataType::Integer => {
                if buf.remaining() < 4 {
                    return Err(short());
                }
                Ok(Value::Integer(buf.get_i32_le()))
            }
            DataType::BigInt => {
                if buf.remaining() < 8 {
                    return Err(short());
                }
                Ok(Value::BigInt(buf.get_i64_le()))
            }
            DataType::VarChar(_) => {
                if buf.remaining() < 2 {
                    return Err(short());
                }
                let len = buf.get_u16_le() as usize;
                if buf.remaining() < len {
                    return Err(short());
                }
                let s = String::from_utf8_lossy(&buf.chunk()[..len]).into_owned();
                buf.advance(len);
                Ok(Value::String(s))
            }
        }
    }

    /// Total order used by sort and top-N: Null first, then by value.
    /// Integers and bigints compare numerically across widths.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => Ordering::Equal,
            },
        }
    }

    /// Join-key equality: nulls never match.
    pub fn eq_joinable(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.compare(other) == Ordering::Equal
    }

    /// Encodes this value as a fixed-width index key, zero-padded on the
    /// right. Integers serialize little-endian to pair with the integer
    /// comparators; strings pair with the bytewise comparator.
    pub fn to_key_bytes(&self, width: usize) -> Result<Vec<u8>> {
        let mut key = vec![0u8; width];
        match self {
            Value::Integer(v) => {
                if width < 4 {
                    return Err(StrataError::UnsupportedKeyWidth(width));
                }
                key[..4].copy_from_slice(&v.to_le_bytes());
            }
            Value::BigInt(v) => {
                if width < 8 {
                    return Err(StrataError::UnsupportedKeyWidth(width));
                }
                key[..8].copy_from_slice(&v.to_le_bytes());
            }
            Value::String(s) => {
                if s.len() > width {
                    return Err(StrataError::ExecutionFailure(format!(
                        "string key of {} bytes exceeds key width {width}",
                        s.len()
                    )));
                }
                key[..s.len()].copy_from_slice(s.as_bytes());
            }
            other => {
                return Err(StrataError::ExecutionFailure(format!(
                    "{other} cannot be an index key"
                )))
            }
        }
        Ok(key)
    }

    /// Hash contribution for hash-join keys.
    pub fn hash_value(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            Value::Null => 0u8.hash(&mut hasher),
            Value::Boolean(b) => b.hash(&mut hasher),
            // Hash integers through i64 so Integer(5) and BigInt(5) agree
            Value::Integer(v) => (*v as i64).hash(&mut hasher),
            Value::BigInt(v) => v.hash(&mut hasher),
            Value::String(s) => s.hash(&mut hasher),
        }
        hasher.finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}
