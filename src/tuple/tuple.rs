use crate::common::{Result, StrataError};

use super::{Schema, Value};

/// A row of values. Tuples serialize against a schema for heap storage:
/// a null bitmap followed by the non-null column values in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Serializes the tuple for storage under `schema`.
    pub fn to_bytes(&self, schema: &Schema) -> Result<Vec<u8>> {
        if self.values.len() != schema.column_count() {
            return Err(StrataError::ExecutionFailure(format!(
                "tuple has {} values but schema has {} columns",
                self.values.len(),
                schema.column_count()
            )));
        }

        let bitmap_len = schema.column_count().div_ceil(8);
        let mut buf = vec![0u8; bitmap_len];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                buf[i / 8] |= 1 << (i % 8);
            }
        }
        for (i, value) in self.values.iter().enumerate() {
            if !value.is_null() {
                value.serialize_into(schema.column(i).data_type(), &mut buf)?;
            }
        }
        Ok(buf)
    }

    /// Reconstructs a tuple stored under `schema`.
    pub fn from_bytes(schema: &Schema, data: &[u8]) -> Result<Tuple> {
        let bitmap_len = schema.column_count().div_ceil(8);
        if data.len() < bitmap_len {
            return Err(StrataError::ExecutionFailure("truncated tuple data".into()));
        }

        let (bitmap, mut rest) = data.split_at(bitmap_len);
        let mut values = Vec::with_capacity(schema.column_count());
        for i in 0..schema.column_count() {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(Value::deserialize_from(
                    schema.column(i).data_type(),
                    &mut rest,
                )?);
            }
        }
        Ok(Tuple::new(values))
    }

    /// Joined row: this tuple's values followed by `right`'s.
    pub fn join(&self, right: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(right.values.iter().cloned());
        Tuple::new(values)
    }

    /// Index key extracted from `column`, encoded at `key_width`.
    pub fn key_from_column(&self, column: usize, key_width: usize) -> Result<Vec<u8>> {
        self.value(column).to_key_bytes(key_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Column, DataType};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::VarChar(16)),
            Column::new("flag", DataType::Boolean),
        ])
    }

    #[test]
    fn test_roundtrip() {
        let schema = schema();
        let tuple = Tuple::new(vec![
            Value::Integer(1),
            Value::String("ada".into()),
            Value::Boolean(true),
        ]);

        let bytes = tuple.to_bytes(&schema).unwrap();
        let back = Tuple::from_bytes(&schema, &bytes).unwrap();
        assert_eq!(back, tuple);
    }

    #[test]
    fn test_roundtrip_with_nulls() {
        let schema = schema();
        let tuple = Tuple::new(vec![Value::Integer(2), Value::Null, Value::Null]);

        let bytes = tuple.to_bytes(&schema).unwrap();
        let back = Tuple::from_bytes(&schema, &bytes).unwrap();
        assert_eq!(back, tuple);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let schema = schema();
        let tuple = Tuple::new(vec![Value::Integer(1)]);
        assert!(tuple.to_bytes(&schema).is_err());
    }

    #[test]
    fn test_join_concatenates_values() {
        let left = Tuple::new(vec![Value::Integer(1)]);
        let right = Tuple::new(vec![Value::Integer(2), Value::Boolean(false)]);
        let joined = left.join(&right);
        assert_eq!(joined.column_count(), 3);
        assert_eq!(joined.value(2), &Value::Boolean(false));
    }
}
