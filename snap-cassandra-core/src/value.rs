//! Normalization of metric data into the store's scalar value model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PublishError, PublishResult};
use crate::metric::MetricData;

/// The three scalar shapes the metrics tables can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalizedValue {
    Double(f64),
    Text(String),
    Boolean(bool),
}

/// Discriminator stored in the `valType` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Double,
    Text,
    Boolean,
}

impl ValueType {
    pub const ALL: [ValueType; 3] = [ValueType::Double, ValueType::Text, ValueType::Boolean];

    /// Label written to the `valType` column
    pub fn label(self) -> &'static str {
        match self {
            ValueType::Double => "doubleval",
            ValueType::Text => "strval",
            ValueType::Boolean => "boolval",
        }
    }

    /// Name of the value column populated for this type
    pub fn column(self) -> &'static str {
        match self {
            ValueType::Double => "doubleVal",
            ValueType::Text => "strVal",
            ValueType::Boolean => "boolVal",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl NormalizedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            NormalizedValue::Double(_) => ValueType::Double,
            NormalizedValue::Text(_) => ValueType::Text,
            NormalizedValue::Boolean(_) => ValueType::Boolean,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            NormalizedValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NormalizedValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NormalizedValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// Map metric data onto a storable scalar.
///
/// Integers and floats of every width widen to `Double`; booleans and strings
/// pass through. Lists, maps and null have no column to live in.
pub fn normalize(data: &MetricData) -> PublishResult<NormalizedValue> {
    let value = match data {
        MetricData::I8(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::I16(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::I32(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::I64(v) => NormalizedValue::Double(*v as f64),
        MetricData::U8(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::U16(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::U32(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::U64(v) => NormalizedValue::Double(*v as f64),
        MetricData::F32(v) => NormalizedValue::Double(f64::from(*v)),
        MetricData::F64(v) => NormalizedValue::Double(*v),
        MetricData::Bool(v) => NormalizedValue::Boolean(*v),
        MetricData::Text(v) => NormalizedValue::Text(v.clone()),
        MetricData::List(_) | MetricData::Map(_) | MetricData::Null => {
            return Err(PublishError::InvalidDataType(data.to_string()));
        }
    };
    Ok(value)
}

impl TryFrom<&MetricData> for NormalizedValue {
    type Error = PublishError;

    fn try_from(data: &MetricData) -> PublishResult<Self> {
        normalize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_all_numeric_widths_widen_to_double() {
        let cases: Vec<(MetricData, f64)> = vec![
            (MetricData::from(-8i8), -8.0),
            (MetricData::from(-16i16), -16.0),
            (MetricData::from(-32i32), -32.0),
            (MetricData::from(-64i64), -64.0),
            (MetricData::from(8u8), 8.0),
            (MetricData::from(16u16), 16.0),
            (MetricData::from(32u32), 32.0),
            (MetricData::from(64u64), 64.0),
            (MetricData::from(1.5f32), 1.5),
            (MetricData::from(3.141f64), 3.141),
        ];

        for (input, expected) in cases {
            let normalized = normalize(&input).unwrap();
            assert_eq!(normalized, NormalizedValue::Double(expected), "input {:?}", input);
            assert_eq!(normalized.value_type(), ValueType::Double);
        }
    }

    #[test]
    fn test_bool_and_string_pass_through() {
        assert_eq!(
            normalize(&MetricData::from(true)).unwrap(),
            NormalizedValue::Boolean(true)
        );
        assert_eq!(
            normalize(&MetricData::from("bar")).unwrap(),
            NormalizedValue::Text("bar".to_string())
        );
    }

    #[test]
    fn test_composites_are_rejected() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), MetricData::I64(1));

        for input in [
            MetricData::Map(fields),
            MetricData::List(vec![MetricData::I64(1)]),
            MetricData::Null,
        ] {
            match normalize(&input) {
                Err(PublishError::InvalidDataType(rendered)) => {
                    assert_eq!(rendered, input.to_string());
                }
                other => panic!("Expected InvalidDataType for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_value_type_labels_are_stable() {
        assert_eq!(ValueType::Double.label(), "doubleval");
        assert_eq!(ValueType::Text.label(), "strval");
        assert_eq!(ValueType::Boolean.label(), "boolval");
        assert_eq!(ValueType::Double.column(), "doubleVal");
        assert_eq!(ValueType::Text.column(), "strVal");
        assert_eq!(ValueType::Boolean.column(), "boolVal");
    }
}
