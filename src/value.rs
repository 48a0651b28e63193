use std::fmt;

use serde::{Deserialize, Serialize};

/// ParameterValue is the tagged union of scalar values a platform parameter
/// may hold, keyed by [DataType].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Used when storing a boolean value.
    Bool(bool),
    /// Used when storing a string value.
    Str(String),
    /// Used when storing a number.
    Number(f64),
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> ParameterValue {
        ParameterValue::Bool(b)
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> ParameterValue {
        ParameterValue::Str(s.to_owned())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> ParameterValue {
        ParameterValue::Str(s)
    }
}

impl From<f64> for ParameterValue {
    fn from(f: f64) -> ParameterValue {
        ParameterValue::Number(f)
    }
}

impl ParameterValue {
    /// Returns None unless self is a Bool. It will not convert.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns None unless self is a Str. It will not convert.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns None unless self is a Number. It will not convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(f) => Some(*f),
            _ => None,
        }
    }

    pub(crate) fn is_true(&self) -> bool {
        matches!(self, ParameterValue::Bool(true))
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Str(s) => write!(f, "'{}'", s),
            ParameterValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// The declared type of a platform parameter, constraining its default value
/// and every rule outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean parameters; the only type feature flags may have.
    Bool,
    /// Free-form string parameters.
    String,
    /// Numeric parameters, stored as `f64`.
    Number,
}

impl DataType {
    /// Whether the given value conforms to this data type.
    pub fn matches(&self, value: &ParameterValue) -> bool {
        matches!(
            (self, value),
            (DataType::Bool, ParameterValue::Bool(_))
                | (DataType::String, ParameterValue::Str(_))
                | (DataType::Number, ParameterValue::Number(_))
        )
    }

    /// The type-appropriate zero value used when a parameter is first
    /// registered.
    pub fn default_value(&self) -> ParameterValue {
        match self {
            DataType::Bool => ParameterValue::Bool(false),
            DataType::String => ParameterValue::Str(String::new()),
            DataType::Number => ParameterValue::Number(0.0),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::String => "string",
            DataType::Number => "number",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test]
    fn untagged_serde_round_trip() {
        let cases = vec![
            (r#"true"#, ParameterValue::Bool(true)),
            (r#""333""#, ParameterValue::Str("333".to_string())),
            (r#"42.5"#, ParameterValue::Number(42.5)),
            (r#"7"#, ParameterValue::Number(7.0)),
        ];
        for (json, expected) in cases {
            let value: ParameterValue = serde_json::from_str(json).unwrap();
            assert_eq!(value, expected);
        }
        assert_eq!(
            serde_json::to_string(&ParameterValue::Str("333".to_string())).unwrap(),
            r#""333""#
        );
    }

    #[test_case(DataType::Bool, ParameterValue::Bool(false), true)]
    #[test_case(DataType::Bool, ParameterValue::Str("false".to_string()), false)]
    #[test_case(DataType::String, ParameterValue::Str("x".to_string()), true)]
    #[test_case(DataType::String, ParameterValue::Number(1.0), false)]
    #[test_case(DataType::Number, ParameterValue::Number(1.0), true)]
    #[test_case(DataType::Number, ParameterValue::Bool(true), false)]
    fn data_type_conformance(data_type: DataType, value: ParameterValue, expected: bool) {
        assert_eq!(data_type.matches(&value), expected);
    }

    #[test]
    fn zero_defaults_match_their_type() {
        for data_type in [DataType::Bool, DataType::String, DataType::Number] {
            asserting!("default conforms")
                .that(&data_type.matches(&data_type.default_value()))
                .is_true();
        }
        assert_eq!(DataType::Bool.default_value(), ParameterValue::Bool(false));
        assert_eq!(
            DataType::String.default_value(),
            ParameterValue::Str(String::new())
        );
        assert_eq!(DataType::Number.default_value(), ParameterValue::Number(0.0));
    }

    #[test]
    fn accessors_do_not_convert() {
        assert_that!(ParameterValue::Bool(true).as_bool()).contains_value(true);
        assert_that!(ParameterValue::Str("x".to_string()).as_bool()).is_none();
        assert_that!(ParameterValue::Number(1.5).as_f64()).contains_value(1.5);
        assert_that!(ParameterValue::Bool(true).as_str()).is_none();
    }
}
