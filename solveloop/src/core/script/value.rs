use std::fmt;

use serde_json::{Number, Value};

/// Runtime value of the script language.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// Numeric view used by mixed int/float arithmetic. Bools are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    /// Convert to JSON for the executor's result slot.
    ///
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Float(x) => Number::from_f64(*x).map(Value::Number).unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{x:.1}")
            }
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_floats_keep_decimal_point() {
        assert_eq!(ScriptValue::Float(2.0).to_string(), "2.0");
        assert_eq!(ScriptValue::Float(2.5).to_string(), "2.5");
        assert_eq!(ScriptValue::Int(2).to_string(), "2");
    }

    #[test]
    fn nan_serializes_as_null() {
        assert_eq!(ScriptValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(ScriptValue::Int(4).to_json(), Value::from(4));
    }
}
