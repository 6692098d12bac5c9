use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A concrete value stored in one slot of a [`Dimension`](crate::Dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Numeric view of the value. Categorical labels have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

/// Resolved parameter values for one position, keyed by dimension name.
pub type Parameters = HashMap<String, ParamValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(ParamValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(ParamValue::Float(4.5).as_i64(), None);
        assert_eq!(ParamValue::from(serde_json::json!(7)).as_f64(), Some(7.0));
        assert_eq!(ParamValue::from("rbf").as_f64(), None);
        assert_eq!(ParamValue::from("rbf").as_str(), Some("rbf"));
    }

    #[test]
    fn untagged_serialization() {
        let json = serde_json::to_string(&ParamValue::Int(-2)).unwrap();
        assert_eq!(json, "-2");
        let back: ParamValue = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(back, ParamValue::from("linear"));
        let float: ParamValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(float, ParamValue::Float(0.25));
    }

    #[test]
    fn display() {
        assert_eq!(ParamValue::Int(5).to_string(), "5");
        assert_eq!(ParamValue::from("poly").to_string(), "\"poly\"");
    }
}
