use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Open key-value mapping used for session `config` and node `meta`.
/// Ordered so snapshots serialize deterministically.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Named numeric metrics assigned to a candidate by a selector.
pub type Scores = BTreeMap<String, f64>;

/// The closed set of values an open mapping may hold.
///
/// Serialized untagged, so on the wire it is a plain JSON boolean, number or string.
/// Integral numbers read back as `Int`, everything else numeric as `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// False only for NaN or infinite floats, which JSON cannot carry.
    pub fn is_finite(&self) -> bool {
        match self {
            MetaValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

/// Key of the first entry holding a non-finite float.
pub fn non_finite_meta_key(meta: &Metadata) -> Option<&str> {
    meta.iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(key, _)| key.as_str())
}

/// Key of the first non-finite score.
pub fn non_finite_score_key(scores: &Scores) -> Option<&str> {
    scores
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(key, _)| key.as_str())
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}
