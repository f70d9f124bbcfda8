use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// One response from the case backend. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultPayload {
    pub result: Vec<CaseEntry>,
    pub selected: Vec<Scalar>,
    pub query: Vec<QueryTerm>,
    #[serde(deserialize_with = "lenient_text")]
    pub image_path: Option<String>,
}

impl ResultPayload {
    /// Whether `result[index]` is currently liked.
    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).is_some_and(Scalar::is_one)
    }

    /// `selected` has one flag per case.
    pub fn is_aligned(&self) -> bool {
        self.selected.len() == self.result.len()
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseEntry {
    pub case_id: Scalar,
    pub name: Scalar,
    pub similarity: Scalar,
    pub web_url: Scalar,
    pub image_path: Scalar,
    pub entry: Scalar,
    pub category: Scalar,
    pub topic: Scalar,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTerm {
    pub query: Scalar,
    #[serde(deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// A loosely typed payload value.
///
/// The backend is not strict about field types: `similarity` arrives as a
/// pre-formatted string from the archseek server and as a bare number from
/// other producers, and case ids can be numeric. Anything that is not a
/// plain scalar displays as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl Scalar {
    /// Loose equality with `1`: `1`, `1.0`, `true` and `"1"` all match.
    pub fn is_one(&self) -> bool {
        match self {
            Scalar::Bool(value) => *value,
            Scalar::Int(value) => *value == 1,
            Scalar::Float(value) => *value == 1.0,
            Scalar::Text(text) => text.trim().parse::<f64>().is_ok_and(|value| value == 1.0),
            Scalar::Null | Scalar::Other(_) => false,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Null | Scalar::Other(_)) || self.to_string().is_empty()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null | Scalar::Other(_) => Ok(()),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}
