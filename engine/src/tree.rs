//! Configuration trees.
//!
//! A [`ConfigTree`] is the semantic snapshot of a desired (or observed)
//! configuration. Maps use [`BTreeMap`] so equality ignores insertion order
//! and traversal is always alphabetical.

use crate::{Error, PatchPath, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field mapping used by maps and present blocks.
pub type Fields = BTreeMap<String, ConfigTree>;

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Canonical textual form expected by the remote API.
    ///
    /// Booleans render as `true`/`false` and floats in fixed-point form with
    /// six fractional digits. Non-finite floats have no wire form.
    pub fn to_wire(&self, path: &PatchPath) -> Result<String> {
        match self {
            Scalar::String(s) => Ok(s.clone()),
            Scalar::Bool(b) => Ok(b.to_string()),
            Scalar::Int(i) => Ok(i.to_string()),
            Scalar::Float(f) if f.is_finite() => Ok(format!("{:.6}", f)),
            Scalar::Float(_) => Err(Error::NonFiniteNumber(path.to_string())),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{}", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{:.6}", x),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
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

/// A configuration value: a scalar, a map, or an optional nested block.
///
/// A block has 0-or-1 cardinality. `Block(None)` means the sub-resource is
/// absent; `Block(Some(fields))` means it is present.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigTree {
    Scalar(Scalar),
    Map(Fields),
    Block(Option<Fields>),
}

impl ConfigTree {
    /// Build a map from `(key, value)` pairs.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigTree)>,
        K: Into<String>,
    {
        ConfigTree::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a present block from `(field, value)` pairs.
    pub fn block<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigTree)>,
        K: Into<String>,
    {
        ConfigTree::Block(Some(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// An absent block.
    pub fn absent() -> Self {
        ConfigTree::Block(None)
    }

    pub fn string(value: impl Into<String>) -> Self {
        ConfigTree::Scalar(Scalar::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        ConfigTree::Scalar(Scalar::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        ConfigTree::Scalar(Scalar::Int(value))
    }

    pub fn float(value: f64) -> Self {
        ConfigTree::Scalar(Scalar::Float(value))
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigTree::Scalar(_) => "scalar",
            ConfigTree::Map(_) => "map",
            ConfigTree::Block(_) => "block",
        }
    }

    /// Convert a JSON document into a tree.
    ///
    /// Objects become maps. Arrays follow the 0-or-1 block convention: `[]`
    /// is an absent block and `[{...}]` a present one. `null` is also read
    /// as an absent block.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Self::from_json_at(value, &PatchPath::root())
    }

    fn from_json_at(value: &serde_json::Value, path: &PatchPath) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(ConfigTree::absent()),
            Value::Bool(b) => Ok(ConfigTree::bool(*b)),
            Value::String(s) => Ok(ConfigTree::string(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ConfigTree::int(i))
                } else {
                    // serde_json never yields NaN or infinity here
                    n.as_f64()
                        .map(ConfigTree::float)
                        .ok_or_else(|| Error::NonFiniteNumber(path.to_string()))
                }
            }
            Value::Object(obj) => Ok(ConfigTree::Map(fields_from_json(obj, path)?)),
            Value::Array(items) => match items.as_slice() {
                [] => Ok(ConfigTree::absent()),
                [Value::Object(obj)] => Ok(ConfigTree::Block(Some(fields_from_json(obj, path)?))),
                [_] => Err(Error::UnsupportedValue {
                    path: path.to_string(),
                    reason: "block element must be an object".into(),
                }),
                _ => Err(Error::UnsupportedValue {
                    path: path.to_string(),
                    reason: format!("block holds at most one element, got {}", items.len()),
                }),
            },
        }
    }

    /// Convert back into JSON, using the same conventions as [`Self::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ConfigTree::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            ConfigTree::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            ConfigTree::Scalar(Scalar::Int(i)) => Value::from(*i),
            ConfigTree::Scalar(Scalar::Float(f)) => Value::from(*f),
            ConfigTree::Map(fields) => Value::Object(fields_to_json(fields)),
            ConfigTree::Block(None) => Value::Array(Vec::new()),
            ConfigTree::Block(Some(fields)) => {
                Value::Array(vec![Value::Object(fields_to_json(fields))])
            }
        }
    }
}

fn fields_from_json(
    obj: &serde_json::Map<String, serde_json::Value>,
    path: &PatchPath,
) -> Result<Fields> {
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), ConfigTree::from_json_at(v, &path.child(k.as_str()))?)))
        .collect()
}

fn fields_to_json(fields: &Fields) -> serde_json::Map<String, serde_json::Value> {
    fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

impl From<Scalar> for ConfigTree {
    fn from(value: Scalar) -> Self {
        ConfigTree::Scalar(value)
    }
}

impl TryFrom<serde_json::Value> for ConfigTree {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        ConfigTree::from_json(&value)
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigTree {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ConfigTree::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_of_scalars() {
        let root = PatchPath::root();
        assert_eq!(Scalar::Bool(true).to_wire(&root).unwrap(), "true");
        assert_eq!(Scalar::Bool(false).to_wire(&root).unwrap(), "false");
        assert_eq!(Scalar::Int(-42).to_wire(&root).unwrap(), "-42");
        assert_eq!(Scalar::Float(12.5).to_wire(&root).unwrap(), "12.500000");
        assert_eq!(Scalar::Float(0.0).to_wire(&root).unwrap(), "0.000000");
        assert_eq!(Scalar::from("x/y").to_wire(&root).unwrap(), "x/y");
    }

    #[test]
    fn non_finite_float_has_no_wire_form() {
        let path = PatchPath::root().child("percentTraffic");
        let err = Scalar::Float(f64::NAN).to_wire(&path).unwrap_err();
        assert_eq!(err, Error::NonFiniteNumber("/percentTraffic".into()));
    }

    #[test]
    fn map_equality_ignores_insertion_order() {
        let a = ConfigTree::map([("a", ConfigTree::string("1")), ("b", ConfigTree::string("2"))]);
        let b = ConfigTree::map([("b", ConfigTree::string("2")), ("a", ConfigTree::string("1"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn from_json_reads_blocks() {
        let tree = ConfigTree::from_json(&json!({
            "description": "prod",
            "cacheClusterEnabled": true,
            "canarySettings": [{"percentTraffic": 12.5}],
            "accessLogSettings": [],
            "variables": {"a": "1"}
        }))
        .unwrap();

        let ConfigTree::Map(fields) = tree else {
            panic!("expected map");
        };
        assert_eq!(fields["accessLogSettings"], ConfigTree::absent());
        assert_eq!(
            fields["canarySettings"],
            ConfigTree::block([("percentTraffic", ConfigTree::float(12.5))])
        );
        assert_eq!(fields["cacheClusterEnabled"], ConfigTree::bool(true));
        assert_eq!(fields["variables"], ConfigTree::map([("a", ConfigTree::string("1"))]));
    }

    #[test]
    fn from_json_integers_stay_integers() {
        assert_eq!(ConfigTree::from_json(&json!(7)).unwrap(), ConfigTree::int(7));
        assert_eq!(ConfigTree::from_json(&json!(7.25)).unwrap(), ConfigTree::float(7.25));
    }

    #[test]
    fn from_json_rejects_multi_element_block() {
        let err = ConfigTree::from_json(&json!({"settings": [{}, {}]})).unwrap_err();
        match err {
            Error::UnsupportedValue { path, .. } => assert_eq!(path, "/settings"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_json_rejects_scalar_block_element() {
        let err = ConfigTree::from_json(&json!({"tags": ["a"]})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue { .. }));
    }

    #[test]
    fn json_conversion_is_stable() {
        let doc = json!({"b": [{"x": false}], "a": {"k": "v"}, "c": []});
        let tree = ConfigTree::from_json(&doc).unwrap();
        assert_eq!(tree.to_json(), doc);

        let via_serde: ConfigTree = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(via_serde, tree);
        assert_eq!(serde_json::to_value(&tree).unwrap(), doc);
    }
}
