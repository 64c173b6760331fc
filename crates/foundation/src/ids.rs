use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Key of a legend group (e.g. `Aktuell`).
    GroupId
);
string_id!(
    /// Key of a logical legend layer. One legend layer may drive several engine layers.
    LayerId
);
string_id!(
    /// Id of a layer registered with the map engine.
    EngineLayerId
);
string_id!(
    /// Id of a source registered with the map engine.
    SourceId
);

impl From<&LayerId> for EngineLayerId {
    fn from(id: &LayerId) -> Self {
        EngineLayerId(id.0.clone())
    }
}

/// Identifier of a map feature (station, shift, GPS point, ...).
///
/// Tile services emit both textual and numeric ids, so both are kept verbatim.
/// Serializes untagged so it drops straight into filter expressions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(i64),
    Text(String),
}

impl FeatureId {
    /// Converts a JSON property value into an id. Floats and non-scalars are rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(FeatureId::Text(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(FeatureId::Number),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FeatureId::Number(n) => serde_json::Value::from(*n),
            FeatureId::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::Number(n) => write!(f, "{n}"),
            FeatureId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        FeatureId::Text(id.to_string())
    }
}

impl From<i64> for FeatureId {
    fn from(id: i64) -> Self {
        FeatureId::Number(id)
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineLayerId, FeatureId, LayerId};
    use serde_json::json;

    #[test]
    fn engine_layer_id_from_legend_layer_id() {
        let layer = LayerId::new("gw-flurabstand");
        assert_eq!(EngineLayerId::from(&layer).as_str(), "gw-flurabstand");
    }

    #[test]
    fn feature_id_from_json_scalars() {
        assert_eq!(FeatureId::from_json(&json!("st-1")), Some(FeatureId::from("st-1")));
        assert_eq!(FeatureId::from_json(&json!(42)), Some(FeatureId::from(42_i64)));
        assert_eq!(FeatureId::from_json(&json!(4.5)), None);
        assert_eq!(FeatureId::from_json(&json!(null)), None);
    }

    #[test]
    fn feature_id_serializes_untagged() {
        let ids = vec![FeatureId::from(7), FeatureId::from("a")];
        assert_eq!(serde_json::to_value(&ids).unwrap(), json!([7, "a"]));
    }
}
