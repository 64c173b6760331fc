use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Map engine filter predicate in the engine's legacy array syntax.
///
/// Wire forms:
/// - `Eq`  → `["==", key, value]`
/// - `In`  → `["in", key, v1, v2, ...]` (no values matches nothing)
/// - `Has` → `["has", key]`
/// - `All` → `["all", e1, e2, ...]` (no operands matches everything)
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Eq { key: String, value: Value },
    In { key: String, values: Vec<Value> },
    Has(String),
    All(Vec<Expression>),
}

impl Expression {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn in_list<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expression::In {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(key: impl Into<String>) -> Self {
        Expression::Has(key.into())
    }

    /// Conjunction of `operands`. Nested conjunctions are flattened and a single operand
    /// is returned as-is.
    pub fn all(operands: impl IntoIterator<Item = Expression>) -> Self {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                Expression::All(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Expression::All(flat)
    }

    /// Predicate that matches no feature: `["==", key, ""]`. Feature ids are never empty.
    pub fn match_nothing(key: impl Into<String>) -> Self {
        Expression::eq(key, "")
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expression::Eq { key, value } => {
                Value::Array(vec!["==".into(), key.as_str().into(), value.clone()])
            }
            Expression::In { key, values } => {
                let mut arr = Vec::with_capacity(values.len() + 2);
                arr.push("in".into());
                arr.push(key.as_str().into());
                arr.extend(values.iter().cloned());
                Value::Array(arr)
            }
            Expression::Has(key) => Value::Array(vec!["has".into(), key.as_str().into()]),
            Expression::All(ops) => {
                let mut arr = Vec::with_capacity(ops.len() + 1);
                arr.push("all".into());
                arr.extend(ops.iter().map(Expression::to_json));
                Value::Array(arr)
            }
        }
    }

    /// Evaluates the predicate against a feature's properties.
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            Expression::Eq { key, value } => properties
                .get(key)
                .is_some_and(|v| values_equal(v, value)),
            Expression::In { key, values } => properties
                .get(key)
                .is_some_and(|v| values.iter().any(|candidate| values_equal(v, candidate))),
            Expression::Has(key) => properties.contains_key(key),
            Expression::All(ops) => ops.iter().all(|op| op.matches(properties)),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Expression;
    use serde_json::{Map, Value, json};

    fn props(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn wire_forms() {
        assert_eq!(Expression::eq("id", "st-1").to_json(), json!(["==", "id", "st-1"]));
        assert_eq!(
            Expression::in_list("shift_id", [1, 2]).to_json(),
            json!(["in", "shift_id", 1, 2])
        );
        assert_eq!(Expression::has("spray_avg_state").to_json(), json!(["has", "spray_avg_state"]));
        assert_eq!(
            Expression::all([Expression::eq("a", 1), Expression::has("b")]).to_json(),
            json!(["all", ["==", "a", 1], ["has", "b"]])
        );
    }

    #[test]
    fn all_flattens_and_unwraps_single_operand() {
        let inner = Expression::all([Expression::eq("a", 1), Expression::eq("b", 2)]);
        let outer = Expression::all([inner, Expression::eq("c", 3)]);
        assert_eq!(
            outer,
            Expression::All(vec![
                Expression::eq("a", 1),
                Expression::eq("b", 2),
                Expression::eq("c", 3),
            ])
        );
        assert_eq!(Expression::all([Expression::has("x")]), Expression::has("x"));
    }

    #[test]
    fn evaluates_against_properties() {
        let p = props(json!({"shift_id": 7, "vehicle_direction": "DIRECTION_FORWARD"}));
        assert!(Expression::in_list("shift_id", [5, 7]).matches(&p));
        assert!(Expression::eq("shift_id", 7.0).matches(&p));
        assert!(!Expression::in_list("shift_id", Vec::<i64>::new()).matches(&p));
        assert!(!Expression::match_nothing("shift_id").matches(&p));
        assert!(!Expression::eq("missing", "x").matches(&p));
        assert!(Expression::all([]).matches(&p));
    }

    #[test]
    fn serializes_as_wire_form() {
        let s = serde_json::to_string(&Expression::match_nothing("id")).unwrap();
        assert_eq!(s, r#"["==","id",""]"#);
    }
}
