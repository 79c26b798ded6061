//! Conversions between JSON values and wire `Struct` caveat contexts.

use std::collections::BTreeMap;

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value};

/// Converts a JSON object into a wire `Struct`.
#[must_use]
pub fn json_to_struct(map: serde_json::Map<String, serde_json::Value>) -> Struct {
    let fields: BTreeMap<String, Value> = map
        .into_iter()
        .map(|(k, v)| (k, json_to_value(v)))
        .collect();
    Struct { fields }
}

fn json_to_value(value: serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(json_to_struct(map)),
    };
    Value { kind: Some(kind) }
}

/// Converts a wire `Struct` back into a JSON value.
#[must_use]
pub fn struct_to_json(s: &Struct) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = s
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    serde_json::Value::Object(map)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => struct_to_json(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_through_struct() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"cidr":"10.0.0.0/8","limit":3,"nested":{"ok":true},"tags":["a","b"],"none":null}"#,
        )
        .unwrap();
        let serde_json::Value::Object(map) = json.clone() else {
            panic!("expected object");
        };
        let s = json_to_struct(map);
        assert_eq!(struct_to_json(&s), json);
    }
}
