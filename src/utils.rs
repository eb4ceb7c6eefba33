use serde_json::{Map, Value};

pub trait TrustMe<T>: Sized {
    #[track_caller]
    fn trust_me(self) -> T;
}

impl<T, E> TrustMe<T> for Result<T, E>
where
    E: std::fmt::Debug,
{
    #[track_caller]
    fn trust_me(self) -> T {
        self.expect("Shouldn't fail")
    }
}

/// Recursively merges `patch` into `target`.
///
/// Nested objects are merged key by key. Any other value (arrays, scalars
/// and `null` included) replaces the previous one as a whole.
pub fn merge_json(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Object(value) => match target.get_mut(&key) {
                Some(Value::Object(existing)) => merge_json(existing, value),
                _ => {
                    target.insert(key, Value::Object(value));
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn merge_keeps_unrelated_keys() {
        let mut target = object(json!({ "a": 1, "nested": { "x": 1, "y": 2 } }));
        merge_json(&mut target, object(json!({ "b": 2, "nested": { "y": 3 } })));

        assert_eq!(
            Value::Object(target),
            json!({ "a": 1, "b": 2, "nested": { "x": 1, "y": 3 } })
        );
    }

    #[test]
    fn merge_replaces_arrays() {
        let mut target = object(json!({ "list": [1, 2, 3] }));
        merge_json(&mut target, object(json!({ "list": [4] })));
        assert_eq!(target["list"], json!([4]));
    }

    #[test]
    fn merge_object_over_scalar() {
        let mut target = object(json!({ "provider": "mainnet" }));
        merge_json(&mut target, object(json!({ "provider": { "type": "rpc" } })));
        assert_eq!(target["provider"], json!({ "type": "rpc" }));

        merge_json(&mut target, object(json!({ "provider": null })));
        assert_eq!(target["provider"], Value::Null);
    }
}
