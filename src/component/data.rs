use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Per-request key/value store shared by a handler's hooks.
///
/// Values are kept as JSON so the same map can be handed to a view
/// renderer or serialized into a response without conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStore {
    values: Map<String, Value>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Serialize `value` and store it under `key`
    pub fn set_serialized<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize the value under `key`; `None` if absent or of another shape
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge every entry of `other` into the store, overwriting on conflict.
    ///
    /// Non-object values are stored whole under the key `"value"`.
    pub fn merge(&mut self, other: Value) {
        match other {
            Value::Object(map) => self.values.extend(map),
            other => {
                self.values.insert("value".to_string(), other);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot of the store as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Post {
        id: u64,
        title: String,
    }

    #[test]
    fn test_set_get_has() {
        let mut data = DataStore::new();
        data.set("count", 3);

        assert!(data.has("count"));
        assert!(!data.has("missing"));
        assert_eq!(data.get("count"), Some(&json!(3)));
        assert_eq!(data.get_as::<u32>("count"), Some(3));
        assert_eq!(data.get_as::<String>("count"), None);
    }

    #[test]
    fn test_merge_overwrites_existing_keys() {
        let mut data = DataStore::new();
        data.set("a", 1);
        data.set("b", 2);

        data.merge(json!({ "b": 20, "c": 30 }));

        assert_eq!(data.to_value(), json!({ "a": 1, "b": 20, "c": 30 }));
    }

    #[test]
    fn test_serialized_values_round_trip() {
        let mut data = DataStore::new();
        let post = Post {
            id: 7,
            title: "hello".into(),
        };
        data.set_serialized("post", &post).unwrap();

        assert_eq!(data.get_as::<Post>("post"), Some(post));
        data.clear();
        assert!(data.is_empty());
    }
}
