use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user's profile row, kept as the backend returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Map<String, Value>);

impl Profile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Profile(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Row id rendered as text, whether stored as string or number
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.0.get("full_name").and_then(Value::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    pub fn restaurant_id(&self) -> Option<&str> {
        self.0.get("restaurant_id").and_then(Value::as_str)
    }

    /// Shallow merge: top-level keys in `updates` overwrite ours
    pub fn merge(&mut self, updates: &Map<String, Value>) {
        for (key, value) in updates {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Profile {
    fn from(fields: Map<String, Value>) -> Self {
        Profile(fields)
    }
}

/// Profile details collected at registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub full_name: String,
    pub role: Option<String>,
    pub restaurant_id: Option<String>,
}

impl UserData {
    /// Account metadata in the backend's snake_case keys
    pub fn to_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("full_name".to_string(), Value::String(self.full_name.clone()));
        metadata.insert("role".to_string(), self.role.clone().map(Value::String).unwrap_or(Value::Null));
        metadata.insert(
            "restaurant_id".to_string(),
            self.restaurant_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: Value) -> Profile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut p = profile(json!({"id": 1, "name": "A", "prefs": {"theme": "dark", "lang": "en"}}));
        let updates = json!({"phone": "x", "prefs": {"theme": "light"}});
        p.merge(updates.as_object().unwrap());

        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"id": 1, "name": "A", "phone": "x", "prefs": {"theme": "light"}})
        );
    }

    #[test]
    fn test_numeric_id_renders_as_text() {
        assert_eq!(profile(json!({"id": 7})).id().as_deref(), Some("7"));
        assert_eq!(profile(json!({"name": "no id"})).id(), None);
    }

    #[test]
    fn test_user_data_metadata_keys() {
        let data = UserData {
            full_name: "Ada Waiter".to_string(),
            role: Some("waiter".to_string()),
            restaurant_id: None,
        };
        assert_eq!(
            Value::Object(data.to_metadata()),
            json!({"full_name": "Ada Waiter", "role": "waiter", "restaurant_id": null})
        );
    }
}
