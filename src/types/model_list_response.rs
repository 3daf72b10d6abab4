use serde::{Deserialize, Serialize};

/// Response from `GET models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListResponse {
    /// The models the endpoint serves, in the endpoint's order.
    pub data: Vec<ModelInfo>,
}

/// One entry of a [`ModelListResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique model identifier.
    pub id: String,

    /// Organization owning the model, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,

    /// Unix timestamp of model creation, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
}

impl ModelListResponse {
    /// The model identifiers, in order.
    pub fn ids(&self) -> Vec<String> {
        self.data.iter().map(|model| model.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_list_deserialization() {
        let json = serde_json::json!({
            "object": "list",
            "data": [
                {"id": "modelA", "object": "model", "created": 1686935002, "owned_by": "org"},
                {"id": "modelB", "object": "model"}
            ]
        });
        let response: ModelListResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.ids(), vec!["modelA".to_string(), "modelB".to_string()]);
        assert_eq!(response.data[0].owned_by.as_deref(), Some("org"));
        assert_eq!(response.data[1].created, None);
    }

    #[test]
    fn missing_data_is_an_error() {
        let json = serde_json::json!({"object": "list"});
        assert!(serde_json::from_value::<ModelListResponse>(json).is_err());
    }
}
