use serde_json::{Map, Value, json};
use std::sync::Arc;

pub fn interactive_feedback_schema() -> Arc<Map<String, Value>> {
    let schema = json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": "The specific question for the user"
            },
            "predefined_options": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Predefined options for the user to choose from (optional)"
            },
            "context_info": {
                "type": "string",
                "description": "Context information including project goals, current progress, tech stack, etc. (optional)"
            }
        },
        "required": ["message"]
    });
    Arc::new(schema.as_object().cloned().unwrap_or_else(Map::new))
}
