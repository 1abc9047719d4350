//! Integration tests for the MCP tool surface.
//!
//! These check the tool list and argument schema the feedback server exposes.

use interactive_feedback::schemas::interactive_feedback_schema;
use interactive_feedback::server::FeedbackServer;
use serde_json::Value;

fn schema_has_property(schema: &Value, property: &str) -> bool {
    schema["properties"][property].is_object()
}

#[test]
fn test_list_tools_returns_interactive_feedback() {
    let tools = FeedbackServer::tool_definitions();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_ref()).collect();
    assert_eq!(names, vec!["interactive_feedback"]);
    assert!(tools[0].description.as_deref().unwrap().contains("session_control"));
}

#[test]
fn test_interactive_feedback_schema_structure() {
    let schema = Value::Object((*interactive_feedback_schema()).clone());

    assert_eq!(schema["type"], "object");
    assert!(schema_has_property(&schema, "message"));
    assert!(schema_has_property(&schema, "predefined_options"));
    assert!(schema_has_property(&schema, "context_info"));
    assert_eq!(schema["properties"]["predefined_options"]["type"], "array");
    assert_eq!(
        schema["properties"]["predefined_options"]["items"]["type"],
        "string"
    );

    let required = schema["required"].as_array().unwrap();
    assert_eq!(required.len(), 1);
    assert_eq!(required[0].as_str().unwrap(), "message");
}

#[test]
fn test_tool_definition_uses_shared_schema() {
    let tools = FeedbackServer::tool_definitions();
    assert_eq!(*tools[0].input_schema, *interactive_feedback_schema());
}
