//! interactive_feedback tool: shows the dialog and relays the user's answer

use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{FeedbackError, Result};
use crate::models::{FeedbackRequest, FeedbackResult};
use crate::server::FeedbackServer;

#[derive(Debug, Deserialize)]
pub struct InteractiveFeedbackParams {
    pub message: String,
    #[serde(default)]
    pub predefined_options: Option<Vec<String>>,
    #[serde(default)]
    pub context_info: Option<String>,
}

impl InteractiveFeedbackParams {
    pub fn into_request(self) -> Result<FeedbackRequest> {
        if self.message.trim().is_empty() {
            return Err(FeedbackError::invalid_input("message cannot be empty"));
        }
        Ok(FeedbackRequest::new(
            self.message,
            self.predefined_options.unwrap_or_default(),
            self.context_info.unwrap_or_default(),
        ))
    }
}

/// Text handed back to the agent, ending with the session control marker
pub fn feedback_text(result: &FeedbackResult) -> String {
    let marker = format!("[session_control: {}]", result.session_control);
    let feedback = result.combined_feedback();
    if feedback.is_empty() {
        marker
    } else {
        format!("{}\n\n{}", feedback, marker)
    }
}

pub fn result_contents(result: &FeedbackResult) -> Vec<Content> {
    let mut contents = vec![Content::text(feedback_text(result))];
    for image in &result.images {
        contents.push(Content::image(image.base64_data(), image.mime_type.clone()));
    }
    contents
}

impl FeedbackServer {
    pub async fn handle_interactive_feedback(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult> {
        let args = request
            .arguments
            .ok_or_else(|| FeedbackError::invalid_input("Missing parameters"))?;
        let params: InteractiveFeedbackParams = serde_json::from_value(Value::Object(args))
            .map_err(|e| FeedbackError::invalid_input(format!("Invalid parameters: {}", e)))?;
        let feedback_request = params.into_request()?;

        let result = self.launcher.launch(&feedback_request).await?;
        if result.is_cancelled() {
            info!("Feedback dialog closed without submitting");
        }
        Ok(CallToolResult::success(result_contents(&result)))
    }
}
