pub mod router;

use std::sync::Arc;

use rmcp::model::Tool;

use crate::config::Config;
use crate::error::Result;
use crate::launcher::DialogLauncher;
use crate::schemas::interactive_feedback_schema;

/// MCP server exposing the interactive feedback tool
#[derive(Clone)]
pub struct FeedbackServer {
    pub launcher: Arc<DialogLauncher>,
}

impl FeedbackServer {
    pub fn new(config: &Config) -> Result<Self> {
        let launcher = DialogLauncher::from_config(&config.dialog)?;
        Ok(Self::with_launcher(launcher))
    }

    pub fn with_launcher(launcher: DialogLauncher) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    pub fn tool_definitions() -> Vec<Tool> {
        vec![Tool {
            name: "interactive_feedback".into(),
            title: Some("Interactive Feedback".into()),
            description: Some(
                "Ask the user for feedback through an interactive dialog. Supports predefined \
                 options, free text, image attachments and prompt enhancement. The result ends \
                 with a [session_control: continue|terminate] marker."
                    .into(),
            ),
            input_schema: interactive_feedback_schema(),
            icons: None,
            annotations: None,
            output_schema: None,
            meta: None,
        }]
    }
}
