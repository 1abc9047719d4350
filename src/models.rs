//! Request and result payloads exchanged between the MCP server and the dialog

use std::collections::HashSet;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FeedbackError, Result};

/// What the assistant asks the user. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub prompt: String,
    #[serde(default)]
    pub predefined_options: Vec<String>,
    #[serde(default, alias = "context_info")]
    pub project_context: String,
}

impl FeedbackRequest {
    pub fn new(
        prompt: impl Into<String>,
        predefined_options: Vec<String>,
        project_context: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            predefined_options,
            project_context: project_context.into(),
        }
        .normalized()
    }

    /// Parse a JSON payload as handed to the `dialog` subcommand
    pub fn from_json(payload: &str) -> Result<Self> {
        let request: FeedbackRequest =
            serde_json::from_str(payload).map_err(|e| FeedbackError::InvalidInput {
                message: format!("malformed request payload: {}", e),
            })?;
        Ok(request.normalized())
    }

    /// Trim options and drop blanks and repeats, keeping first-seen order
    fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.predefined_options = self
            .predefined_options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty() && seen.insert(o.clone()))
            .collect();
        self
    }
}

/// Whether the assistant should keep the session going after this feedback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionControl {
    #[default]
    Continue,
    Terminate,
}

impl SessionControl {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionControl::Continue => "continue",
            SessionControl::Terminate => "terminate",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SessionControl::Continue => SessionControl::Terminate,
            SessionControl::Terminate => SessionControl::Continue,
        }
    }
}

impl std::fmt::Display for SessionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image attached by the user. Serialized as base64 with its MIME type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImagePayload", into = "ImagePayload")]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ImagePayload {
    #[serde(rename = "mimeType", default = "default_mime_type")]
    mime_type: String,
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: String,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

impl TryFrom<ImagePayload> for ImageAttachment {
    type Error = base64::DecodeError;

    fn try_from(payload: ImagePayload) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            mime_type: payload.mime_type,
            data: STANDARD.decode(payload.bytes_base64_encoded.as_bytes())?,
        })
    }
}

impl From<ImageAttachment> for ImagePayload {
    fn from(image: ImageAttachment) -> Self {
        Self {
            bytes_base64_encoded: STANDARD.encode(&image.data),
            mime_type: image.mime_type,
        }
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Load an image file, rejecting unknown formats and files over `max_bytes`
    pub fn from_path(path: &Path, max_bytes: usize) -> Result<Self> {
        let mime_type = mime_type_for_path(path).ok_or_else(|| {
            FeedbackError::invalid_input(format!(
                "unsupported image type: {} (expected png, jpg, jpeg, gif, bmp or webp)",
                path.display()
            ))
        })?;

        let meta = std::fs::metadata(path).map_err(|e| {
            FeedbackError::invalid_input(format!("cannot read {}: {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(FeedbackError::invalid_input(format!(
                "{} is not a file",
                path.display()
            )));
        }
        if meta.len() > max_bytes as u64 {
            return Err(FeedbackError::invalid_input(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                meta.len(),
                max_bytes
            )));
        }

        let data = std::fs::read(path)?;
        Ok(Self::new(mime_type, data))
    }

    pub fn base64_data(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// MIME type derived from the file extension
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// What the dialog returns when it closes. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResult {
    #[serde(default)]
    pub user_text: String,
    #[serde(default)]
    pub selected_options: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    pub session_control: SessionControl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl FeedbackResult {
    /// The result of closing the dialog without submitting
    pub fn cancelled() -> Self {
        Self {
            user_text: String::new(),
            selected_options: Vec::new(),
            images: Vec::new(),
            session_control: SessionControl::Terminate,
            error: Some(ErrorKind::UserCancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error == Some(ErrorKind::UserCancelled)
    }

    /// Selected options joined by "; ", then the user's text, separated by a blank line
    pub fn combined_feedback(&self) -> String {
        let mut parts = Vec::new();
        if !self.selected_options.is_empty() {
            parts.push(self.selected_options.join("; "));
        }
        let text = self.user_text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
        parts.join("\n\n")
    }

    pub fn exit_code(&self) -> i32 {
        self.error
            .map(ErrorKind::exit_code)
            .unwrap_or(crate::error::EXIT_SUBMITTED)
    }
}
