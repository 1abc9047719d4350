//! The feedback dialog: form state plus the terminal front end in [`tui`].
//!
//! `FeedbackForm` owns everything the user can change. It has no knowledge of
//! the terminal, so every rule about what may be submitted lives here.

pub mod tui;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FeedbackError, Result};
use crate::models::{FeedbackRequest, FeedbackResult, ImageAttachment, SessionControl};

static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__(.*?)__").expect("valid regex"));

/// Strip `**bold**` and `__bold__` markers for plain-text display
pub fn strip_bold_markdown(text: &str) -> String {
    let without_stars = BOLD_STARS.replace_all(text, "$1");
    BOLD_UNDERSCORES
        .replace_all(&without_stars, "$1")
        .trim()
        .to_string()
}

#[derive(Debug)]
pub struct FeedbackForm {
    request: FeedbackRequest,
    text: String,
    selected: Vec<bool>,
    images: Vec<ImageAttachment>,
    session_control: SessionControl,
    enhancement_pending: bool,
    status: Option<String>,
    max_image_bytes: usize,
}

impl FeedbackForm {
    pub fn new(request: FeedbackRequest, max_image_bytes: usize) -> Self {
        let selected = vec![false; request.predefined_options.len()];
        Self {
            request,
            text: String::new(),
            selected,
            images: Vec::new(),
            session_control: SessionControl::default(),
            enhancement_pending: false,
            status: None,
            max_image_bytes,
        }
    }

    pub fn request(&self) -> &FeedbackRequest {
        &self.request
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, bool)> {
        self.request
            .predefined_options
            .iter()
            .map(String::as_str)
            .zip(self.selected.iter().copied())
    }

    pub fn toggle_option(&mut self, index: usize) -> Result<bool> {
        let slot = self.selected.get_mut(index).ok_or_else(|| {
            FeedbackError::invalid_input(format!("no predefined option at index {}", index))
        })?;
        *slot = !*slot;
        Ok(*slot)
    }

    /// Selected options in the order they were offered
    pub fn selected_options(&self) -> Vec<String> {
        self.options()
            .filter(|(_, on)| *on)
            .map(|(o, _)| o.to_string())
            .collect()
    }

    pub fn images(&self) -> &[ImageAttachment] {
        &self.images
    }

    pub fn attach_image(&mut self, path: &Path) -> Result<&ImageAttachment> {
        let ImageAttachment { mime_type, data } =
            ImageAttachment::from_path(path, self.max_image_bytes)?;
        self.attach_bytes(mime_type, data)?;
        self.status = Some(format!("Attached {}", path.display()));
        Ok(&self.images[self.images.len() - 1])
    }

    /// Attach already-loaded image data; empty or oversized data is rejected
    pub fn attach_bytes(&mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Result<()> {
        if data.is_empty() {
            return Err(FeedbackError::invalid_input("image data is empty"));
        }
        if data.len() > self.max_image_bytes {
            return Err(FeedbackError::invalid_input(format!(
                "image is {} bytes, limit is {}",
                data.len(),
                self.max_image_bytes
            )));
        }
        self.images.push(ImageAttachment::new(mime_type, data));
        Ok(())
    }

    pub fn remove_image(&mut self, index: usize) -> Result<ImageAttachment> {
        if index >= self.images.len() {
            return Err(FeedbackError::invalid_input(format!(
                "no image at index {}",
                index
            )));
        }
        Ok(self.images.remove(index))
    }

    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    pub fn session_control(&self) -> SessionControl {
        self.session_control
    }

    pub fn set_session_control(&mut self, value: SessionControl) {
        self.session_control = value;
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn enhancement_pending(&self) -> bool {
        self.enhancement_pending
    }

    /// Mark an enhancement as in flight and hand back the draft to send
    pub fn begin_enhancement(&mut self) -> Result<String> {
        if self.enhancement_pending {
            return Err(FeedbackError::invalid_input(
                "an enhancement is already running",
            ));
        }
        let draft = self.text.trim();
        if draft.is_empty() {
            return Err(FeedbackError::invalid_input(
                "type something before asking for an enhancement",
            ));
        }
        let draft = draft.to_string();
        self.enhancement_pending = true;
        self.status = Some("Enhancing prompt...".to_string());
        Ok(draft)
    }

    /// Apply the enhancer's answer. On failure the draft is left untouched.
    pub fn finish_enhancement(&mut self, outcome: Result<String>) -> bool {
        self.enhancement_pending = false;
        match outcome {
            Ok(text) => {
                self.text = text;
                self.status = Some("Prompt enhanced; review and edit before submitting".into());
                true
            }
            Err(e) => {
                tracing::debug!("enhancement failed: {}", e);
                self.status = Some(format!("{} (original text kept)", e));
                false
            }
        }
    }

    pub fn submit(&self) -> Result<FeedbackResult> {
        if self.enhancement_pending {
            return Err(FeedbackError::invalid_input(
                "wait for the enhancement to finish before submitting",
            ));
        }
        let user_text = self.text.trim().to_string();
        let selected_options = self.selected_options();
        if user_text.is_empty() && selected_options.is_empty() {
            return Err(FeedbackError::invalid_input(
                "enter some feedback or select at least one option",
            ));
        }
        Ok(FeedbackResult {
            user_text,
            selected_options,
            images: self.images.clone(),
            session_control: self.session_control,
            error: None,
        })
    }

    pub fn cancel(&self) -> FeedbackResult {
        FeedbackResult::cancelled()
    }
}
