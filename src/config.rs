use serde::{Deserialize, Serialize};

use crate::error::{FeedbackError, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_LOG_LEVEL: &str = "interactive_feedback=info,rmcp=info";

/// Main configuration structure loaded from interactive_feedback.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub enhancer: EnhancerConfig,
    pub dialog: DialogConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Settings for the prompt enhancement call
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Only ever read from GEMINI_API_KEY
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.7,
            api_key: None,
        }
    }
}

/// Settings for how the dialog is launched and what it accepts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Prefix used to open the dialog in a terminal emulator, e.g. ["xterm", "-e"].
    /// Empty means detect one; ["none"] draws on the controlling terminal.
    pub terminal_command: Vec<String>,
    pub max_image_bytes: usize,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            terminal_command: Vec::new(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// RUST_LOG when set
    pub log_level: Option<String>,
    pub config_path: String,
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses FEEDBACK_CONFIG environment variable or defaults to "interactive_feedback.toml"
    pub fn load() -> Result<Self> {
        // FEEDBACK_ENV_FILE if set, otherwise ./.env when present
        if let Ok(env_path) = std::env::var("FEEDBACK_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        Self::load_with(|key| std::env::var(key).ok())
    }

    /// File plus environment, with `lookup` standing in for the process environment
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = lookup("FEEDBACK_CONFIG")
            .unwrap_or_else(|| "interactive_feedback.toml".to_string());

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(_) => {
                tracing::debug!("Config file {} not found, using defaults", config_path);
                Self::default()
            }
        };

        config.apply_env(lookup)?;
        config.runtime.config_path = config_path;
        config.validate();

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.validate();
        Ok(config)
    }

    /// Apply environment overrides (env-first); `lookup` is std::env::var in production
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.enhancer.api_key = lookup("GEMINI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(model) = lookup("GEMINI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.enhancer.model = model.trim().to_string();
        }
        if let Some(base) = lookup("FEEDBACK_GEMINI_BASE_URL").filter(|b| !b.trim().is_empty()) {
            self.enhancer.base_url = base.trim().to_string();
        }
        if let Some(term) = lookup("FEEDBACK_TERMINAL") {
            self.dialog.terminal_command = parse_terminal_command(&term)?;
        }
        if let Some(max) = lookup("FEEDBACK_MAX_IMAGE_BYTES") {
            self.dialog.max_image_bytes = max.trim().parse().map_err(|_| FeedbackError::Config {
                message: format!("FEEDBACK_MAX_IMAGE_BYTES must be a byte count, got '{}'", max),
            })?;
        }
        self.runtime.log_level = lookup("RUST_LOG").filter(|l| !l.trim().is_empty());
        Ok(())
    }

    fn validate(&mut self) {
        if !(0.0..=2.0).contains(&self.enhancer.temperature) {
            tracing::warn!(
                "enhancer temperature {} outside 0.0..=2.0, clamping",
                self.enhancer.temperature
            );
            self.enhancer.temperature = self.enhancer.temperature.clamp(0.0, 2.0);
        }
        if self.dialog.max_image_bytes == 0 {
            self.dialog.max_image_bytes = DEFAULT_MAX_IMAGE_BYTES;
        }
        if !self.enhancer.base_url.starts_with("http://")
            && !self.enhancer.base_url.starts_with("https://")
        {
            tracing::warn!(
                "Enhancer base URL '{}' doesn't start with http:// or https://",
                self.enhancer.base_url
            );
        }
    }

    /// Log filter for the given mode, RUST_LOG winning when set
    pub fn log_filter(&self, default: &str) -> String {
        self.runtime
            .log_level
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Accepts a JSON array (`["wezterm", "start", "--"]`) or a whitespace-separated command
pub fn parse_terminal_command(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| FeedbackError::Config {
            message: format!("FEEDBACK_TERMINAL is not a JSON string array: {}", e),
        });
    }
    Ok(trimmed.split_whitespace().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn load_reads_file_named_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.toml");
        std::fs::write(&path, "[enhancer]\nmodel = \"gemini-file\"\n").unwrap();
        let path_str = path.to_string_lossy().to_string();
        let vars = env(&[("FEEDBACK_CONFIG", path_str.as_str()), ("GEMINI_API_KEY", "k")]);

        let config = Config::load_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.runtime.config_path, path_str);
        assert_eq!(config.enhancer.model, "gemini-file");
        assert_eq!(config.enhancer.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let vars = env(&[("FEEDBACK_CONFIG", "/nonexistent/feedback.toml")]);
        let config = Config::load_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.runtime.config_path, "/nonexistent/feedback.toml");
        assert_eq!(config.enhancer.model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn defaults_without_file_or_env() {
        let mut config = Config::default();
        config.apply_env(|_| None).unwrap();
        assert_eq!(config.enhancer.model, DEFAULT_GEMINI_MODEL);
        assert!(config.enhancer.api_key.is_none());
        assert!(config.dialog.terminal_command.is_empty());
        assert_eq!(config.dialog.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert_eq!(config.log_filter(DEFAULT_LOG_LEVEL), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn toml_sections_and_partial_values() {
        let config = Config::from_toml_str(
            r#"
            [enhancer]
            model = "gemini-2.0-flash"
            temperature = 5.0

            [dialog]
            terminal_command = ["kitty", "--"]
            "#,
        )
        .unwrap();
        assert_eq!(config.enhancer.model, "gemini-2.0-flash");
        assert_eq!(config.enhancer.temperature, 2.0);
        assert_eq!(config.enhancer.base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.dialog.terminal_command, vec!["kitty", "--"]);
    }

    #[test]
    fn env_overrides_win() {
        let vars = env(&[
            ("GEMINI_API_KEY", "  secret "),
            ("GEMINI_MODEL", "gemini-pro"),
            ("FEEDBACK_TERMINAL", "xterm -e"),
            ("FEEDBACK_MAX_IMAGE_BYTES", "2048"),
            ("RUST_LOG", "debug"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.enhancer.api_key.as_deref(), Some("secret"));
        assert_eq!(config.enhancer.model, "gemini-pro");
        assert_eq!(config.dialog.terminal_command, vec!["xterm", "-e"]);
        assert_eq!(config.dialog.max_image_bytes, 2048);
        assert_eq!(config.log_filter(DEFAULT_LOG_LEVEL), "debug");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let vars = env(&[("GEMINI_API_KEY", "   ")]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert!(config.enhancer.api_key.is_none());
    }

    #[test]
    fn bad_image_limit_is_config_error() {
        let vars = env(&[("FEEDBACK_MAX_IMAGE_BYTES", "lots")]);
        let mut config = Config::default();
        let err = config.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, FeedbackError::Config { .. }));
    }

    #[test]
    fn terminal_command_json_form() {
        let cmd = parse_terminal_command(r#"["wezterm", "start", "--"]"#).unwrap();
        assert_eq!(cmd, vec!["wezterm", "start", "--"]);
        assert!(parse_terminal_command("[1, 2]").is_err());
        assert!(parse_terminal_command("  ").unwrap().is_empty());
    }
}
