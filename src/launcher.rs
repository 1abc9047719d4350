//! Runs the dialog as a child process and collects its result.
//!
//! The request goes in through a temp file and the result comes back through
//! another, so the dialog can run inside a terminal emulator that does not pass
//! stdio through.
//!
//! With no terminal configured the launcher opens `$TERMINAL`, then
//! `x-terminal-emulator`, then `xterm`. Only when none exists does it fall back
//! to the controlling terminal, and it fails when there is none.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DialogConfig;
use crate::error::{EXIT_CANCELLED, EXIT_SUBMITTED, FeedbackError, Result};
use crate::models::{FeedbackRequest, FeedbackResult};

/// `FEEDBACK_TERMINAL=none` draws on the controlling terminal
pub const INLINE_TERMINAL: &str = "none";

const FALLBACK_EMULATORS: [&str; 2] = ["x-terminal-emulator", "xterm"];

/// Pick the prefix that opens the dialog in its own terminal window.
/// An empty result means "draw on the controlling terminal".
pub fn resolve_terminal_command<E, P>(
    configured: &[String],
    env: E,
    on_path: P,
    has_tty: bool,
) -> Result<Vec<String>>
where
    E: Fn(&str) -> Option<String>,
    P: Fn(&str) -> bool,
{
    match configured {
        [only] if only == INLINE_TERMINAL => return Ok(Vec::new()),
        [] => {}
        _ => return Ok(configured.to_vec()),
    }

    if let Some(terminal) = env("TERMINAL").filter(|t| !t.trim().is_empty()) {
        let mut command: Vec<String> = terminal.split_whitespace().map(str::to_string).collect();
        command.push("-e".into());
        return Ok(command);
    }
    if let Some(found) = FALLBACK_EMULATORS.iter().find(|p| on_path(p)) {
        return Ok(vec![found.to_string(), "-e".into()]);
    }
    if has_tty {
        return Ok(Vec::new());
    }
    Err(FeedbackError::Launch {
        message: "no terminal emulator found ($TERMINAL, x-terminal-emulator, xterm) and no \
                  controlling terminal; set FEEDBACK_TERMINAL, e.g. FEEDBACK_TERMINAL=\"xterm -e\""
            .into(),
    })
}

fn find_on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(unix)]
fn has_controlling_tty() -> bool {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
        .is_ok()
}

#[cfg(not(unix))]
fn has_controlling_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}

#[derive(Debug, Clone)]
pub struct DialogLauncher {
    program: PathBuf,
    terminal_command: Vec<String>,
}

impl DialogLauncher {
    /// Launch this same executable's `dialog` subcommand
    pub fn from_config(config: &DialogConfig) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| FeedbackError::Launch {
            message: format!("cannot locate own executable: {}", e),
        })?;
        Ok(Self::new(program, config.terminal_command.clone()))
    }

    pub fn new(program: impl Into<PathBuf>, terminal_command: Vec<String>) -> Self {
        Self {
            program: program.into(),
            terminal_command,
        }
    }

    fn terminal_prefix(&self) -> Result<Vec<String>> {
        resolve_terminal_command(
            &self.terminal_command,
            |key| std::env::var(key).ok(),
            find_on_path,
            has_controlling_tty(),
        )
    }

    /// Full argv: terminal prefix, then the dialog invocation
    pub fn command_line(
        &self,
        terminal: &[String],
        request_file: &Path,
        output_file: &Path,
    ) -> Vec<OsString> {
        let mut argv: Vec<OsString> = terminal.iter().map(OsString::from).collect();
        argv.push(self.program.clone().into_os_string());
        argv.push("dialog".into());
        argv.push("--request-file".into());
        argv.push(request_file.as_os_str().to_os_string());
        argv.push("--output-file".into());
        argv.push(output_file.as_os_str().to_os_string());
        argv
    }

    pub async fn launch(&self, request: &FeedbackRequest) -> Result<FeedbackResult> {
        let mut request_file = tempfile::Builder::new()
            .prefix("feedback-request-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut request_file, request)?;
        request_file.flush()?;
        let request_path = request_file.into_temp_path();

        let output_path = tempfile::Builder::new()
            .prefix("feedback-result-")
            .suffix(".json")
            .tempfile()?
            .into_temp_path();

        let terminal = self.terminal_prefix()?;
        let argv = self.command_line(&terminal, &request_path, &output_path);
        let (program, args) = argv.split_first().ok_or_else(|| FeedbackError::Launch {
            message: "empty dialog command line".into(),
        })?;

        info!(
            "Launching feedback dialog (prompt chars={}, options={})",
            request.prompt.len(),
            request.predefined_options.len()
        );
        debug!("dialog argv: {:?}", argv);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FeedbackError::Launch {
                message: format!("failed to start {}: {}", program.to_string_lossy(), e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.stdout.is_empty() {
            debug!("dialog stdout: {}", String::from_utf8_lossy(&output.stdout));
        }
        if !stderr.trim().is_empty() {
            debug!("dialog stderr: {}", stderr.trim());
        }

        match output.status.code() {
            Some(EXIT_SUBMITTED) | Some(EXIT_CANCELLED) => {}
            code => {
                warn!("feedback dialog exited with {:?}", code);
                let mut message = format!("dialog exited with status {}", output.status);
                if !stderr.trim().is_empty() {
                    message.push_str(&format!("\nError output: {}", stderr.trim()));
                }
                return Err(FeedbackError::Launch { message });
            }
        }

        // request_path and output_path are removed when they drop
        let raw = tokio::fs::read_to_string(&output_path).await?;
        if raw.trim().is_empty() {
            return Err(FeedbackError::Launch {
                message: "dialog exited without writing a result".into(),
            });
        }
        let result: FeedbackResult = serde_json::from_str(&raw)?;
        info!(
            "Feedback received (session_control={}, images={}, cancelled={})",
            result.session_control,
            result.images.len(),
            result.is_cancelled()
        );
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::SessionControl;

    // `sh -c SCRIPT sh <program> dialog --request-file REQ --output-file OUT`
    // puts REQ in $4 and OUT in $6
    fn scripted(script: &str) -> DialogLauncher {
        DialogLauncher::new(
            "/bin/true",
            vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
        )
    }

    fn request() -> FeedbackRequest {
        FeedbackRequest::new("Continue?", vec!["Yes".into(), "No".into()], "ctx")
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_line_prefixes_terminal() {
        let launcher = DialogLauncher::new("/usr/bin/fb", Vec::new());
        let argv = launcher.command_line(
            &strings(&["xterm", "-e"]),
            Path::new("/tmp/req.json"),
            Path::new("/tmp/out.json"),
        );
        let argv: Vec<_> = argv.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            argv,
            vec![
                "xterm",
                "-e",
                "/usr/bin/fb",
                "dialog",
                "--request-file",
                "/tmp/req.json",
                "--output-file",
                "/tmp/out.json"
            ]
        );
    }

    #[tokio::test]
    async fn reads_submitted_result() {
        let launcher = scripted(
            r#"grep -q '"prompt":"Continue?"' "$4" || exit 9
printf '{"user_text":"looks good","selected_options":["Yes"],"images":[],"session_control":"continue"}' > "$6""#,
        );
        let result = launcher.launch(&request()).await.unwrap();
        assert_eq!(result.user_text, "looks good");
        assert_eq!(result.selected_options, vec!["Yes"]);
        assert_eq!(result.session_control, SessionControl::Continue);
    }

    #[tokio::test]
    async fn cancelled_exit_still_returns_result() {
        let launcher = scripted(
            r#"printf '{"user_text":"","session_control":"terminate","error":"user_cancelled"}' > "$6"; exit 3"#,
        );
        let result = launcher.launch(&request()).await.unwrap();
        assert!(result.is_cancelled());
        assert_eq!(result.session_control, SessionControl::Terminate);
    }

    #[test]
    fn configured_terminal_is_used_as_is() {
        let configured = strings(&["wezterm", "start", "--"]);
        let got = resolve_terminal_command(&configured, |_| Some("kitty".into()), |_| true, false)
            .unwrap();
        assert_eq!(got, configured);
    }

    #[test]
    fn none_forces_inline_drawing() {
        let got =
            resolve_terminal_command(&strings(&["none"]), |_| Some("kitty".into()), |_| true, true)
                .unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn terminal_env_wins_over_path_search() {
        let got = resolve_terminal_command(
            &[],
            |k| (k == "TERMINAL").then(|| "alacritty".to_string()),
            |_| true,
            true,
        )
        .unwrap();
        assert_eq!(got, strings(&["alacritty", "-e"]));
    }

    #[test]
    fn path_search_prefers_x_terminal_emulator() {
        let got = resolve_terminal_command(&[], |_| None, |p| p != "missing", false).unwrap();
        assert_eq!(got, strings(&["x-terminal-emulator", "-e"]));

        let got = resolve_terminal_command(&[], |_| None, |p| p == "xterm", false).unwrap();
        assert_eq!(got, strings(&["xterm", "-e"]));
    }

    #[test]
    fn controlling_tty_is_last_resort() {
        let got = resolve_terminal_command(&[], |_| None, |_| false, true).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn no_emulator_and_no_tty_asks_for_feedback_terminal() {
        let err = resolve_terminal_command(&[], |_| None, |_| false, false).unwrap_err();
        match err {
            FeedbackError::Launch { message } => assert!(message.contains("FEEDBACK_TERMINAL")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failing_dialog_reports_stderr_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen-paths");
        let launcher = scripted(&format!(
            "printf '%s\\n%s\\n' \"$4\" \"$6\" > '{}'; echo 'no display' >&2; exit 1",
            seen.display()
        ));
        let err = launcher.launch(&request()).await.unwrap_err();
        match err {
            FeedbackError::Launch { message } => assert!(message.contains("no display")),
            other => panic!("unexpected error: {other}"),
        }

        let seen = std::fs::read_to_string(&seen).unwrap();
        let paths: Vec<&str> = seen.lines().collect();
        assert_eq!(paths.len(), 2);
        for path in paths {
            assert!(!Path::new(path).exists(), "{path} was left behind");
        }
    }

    #[tokio::test]
    async fn temp_files_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen-paths");
        let launcher = scripted(&format!(
            r#"printf '%s\n%s\n' "$4" "$6" > '{}'
printf '{{"user_text":"ok","session_control":"continue"}}' > "$6""#,
            seen.display()
        ));
        launcher.launch(&request()).await.unwrap();

        let seen = std::fs::read_to_string(&seen).unwrap();
        for path in seen.lines() {
            assert!(!Path::new(path).exists(), "{path} was left behind");
        }
    }

    #[tokio::test]
    async fn missing_result_is_launch_error() {
        let launcher = scripted("exit 0");
        let err = launcher.launch(&request()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Launch { .. }));
    }
}
