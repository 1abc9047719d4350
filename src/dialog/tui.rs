//! Terminal front end for the feedback dialog.
//!
//! Draws on the controlling terminal (`/dev/tty` on unix) so stdout stays free for
//! the JSON result. The enhancement call runs on a background task and reports
//! back over a channel; the form refuses submission until it has.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::mpsc;
use tui_textarea::TextArea;

use super::{FeedbackForm, strip_bold_markdown};
use crate::enhancer::PromptEnhancer;
use crate::error::Result;
use crate::models::{FeedbackResult, SessionControl};

const TICK: Duration = Duration::from_millis(100);
const MAX_OPTION_ROWS: usize = 8;
const HELP: &str = "Ctrl-S submit • Ctrl-E enhance • Ctrl-O attach image • Ctrl-L clear images • Ctrl-T session • Tab focus • Esc cancel";

type TtyTerminal = Terminal<CrosstermBackend<Box<dyn Write>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Editor,
    Options,
    Images,
    Session,
}

enum Action {
    None,
    Enhance(String),
    Finish(FeedbackResult),
}

struct DialogApp {
    form: FeedbackForm,
    editor: TextArea<'static>,
    /// Deltas of the enhancement in flight, shown in place of the draft
    stream: Option<mpsc::UnboundedReceiver<String>>,
    preview: String,
    path_input: Option<TextArea<'static>>,
    focus: Focus,
    option_cursor: usize,
    image_cursor: usize,
}

/// Run the dialog until the user submits or cancels
pub async fn run(form: FeedbackForm, enhancer: Arc<dyn PromptEnhancer>) -> Result<FeedbackResult> {
    let writer = open_terminal_writer()?;
    enable_raw_mode()?;
    let mut terminal = undo_on_error(init_screen(writer), || {
        let _ = disable_raw_mode();
    })?;
    install_panic_hook();

    let mut app = DialogApp::new(form);
    let outcome = event_loop(&mut terminal, &mut app, enhancer).await;
    let restored = restore_terminal(&mut terminal);

    let result = outcome?;
    restored?;
    Ok(result)
}

#[cfg(unix)]
fn open_terminal_writer() -> io::Result<Box<dyn Write>> {
    let tty = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")?;
    Ok(Box::new(tty))
}

#[cfg(not(unix))]
fn open_terminal_writer() -> io::Result<Box<dyn Write>> {
    Ok(Box::new(io::stderr()))
}

fn init_screen<W: Write>(writer: W) -> io::Result<Terminal<CrosstermBackend<W>>> {
    let mut terminal = Terminal::new(CrosstermBackend::new(writer))?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)?;
    Ok(terminal)
}

fn undo_on_error<T, E>(
    result: std::result::Result<T, E>,
    undo: impl FnOnce(),
) -> std::result::Result<T, E> {
    if result.is_err() {
        undo();
    }
    result
}

/// Leave raw mode and the alternate screen before the panic message prints
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        if let Ok(mut tty) = open_terminal_writer() {
            let _ = execute!(tty, LeaveAlternateScreen);
        }
        default_hook(info);
    }));
}

fn restore_terminal(terminal: &mut TtyTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn event_loop(
    terminal: &mut TtyTerminal,
    app: &mut DialogApp,
    enhancer: Arc<dyn PromptEnhancer>,
) -> Result<FeedbackResult> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<String>>();
    let context = app.form.request().project_context.clone();

    loop {
        app.drain_stream();
        while let Ok(outcome) = rx.try_recv() {
            app.apply_enhancement(outcome);
        }

        terminal.draw(|f| app.draw(f))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key) {
            Action::None => {}
            Action::Finish(result) => return Ok(result),
            Action::Enhance(draft) => {
                let tx = tx.clone();
                let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
                app.start_stream(chunk_rx);
                let enhancer = enhancer.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    let outcome = enhancer
                        .enhance_streaming(&draft, &context, chunk_tx)
                        .await;
                    let _ = tx.send(outcome);
                });
            }
        }
    }
}

fn new_editor(text: &str) -> TextArea<'static> {
    let mut editor = TextArea::from(text.lines().map(str::to_string).collect::<Vec<_>>());
    editor.set_placeholder_text("Type your feedback here");
    editor
}

fn new_path_input() -> TextArea<'static> {
    let mut input = TextArea::default();
    input.set_placeholder_text("/path/to/screenshot.png");
    input.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title("Attach image (Enter to add, Esc to close)"),
    );
    input
}

fn pane_block(title: &str, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title.to_string())
}

fn pane_height(text: &str, max_lines: u16) -> u16 {
    let lines = text.lines().count().max(1) as u16;
    lines.min(max_lines) + 2
}

fn human_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn centered_rect(width_pct: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_pct) / 2),
            Constraint::Percentage(width_pct),
            Constraint::Percentage((100 - width_pct) / 2),
        ])
        .split(vertical[1])[1]
}

impl DialogApp {
    fn new(form: FeedbackForm) -> Self {
        let editor = new_editor(form.text());
        Self {
            form,
            editor,
            stream: None,
            preview: String::new(),
            path_input: None,
            focus: Focus::Editor,
            option_cursor: 0,
            image_cursor: 0,
        }
    }

    fn has_options(&self) -> bool {
        !self.form.request().predefined_options.is_empty()
    }

    fn cycle_focus(&mut self, forward: bool) {
        let order = [Focus::Editor, Focus::Options, Focus::Images, Focus::Session];
        let mut idx = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        loop {
            idx = if forward {
                (idx + 1) % order.len()
            } else {
                (idx + order.len() - 1) % order.len()
            };
            if order[idx] != Focus::Options || self.has_options() {
                break;
            }
        }
        self.focus = order[idx];
    }

    fn sync_text(&mut self) {
        self.form.set_text(self.editor.lines().join("\n"));
    }

    fn start_stream(&mut self, chunks: mpsc::UnboundedReceiver<String>) {
        self.stream = Some(chunks);
        self.preview.clear();
    }

    fn drain_stream(&mut self) {
        let Some(chunks) = self.stream.as_mut() else {
            return;
        };
        let mut changed = false;
        while let Ok(delta) = chunks.try_recv() {
            self.preview.push_str(&delta);
            changed = true;
        }
        if changed && self.form.enhancement_pending() {
            self.editor = new_editor(&self.preview);
        }
    }

    fn apply_enhancement(&mut self, outcome: Result<String>) {
        self.stream = None;
        let streamed = !self.preview.is_empty();
        self.preview.clear();
        // a failed stream may have left partial text in the editor
        if self.form.finish_enhancement(outcome) || streamed {
            self.editor = new_editor(self.form.text());
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if let Some(input) = self.path_input.as_mut() {
            match key.code {
                KeyCode::Esc => self.path_input = None,
                KeyCode::Enter => {
                    let raw = input.lines().join("");
                    self.path_input = None;
                    self.attach_from_input(&raw);
                }
                _ => {
                    input.input(key);
                }
            }
            return Action::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Action::Finish(self.form.cancel()),
            KeyCode::Char('c') if ctrl => return Action::Finish(self.form.cancel()),
            KeyCode::Char('s') if ctrl => {
                self.sync_text();
                match self.form.submit() {
                    Ok(result) => return Action::Finish(result),
                    Err(e) => self.form.set_status(e.to_string()),
                }
            }
            KeyCode::Char('e') if ctrl => {
                self.sync_text();
                match self.form.begin_enhancement() {
                    Ok(draft) => return Action::Enhance(draft),
                    Err(e) => self.form.set_status(e.to_string()),
                }
            }
            KeyCode::Char('o') if ctrl => self.path_input = Some(new_path_input()),
            KeyCode::Char('l') if ctrl => {
                self.form.clear_images();
                self.image_cursor = 0;
                self.form.set_status("Images cleared");
            }
            KeyCode::Char('t') if ctrl => self.toggle_session(),
            KeyCode::Tab => self.cycle_focus(true),
            KeyCode::BackTab => self.cycle_focus(false),
            _ => self.handle_focused_key(key),
        }
        Action::None
    }

    fn handle_focused_key(&mut self, key: KeyEvent) {
        match self.focus {
            Focus::Editor => {
                if self.form.enhancement_pending() {
                    self.form
                        .set_status("Enhancement in progress; editing resumes when it finishes");
                } else {
                    self.editor.input(key);
                }
            }
            Focus::Options => {
                let count = self.form.request().predefined_options.len();
                match key.code {
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.option_cursor = self.option_cursor.saturating_sub(1)
                    }
                    KeyCode::Down | KeyCode::Char('j') if self.option_cursor + 1 < count => {
                        self.option_cursor += 1
                    }
                    KeyCode::Char(' ') | KeyCode::Enter => {
                        if let Err(e) = self.form.toggle_option(self.option_cursor) {
                            self.form.set_status(e.to_string());
                        }
                    }
                    _ => {}
                }
            }
            Focus::Images => {
                let count = self.form.images().len();
                match key.code {
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.image_cursor = self.image_cursor.saturating_sub(1)
                    }
                    KeyCode::Down | KeyCode::Char('j') if self.image_cursor + 1 < count => {
                        self.image_cursor += 1
                    }
                    KeyCode::Delete | KeyCode::Backspace | KeyCode::Char('d') => {
                        match self.form.remove_image(self.image_cursor) {
                            Ok(_) => {
                                let left = self.form.images().len();
                                self.image_cursor = self.image_cursor.min(left.saturating_sub(1));
                                self.form.set_status("Image removed");
                            }
                            Err(e) => self.form.set_status(e.to_string()),
                        }
                    }
                    _ => {}
                }
            }
            Focus::Session => match key.code {
                KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') | KeyCode::Enter => {
                    self.toggle_session()
                }
                _ => {}
            },
        }
    }

    fn toggle_session(&mut self) {
        let next = self.form.session_control().toggled();
        self.form.set_session_control(next);
    }

    fn attach_from_input(&mut self, raw: &str) {
        // Terminals quote dropped paths
        let path = raw.trim().trim_matches(|c| c == '\'' || c == '"');
        if path.is_empty() {
            return;
        }
        match self.form.attach_image(Path::new(path)) {
            Ok(_) => self.image_cursor = self.form.images().len() - 1,
            Err(e) => self.form.set_status(e.to_string()),
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let request = self.form.request();
        let context = strip_bold_markdown(&request.project_context);
        let prompt = strip_bold_markdown(&request.prompt);
        let option_count = request.predefined_options.len();

        let mut constraints = Vec::new();
        if !context.is_empty() {
            constraints.push(Constraint::Length(pane_height(&context, 6)));
        }
        constraints.push(Constraint::Length(pane_height(&prompt, 10)));
        if option_count > 0 {
            constraints.push(Constraint::Length(option_count.min(MAX_OPTION_ROWS) as u16 + 2));
        }
        constraints.push(Constraint::Min(5));
        constraints.push(Constraint::Length(
            self.form.images().len().clamp(1, 4) as u16 + 2,
        ));
        constraints.push(Constraint::Length(3));
        constraints.push(Constraint::Length(4));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(f.area());
        let mut areas = chunks.iter().copied();
        let mut next_area = || areas.next().unwrap_or_default();

        if !context.is_empty() {
            let pane = Paragraph::new(context)
                .style(Style::default().fg(Color::Gray))
                .block(pane_block("Project context", false))
                .wrap(Wrap { trim: false });
            f.render_widget(pane, next_area());
        }

        let prompt_pane = Paragraph::new(prompt)
            .block(pane_block("Question", false))
            .wrap(Wrap { trim: false });
        f.render_widget(prompt_pane, next_area());

        if option_count > 0 {
            let focused = self.focus == Focus::Options;
            let start = self
                .option_cursor
                .saturating_sub(MAX_OPTION_ROWS.saturating_sub(1));
            let lines: Vec<Line> = self
                .form
                .options()
                .enumerate()
                .skip(start)
                .take(MAX_OPTION_ROWS)
                .map(|(i, (label, on))| {
                    let mark = if on { "[x] " } else { "[ ] " };
                    let style = if focused && i == self.option_cursor {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Line::styled(format!("{mark}{label}"), style)
                })
                .collect();
            f.render_widget(
                Paragraph::new(lines).block(pane_block("Options (Space to toggle)", focused)),
                next_area(),
            );
        }

        let editor_title = if self.form.enhancement_pending() {
            "Feedback (enhancing...)"
        } else {
            "Feedback"
        };
        self.editor
            .set_block(pane_block(editor_title, self.focus == Focus::Editor));
        f.render_widget(&self.editor, next_area());

        let images_focused = self.focus == Focus::Images;
        let image_lines: Vec<Line> = if self.form.images().is_empty() {
            vec![Line::styled(
                "(none) Ctrl-O to attach an image file",
                Style::default().fg(Color::DarkGray),
            )]
        } else {
            self.form
                .images()
                .iter()
                .enumerate()
                .map(|(i, img)| {
                    let style = if images_focused && i == self.image_cursor {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Line::styled(
                        format!("{}. {} ({})", i + 1, img.mime_type, human_size(img.len())),
                        style,
                    )
                })
                .collect()
        };
        f.render_widget(
            Paragraph::new(image_lines).block(pane_block("Images (Del to remove)", images_focused)),
            next_area(),
        );

        let session = self.form.session_control();
        let radio = |value: SessionControl, label: &str| {
            let mark = if session == value { "(•) " } else { "( ) " };
            Span::raw(format!("{mark}{label}   "))
        };
        let session_line = Line::from(vec![
            radio(SessionControl::Continue, "Continue session"),
            radio(SessionControl::Terminate, "Finish task"),
        ]);
        f.render_widget(
            Paragraph::new(session_line)
                .block(pane_block("Session", self.focus == Focus::Session)),
            next_area(),
        );

        let status = self.form.status().unwrap_or("").to_string();
        let footer = Paragraph::new(vec![
            Line::styled(status, Style::default().fg(Color::Yellow)),
            Line::styled(HELP, Style::default().fg(Color::DarkGray)),
        ])
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
        f.render_widget(footer, next_area());

        if let Some(input) = self.path_input.as_ref() {
            let area = centered_rect(70, 3, f.area());
            f.render_widget(Clear, area);
            f.render_widget(input, area);
        }
    }
}
