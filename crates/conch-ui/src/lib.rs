use anyhow::Result;
use conch_core::{
    AppConfig, CommandExecutor, CommandVocabulary, Console, EventKind, EventLog, InputKey,
    KeyReaction, SubmitStatus, VisualState,
};
use conch_observe::Observer;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::Frame;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::{Terminal, TerminalOptions, Viewport};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// Rows reserved for the inline viewport.
const VIEWPORT_ROWS: u16 = 18;
/// Most dropdown rows shown at once; longer option lists scroll.
const MENU_ROWS: usize = 6;

// ─── Key Bindings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct KeyBindings {
    pub exit: KeyEvent,
    pub submit: KeyEvent,
    pub autocomplete: KeyEvent,
    pub history_prev: KeyEvent,
    pub history_next: KeyEvent,
    pub clear_screen: KeyEvent,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct KeyBindingsFile {
    exit: Option<String>,
    submit: Option<String>,
    autocomplete: Option<String>,
    history_prev: Option<String>,
    history_next: Option<String>,
    clear_screen: Option<String>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            exit: KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            submit: KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE),
            autocomplete: KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE),
            history_prev: KeyEvent::new(KeyCode::Up, KeyModifiers::NONE),
            history_next: KeyEvent::new(KeyCode::Down, KeyModifiers::NONE),
            clear_screen: KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL),
        }
    }
}

impl KeyBindings {
    /// Build from the `ui.keybindings` config value; `null` means defaults.
    pub fn from_config(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let raw: KeyBindingsFile = serde_json::from_value(value.clone())?;
        Self::default().apply_overrides(raw)
    }

    fn apply_overrides(mut self, raw: KeyBindingsFile) -> Result<Self> {
        if let Some(value) = raw.exit {
            self.exit = parse_key_event(&value)?;
        }
        if let Some(value) = raw.submit {
            self.submit = parse_key_event(&value)?;
        }
        if let Some(value) = raw.autocomplete {
            self.autocomplete = parse_key_event(&value)?;
        }
        if let Some(value) = raw.history_prev {
            self.history_prev = parse_key_event(&value)?;
        }
        if let Some(value) = raw.history_next {
            self.history_next = parse_key_event(&value)?;
        }
        if let Some(value) = raw.clear_screen {
            self.clear_screen = parse_key_event(&value)?;
        }
        Ok(self)
    }
}

fn parse_key_event(value: &str) -> Result<KeyEvent> {
    let mut modifiers = KeyModifiers::NONE;
    let mut key_code: Option<KeyCode> = None;
    for token in value
        .split('+')
        .map(str::trim)
        .filter(|part| !part.is_empty())
    {
        let normalized = token.to_ascii_lowercase();
        match normalized.as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            "alt" | "option" => modifiers |= KeyModifiers::ALT,
            other => {
                key_code = Some(
                    parse_key_code(other)
                        .ok_or_else(|| anyhow::anyhow!("unsupported keybinding token: {token}"))?,
                );
            }
        }
    }
    let code = key_code.ok_or_else(|| anyhow::anyhow!("missing key code in keybinding"))?;
    Ok(KeyEvent::new(code, modifiers))
}

fn parse_key_code(value: &str) -> Option<KeyCode> {
    match value {
        "enter" => Some(KeyCode::Enter),
        "esc" | "escape" => Some(KeyCode::Esc),
        "tab" => Some(KeyCode::Tab),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        "backspace" => Some(KeyCode::Backspace),
        "space" => Some(KeyCode::Char(' ')),
        value if value.chars().count() == 1 => value.chars().next().map(KeyCode::Char),
        _ => None,
    }
}

// ─── Option Menu ────────────────────────────────────────────────────────────

/// Dropdown state for an open ambiguity menu. Each row carries the literal
/// replacement payload it was created with.
#[derive(Debug, Clone)]
pub struct OptionMenuState {
    options: Vec<String>,
    selected: usize,
}

impl OptionMenuState {
    #[must_use]
    pub fn new(options: Vec<String>) -> Self {
        Self {
            options,
            selected: 0,
        }
    }

    pub fn up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        } else if !self.options.is_empty() {
            self.selected = self.options.len() - 1;
        }
    }

    pub fn down(&mut self) {
        if !self.options.is_empty() {
            self.selected = (self.selected + 1) % self.options.len();
        }
    }

    #[must_use]
    pub fn selected_value(&self) -> Option<&str> {
        self.options.get(self.selected).map(String::as_str)
    }

    /// Dropdown rows for the info area, viewport centered on the selection.
    #[must_use]
    pub fn display_lines(&self, max_lines: usize) -> Vec<String> {
        let total = self.options.len();
        if total == 0 {
            return vec!["(no options)".to_string()];
        }
        let show = total.min(max_lines.max(1));
        let half = show / 2;
        let start = if self.selected <= half {
            0
        } else if self.selected + half >= total {
            total.saturating_sub(show)
        } else {
            self.selected - half
        };
        let end = (start + show).min(total);

        (start..end)
            .map(|i| {
                let marker = if i == self.selected { ">" } else { " " };
                format!("{marker} {}", self.options[i])
            })
            .collect()
    }
}

// ─── Transcript ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TranscriptKind {
    Command,
    Feedback,
    ErrorFeedback,
}

/// Scrollback of submitted commands and their feedback, capped at the
/// configured line limit (oldest dropped first).
#[derive(Debug)]
pub struct Transcript {
    lines: VecDeque<(TranscriptKind, String)>,
    limit: usize,
}

impl Transcript {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push_command(&mut self, prompt: &str, input: &str) {
        self.push(TranscriptKind::Command, format!("{prompt}{input}"));
    }

    /// Feedback may span several lines; each becomes its own row.
    pub fn push_feedback(&mut self, text: &str, error: bool) {
        let kind = if error {
            TranscriptKind::ErrorFeedback
        } else {
            TranscriptKind::Feedback
        };
        for line in text.split('\n') {
            self.push(kind, line.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, kind: TranscriptKind, line: String) {
        self.lines.push_back((kind, line));
        while self.lines.len() > self.limit {
            let _ = self.lines.pop_front();
        }
    }

    fn tail(&self, rows: usize) -> impl Iterator<Item = &(TranscriptKind, String)> {
        let skip = self.lines.len().saturating_sub(rows);
        self.lines.iter().skip(skip)
    }
}

// ─── Event loop ─────────────────────────────────────────────────────────────

/// Run the interactive console until the exit binding is pressed or the
/// executor requests the session end.
pub fn run_console<V: CommandVocabulary, E: CommandExecutor>(
    console: &mut Console<V, E>,
    observer: &Observer,
    config: &AppConfig,
) -> Result<()> {
    let bindings = KeyBindings::from_config(&config.ui.keybindings)?;
    enable_raw_mode()?;
    let result = event_loop(console, observer, config, &bindings);
    disable_raw_mode()?;
    result
}

fn event_loop<V: CommandVocabulary, E: CommandExecutor>(
    console: &mut Console<V, E>,
    observer: &Observer,
    config: &AppConfig,
    bindings: &KeyBindings,
) -> Result<()> {
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(VIEWPORT_ROWS),
        },
    )?;
    let mut events = EventLog::new();
    let mut transcript = Transcript::new(config.ui.transcript_limit);
    let mut menu: Option<OptionMenuState> = None;
    let mut cursor_pos: usize = 0;
    let mut info_line = String::from(" Tab complete | Up/Down history | Ctrl+C exit");
    let prompt = config.ui.prompt.clone();

    loop {
        let input = console.input().to_string();
        let error = console.visual_state() == VisualState::Error;
        terminal.draw(|frame| {
            draw(
                frame,
                &prompt,
                &input,
                error,
                cursor_pos,
                &transcript,
                menu.as_ref(),
                &info_line,
            );
        })?;

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }
        let key = match event::read()? {
            Event::Resize(_, _) => {
                // The next draw pass recomputes the layout.
                continue;
            }
            Event::Paste(pasted) => {
                let mut input = console.input().to_string();
                let at = cursor_pos.min(input.len());
                input.insert_str(at, &pasted);
                cursor_pos = at + pasted.len();
                console.on_text_edited(input);
                continue;
            }
            Event::Key(key) => key,
            _ => continue,
        };
        // Only key presses; some platforms also send release/repeat.
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // ── Open option menu ─────────────────────────────────────────
        if let Some(state) = menu.as_mut() {
            match key.code {
                KeyCode::Up | KeyCode::BackTab => {
                    state.up();
                    continue;
                }
                KeyCode::Down | KeyCode::Tab => {
                    state.down();
                    continue;
                }
                KeyCode::Enter => {
                    if let Some(option) = state.selected_value() {
                        let option = option.to_string();
                        console.on_option_selected(&option);
                        cursor_pos = console.input().len();
                        let _ = observer
                            .record_event(&events.envelope(EventKind::MenuOptionChosen { option }));
                    } else {
                        console.on_key(InputKey::Other);
                    }
                    menu = None;
                    info_line.clear();
                    continue;
                }
                _ => {
                    // Everything else dismisses the menu; the key still gets
                    // its normal handling below.
                    console.on_key(InputKey::Other);
                    menu = None;
                    info_line.clear();
                }
            }
        }

        if key == bindings.exit {
            break;
        }
        if key == bindings.clear_screen {
            transcript.clear();
            continue;
        }
        if key == bindings.history_prev {
            if console.on_key(InputKey::Up) == KeyReaction::InputReplaced {
                cursor_pos = console.input().len();
            }
            continue;
        }
        if key == bindings.history_next {
            if console.on_key(InputKey::Down) == KeyReaction::InputReplaced {
                cursor_pos = console.input().len();
            }
            continue;
        }
        if key == bindings.autocomplete {
            let before = console.input().to_string();
            match console.on_key(InputKey::Autocomplete) {
                KeyReaction::InputReplaced => {
                    cursor_pos = console.input().len();
                    let _ = observer.record_event(&events.envelope(EventKind::CompletionApplied {
                        from: before,
                        to: console.input().to_string(),
                    }));
                }
                KeyReaction::MenuOpened => {
                    if let Some(options) = console.menu_options() {
                        let _ =
                            observer.record_event(&events.envelope(EventKind::CompletionAmbiguous {
                                prefix: before,
                                option_count: options.len(),
                            }));
                        menu = Some(OptionMenuState::new(options.to_vec()));
                    }
                }
                KeyReaction::CompletionFailed => {
                    observer.verbose_log(&format!("no completion for `{before}`"));
                    let _ = observer.record_event(
                        &events.envelope(EventKind::CompletionFailed { prefix: before }),
                    );
                }
                _ => {}
            }
            continue;
        }
        if key == bindings.submit {
            let command = console.input().to_string();
            if command.trim().is_empty() {
                continue;
            }
            transcript.push_command(&prompt, &command);
            let _ = observer.record_event(&events.envelope(EventKind::CommandSubmitted {
                source: "input".to_string(),
            }));
            let mut feedback: Vec<String> = Vec::new();
            let status = console.on_submit(&mut |text: &str| feedback.push(text.to_string()));
            match status {
                SubmitStatus::Accepted => {
                    for line in &feedback {
                        let _ = observer.record_event(&events.envelope(
                            EventKind::CommandSucceeded {
                                feedback: line.clone(),
                            },
                        ));
                        transcript.push_feedback(line, false);
                    }
                }
                SubmitStatus::Rejected => {
                    for line in &feedback {
                        let _ = observer.record_event(&events.envelope(
                            EventKind::CommandRejected {
                                message: line.clone(),
                            },
                        ));
                        transcript.push_feedback(line, true);
                    }
                }
                SubmitStatus::Ignored => {
                    info_line = " still processing the previous command".to_string();
                }
            }
            cursor_pos = console.input().len();
            if console.executor().exit_requested() {
                break;
            }
            continue;
        }

        // ── Plain editing keys ───────────────────────────────────────
        match key.code {
            KeyCode::Left => {
                cursor_pos = prev_boundary(console.input(), cursor_pos);
            }
            KeyCode::Right => {
                cursor_pos = next_boundary(console.input(), cursor_pos);
            }
            KeyCode::Home => {
                cursor_pos = 0;
            }
            KeyCode::End => {
                cursor_pos = console.input().len();
            }
            KeyCode::Backspace => {
                let mut input = console.input().to_string();
                let at = cursor_pos.min(input.len());
                if let Some(idx) = input[..at].char_indices().next_back().map(|(i, _)| i) {
                    input.remove(idx);
                    cursor_pos = idx;
                    console.on_text_edited(input);
                }
            }
            KeyCode::Char(ch)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT) =>
            {
                let mut input = console.input().to_string();
                let at = cursor_pos.min(input.len());
                input.insert(at, ch);
                cursor_pos = at + ch.len_utf8();
                console.on_text_edited(input);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Byte index of the previous character boundary, clamped at 0.
fn prev_boundary(text: &str, pos: usize) -> usize {
    text[..pos.min(text.len())]
        .char_indices()
        .next_back()
        .map_or(0, |(i, _)| i)
}

/// Byte index of the next character boundary, clamped at the end.
fn next_boundary(text: &str, pos: usize) -> usize {
    let at = pos.min(text.len());
    at + text[at..].chars().next().map_or(0, char::len_utf8)
}

// ─── Rendering ──────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn draw(
    frame: &mut Frame,
    prompt: &str,
    input: &str,
    error: bool,
    cursor_pos: usize,
    transcript: &Transcript,
    menu: Option<&OptionMenuState>,
    info_line: &str,
) {
    let area = frame.area();
    if area.height < 4 || area.width == 0 {
        return;
    }
    let width = area.width;

    let below_rows = menu.map_or(1, |m| m.display_lines(MENU_ROWS).len() as u16).min(area.height - 3);
    let transcript_rows = area.height - 2 - below_rows;
    let sep_y = area.y + transcript_rows;
    let input_y = sep_y + 1;
    let below_y = input_y + 1;

    // Transcript rows, newest at the bottom.
    let rows: Vec<Line> = transcript
        .tail(transcript_rows as usize)
        .map(|(kind, text)| match kind {
            TranscriptKind::Command => Line::from(Span::styled(
                text.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            TranscriptKind::Feedback => Line::from(Span::raw(text.clone())),
            TranscriptKind::ErrorFeedback => {
                Line::from(Span::styled(text.clone(), Style::default().fg(Color::Red)))
            }
        })
        .collect();
    let filler = transcript_rows.saturating_sub(rows.len() as u16);
    let transcript_area = Rect::new(area.x, area.y + filler, width, transcript_rows - filler);
    frame.render_widget(Paragraph::new(rows), transcript_area);

    // Separator.
    frame.render_widget(
        Paragraph::new(Span::styled(
            "\u{2500}".repeat(width as usize),
            Style::default().fg(Color::DarkGray),
        )),
        Rect::new(area.x, sep_y, width, 1),
    );

    // Input row: prompt, text split around a block caret; red when the last
    // outcome failed.
    let at = cursor_pos.min(input.len());
    let text_style = if error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let input_area = Rect::new(area.x, input_y, width, 1);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                prompt.to_string(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(input[..at].to_string(), text_style),
            Span::styled("\u{2588}", Style::default().fg(Color::Gray)),
            Span::styled(input[at..].to_string(), text_style),
        ])),
        input_area,
    );

    // Dropdown rows when the menu is open, info line otherwise.
    let below_area = Rect::new(area.x, below_y, width, below_rows);
    match menu {
        Some(state) => {
            let lines: Vec<Line> = state
                .display_lines(MENU_ROWS)
                .into_iter()
                .map(|row| {
                    let style = if row.starts_with('>') {
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(Color::Gray)
                    };
                    Line::from(Span::styled(row, style))
                })
                .collect();
            frame.render_widget(Paragraph::new(lines), below_area);
        }
        None => {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    info_line.to_string(),
                    Style::default().fg(Color::DarkGray),
                )),
                below_area,
            );
        }
    }
}
