use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Default cap on recallable submissions.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".conch")
}

// ─── History ────────────────────────────────────────────────────────────────

/// Boundary errors for history navigation. Callers guard with
/// `has_previous`/`has_next`; these never reach the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("no previous history entry")]
    NoPreviousEntry,
    #[error("no next history entry")]
    NoNextEntry,
}

/// Append-ordered log of submitted input lines, oldest first, capped at
/// `max_entries` (oldest evicted first).
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<String>,
    max_entries: usize,
}

impl HistoryLog {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a submission. Every submission is recorded, accepted or not.
    pub fn record(&mut self, entry: impl Into<String>) {
        self.entries.push_back(entry.into());
        if self.entries.len() > self.max_entries {
            let _ = self.entries.pop_front();
        }
    }

    /// A cursor over the current entries, positioned at the current end.
    #[must_use]
    pub fn snapshot(&self) -> HistoryCursor {
        HistoryCursor::new(self.entries.iter().cloned().collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Bidirectional pointer over a snapshot of the history log.
///
/// A freshly initialized cursor carries exactly one empty sentinel entry as
/// its newest position ("nothing typed yet"). Navigation never resets the
/// cursor; only a new submission replaces it with a fresh snapshot, so
/// repeated up/down presses walk one consistent view even if the log grows
/// underneath.
#[derive(Debug, Clone)]
pub struct HistoryCursor {
    entries: Vec<String>,
    /// One past the index of the current element; 0 means "before the first
    /// entry" (the position over an empty snapshot).
    pos: usize,
}

impl HistoryCursor {
    fn new(entries: Vec<String>) -> Self {
        let pos = entries.len();
        Self { entries, pos }
    }

    /// True iff a less-recent entry exists.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.pos >= 2
    }

    /// Step toward older entries and return the entry landed on.
    pub fn previous(&mut self) -> Result<&str, NavigationError> {
        if !self.has_previous() {
            return Err(NavigationError::NoPreviousEntry);
        }
        self.pos -= 1;
        Ok(self.entries[self.pos - 1].as_str())
    }

    /// True iff a more-recent entry exists (the sentinel included).
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pos < self.entries.len()
    }

    /// Step toward newer entries and return the entry landed on.
    pub fn next(&mut self) -> Result<&str, NavigationError> {
        if !self.has_next() {
            return Err(NavigationError::NoNextEntry);
        }
        self.pos += 1;
        Ok(self.entries[self.pos - 1].as_str())
    }

    /// Push a new latest entry. Used to install the empty sentinel at
    /// (re)initialization; the cursor position is unaffected.
    pub fn append(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }
}

// ─── Collaborator traits ────────────────────────────────────────────────────

/// Read-only prefix-lookup service over the session's command vocabulary.
/// Constructed once per session; the controller never mutates it.
pub trait CommandVocabulary {
    /// Longest unique completion for `prefix`. Returns `prefix` itself when
    /// several entries share it with no unique extension (the ambiguity
    /// marker), `None` when no entry shares the prefix.
    fn resolve(&self, prefix: &str) -> Option<String>;

    /// Full candidate strings sharing `prefix`, in vocabulary order.
    fn options_for(&self, prefix: &str) -> Vec<String>;

    /// Exact membership in the set of complete, executable command names.
    fn is_complete_command(&self, text: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandRejected {
    pub message: String,
}

impl CommandRejected {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external command executor: one string in, feedback or a rejection out.
pub trait CommandExecutor {
    fn execute(&mut self, command: &str) -> Result<CommandOutcome, CommandRejected>;

    /// Whether the executor has asked the session to end (e.g. an `exit`
    /// command). Frontends poll this after each submission.
    fn exit_requested(&self) -> bool {
        false
    }
}

/// Output channel for executor feedback. Implemented for any `FnMut(&str)`.
pub trait FeedbackSink {
    fn emit(&mut self, feedback: &str);
}

impl<F: FnMut(&str)> FeedbackSink for F {
    fn emit(&mut self, feedback: &str) {
        self(feedback);
    }
}

// ─── Autocomplete resolution ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No vocabulary entry shares the input as a prefix.
    #[error("no completion available")]
    NoCompletionAvailable,
}

/// Outcome of resolving the current input against the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The completion is itself a full command; replaces the entire input.
    Command(String),
    /// The input is already a full command and the completion is a parameter
    /// template to append after it. Carries the full replacement text.
    Parameters(String),
    /// Several vocabulary entries share the prefix with no unique extension.
    /// Carries the candidate list for the option menu.
    Ambiguous(Vec<String>),
    /// A completion exists but is neither a full command nor an extension of
    /// one. The session is left untouched.
    Unactionable,
}

/// Resolve `input` against the vocabulary. Priority-ordered; first match
/// wins.
pub fn resolve_input<V: CommandVocabulary>(
    input: &str,
    vocabulary: &V,
) -> Result<Resolution, ResolveError> {
    let Some(completion) = vocabulary.resolve(input) else {
        return Err(ResolveError::NoCompletionAvailable);
    };
    if completion == input {
        // No unique extension: several entries share this prefix. The option
        // list may be empty if the vocabulary is inconsistent; passed through
        // untouched.
        return Ok(Resolution::Ambiguous(vocabulary.options_for(input)));
    }
    if vocabulary.is_complete_command(&completion) {
        return Ok(Resolution::Command(completion));
    }
    if vocabulary.is_complete_command(input) {
        return Ok(Resolution::Parameters(format!("{input}{completion}")));
    }
    Ok(Resolution::Unactionable)
}

// ─── Input controller ───────────────────────────────────────────────────────

/// Visual state of the input field, derived from the last outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualState {
    #[default]
    Normal,
    Error,
}

/// Keys the controller reacts to. Frontends map their own bindings onto
/// these; everything unmapped is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Up,
    Down,
    Autocomplete,
    Other,
}

/// What a key press did to the session, for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReaction {
    /// Nothing changed.
    None,
    /// The input text was replaced (history entry or applied completion);
    /// the caret belongs at end-of-text.
    InputReplaced,
    /// The option menu opened with the current candidates.
    MenuOpened,
    /// Resolution found nothing actionable; the error style was set.
    CompletionFailed,
    /// An open option menu was dismissed.
    MenuClosed,
}

/// Result of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    Rejected,
    /// Refused by the single-slot busy guard; nothing happened.
    Ignored,
}

/// The command-input controller: one per interactive session.
///
/// Owns the input text, the visual state, the history log and its current
/// cursor, and the open option menu. The vocabulary and executor are fixed
/// at construction; all operations are synchronous reactions to single
/// input events.
pub struct Console<V, E> {
    vocabulary: V,
    executor: E,
    input: String,
    visual: VisualState,
    history: HistoryLog,
    cursor: HistoryCursor,
    menu: Option<Vec<String>>,
    busy: bool,
}

impl<V: CommandVocabulary, E: CommandExecutor> Console<V, E> {
    #[must_use]
    pub fn new(vocabulary: V, executor: E, history_limit: usize) -> Self {
        let history = HistoryLog::new(history_limit);
        let cursor = init_cursor(&history);
        Self {
            vocabulary,
            executor,
            input: String::new(),
            visual: VisualState::Normal,
            history,
            cursor,
            menu: None,
            busy: false,
        }
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn visual_state(&self) -> VisualState {
        self.visual
    }

    /// Open option menu, if any. Each option carries its literal payload.
    #[must_use]
    pub fn menu_options(&self) -> Option<&[String]> {
        self.menu.as_deref()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// React to a key press.
    pub fn on_key(&mut self, key: InputKey) -> KeyReaction {
        match key {
            InputKey::Up => match self.cursor.previous() {
                Ok(entry) => {
                    let entry = entry.to_string();
                    self.replace_text(entry);
                    KeyReaction::InputReplaced
                }
                Err(_) => KeyReaction::None,
            },
            InputKey::Down => match self.cursor.next() {
                Ok(entry) => {
                    let entry = entry.to_string();
                    self.replace_text(entry);
                    KeyReaction::InputReplaced
                }
                Err(_) => KeyReaction::None,
            },
            InputKey::Autocomplete => self.handle_autocomplete(),
            InputKey::Other => {
                if self.menu.take().is_some() {
                    KeyReaction::MenuClosed
                } else {
                    KeyReaction::None
                }
            }
        }
    }

    /// Submit the current input text.
    pub fn on_submit(&mut self, sink: &mut impl FeedbackSink) -> SubmitStatus {
        let command = self.input.clone();
        self.submit_command(&command, sink)
    }

    /// Submit an externally supplied command, bypassing the visible field.
    /// Success still clears the field, whatever it held.
    pub fn on_submit_text(&mut self, command: &str, sink: &mut impl FeedbackSink) -> SubmitStatus {
        self.submit_command(command, sink)
    }

    /// Apply a chosen menu option as a full replacement and dismiss the
    /// entire menu (single-shot).
    pub fn on_option_selected(&mut self, option: &str) {
        self.replace_text(option.to_string());
        self.menu = None;
    }

    /// User-driven edit notification: stores the text and resets the error
    /// style. Controller-driven replacements never come through here.
    pub fn on_text_edited(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.visual = VisualState::Normal;
    }

    fn handle_autocomplete(&mut self) -> KeyReaction {
        match resolve_input(&self.input, &self.vocabulary) {
            Ok(Resolution::Command(completion)) => {
                self.replace_text(completion);
                KeyReaction::InputReplaced
            }
            Ok(Resolution::Parameters(full)) => {
                self.replace_text(full);
                KeyReaction::InputReplaced
            }
            Ok(Resolution::Ambiguous(options)) => {
                self.visual = VisualState::Error;
                self.menu = Some(options);
                KeyReaction::MenuOpened
            }
            Ok(Resolution::Unactionable) => KeyReaction::None,
            Err(ResolveError::NoCompletionAvailable) => {
                self.visual = VisualState::Error;
                KeyReaction::CompletionFailed
            }
        }
    }

    fn submit_command(&mut self, command: &str, sink: &mut impl FeedbackSink) -> SubmitStatus {
        if self.busy {
            return SubmitStatus::Ignored;
        }
        self.busy = true;
        // The attempt is recorded whether or not the executor accepts it, so
        // a rejected command stays reachable for correction via Up.
        self.history.record(command);
        let result = self.executor.execute(command);
        self.cursor = init_cursor(&self.history);
        let status = match result {
            Ok(outcome) => {
                self.input.clear();
                self.visual = VisualState::Normal;
                sink.emit(&outcome.feedback);
                SubmitStatus::Accepted
            }
            Err(rejected) => {
                self.visual = VisualState::Error;
                sink.emit(&rejected.message);
                SubmitStatus::Rejected
            }
        };
        self.busy = false;
        status
    }

    /// Controller-driven text replacement. The visual state is left alone;
    /// only user edits reset it.
    fn replace_text(&mut self, text: String) {
        self.input = text;
    }
}

/// Fresh cursor over the full log: snapshot, install the sentinel, advance
/// once to park on it so the first Up lands on the newest real entry.
fn init_cursor(history: &HistoryLog) -> HistoryCursor {
    let mut cursor = history.snapshot();
    cursor.append("");
    let _ = cursor.next();
    cursor
}

// ─── Session events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq_no: u64,
    pub at: DateTime<Utc>,
    pub session_id: Uuid,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum EventKind {
    CommandSubmitted {
        source: String,
    },
    CommandSucceeded {
        feedback: String,
    },
    CommandRejected {
        message: String,
    },
    CompletionApplied {
        from: String,
        to: String,
    },
    CompletionAmbiguous {
        prefix: String,
        option_count: usize,
    },
    CompletionFailed {
        prefix: String,
    },
    MenuOptionChosen {
        option: String,
    },
}

/// Envelope factory for one session: stable session id, monotonic sequence.
#[derive(Debug)]
pub struct EventLog {
    session_id: Uuid,
    next_seq: u64,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::now_v7(),
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn envelope(&mut self, kind: EventKind) -> EventEnvelope {
        self.next_seq += 1;
        EventEnvelope {
            seq_no: self.next_seq,
            at: Utc::now(),
            session_id: self.session_id,
            kind,
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub history: HistoryConfig,
    pub ui: UiConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Cap on recallable submissions; oldest entries are evicted first.
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub prompt: String,
    /// Cap on retained transcript lines in the frontend.
    pub transcript_limit: usize,
    /// Key binding overrides as `"name": "ctrl+x"` string values; parsed by
    /// the frontend.
    pub keybindings: serde_json::Value,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            transcript_limit: 400,
            keybindings: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl AppConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        let home = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())?;
        Some(Path::new(&home).join(".conch/settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    pub fn legacy_toml_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    /// Layered load: defaults, then the legacy TOML file, then user,
    /// project, and local project JSON settings, each merged over the last.
    pub fn load(workspace: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let legacy = Self::legacy_toml_path(workspace);
        if legacy.exists() {
            let raw = fs::read_to_string(legacy)?;
            let legacy_cfg: AppConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(legacy_cfg)?);
        }

        let mut paths = Vec::new();
        if let Some(user) = Self::user_settings_path() {
            paths.push(user);
        }
        paths.push(Self::project_settings_path(workspace));
        paths.push(Self::project_local_settings_path(workspace));

        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            merge_json_value(&mut merged, &value);
        }

        Ok(serde_json::from_value(merged)?)
    }

    /// Load, writing the default project settings file first when no
    /// settings exist anywhere.
    pub fn ensure(workspace: &Path) -> Result<Self> {
        let path = Self::project_settings_path(workspace);
        if path.exists()
            || Self::project_local_settings_path(workspace).exists()
            || Self::legacy_toml_path(workspace).exists()
            || Self::user_settings_path().is_some_and(|p| p.exists())
        {
            return Self::load(workspace);
        }
        fs::create_dir_all(
            path.parent()
                .ok_or_else(|| anyhow::anyhow!("invalid config path"))?,
        )?;
        let cfg = Self::default();
        cfg.save(workspace)?;
        Ok(cfg)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::project_settings_path(workspace);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Recursive JSON merge: objects merge key-wise, everything else overwrites.
pub fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => merge_json_value(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    // ── History cursor tests ──────────────────────────────────────────

    fn parked_cursor(entries: &[&str]) -> HistoryCursor {
        let mut log = HistoryLog::new(DEFAULT_HISTORY_LIMIT);
        for entry in entries {
            log.record(*entry);
        }
        let mut cursor = log.snapshot();
        cursor.append("");
        let _ = cursor.next();
        cursor
    }

    #[test]
    fn cursor_walks_entries_newest_first() {
        let mut cursor = parked_cursor(&["a", "b"]);
        assert_eq!(cursor.previous(), Ok("b"));
        assert_eq!(cursor.previous(), Ok("a"));
        assert!(!cursor.has_previous());
        assert_eq!(cursor.previous(), Err(NavigationError::NoPreviousEntry));
        assert_eq!(cursor.next(), Ok("b"));
    }

    #[test]
    fn fresh_cursor_parks_on_the_sentinel() {
        let mut log = HistoryLog::new(DEFAULT_HISTORY_LIMIT);
        log.record("list");
        let mut cursor = log.snapshot();
        cursor.append("");
        // Exactly one step forward lands on the sentinel; no further step
        // is possible until a new submission rebuilds the cursor.
        assert_eq!(cursor.next(), Ok(""));
        assert!(!cursor.has_next());
        assert_eq!(cursor.next(), Err(NavigationError::NoNextEntry));
        assert_eq!(cursor.previous(), Ok("list"));
    }

    #[test]
    fn empty_log_cursor_only_holds_the_sentinel() {
        let mut cursor = parked_cursor(&[]);
        assert!(!cursor.has_previous());
        assert!(!cursor.has_next());
    }

    #[test]
    fn log_evicts_oldest_beyond_cap() {
        let mut log = HistoryLog::new(2);
        log.record("one");
        log.record("two");
        log.record("three");
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries().collect::<Vec<_>>(), vec!["two", "three"]);
    }

    #[test]
    fn append_does_not_move_the_cursor() {
        let mut cursor = parked_cursor(&["a"]);
        assert_eq!(cursor.previous(), Ok("a"));
        cursor.append("later");
        // Still parked on "a"; the new entry is reachable forward only.
        assert!(!cursor.has_previous());
        assert_eq!(cursor.next(), Ok(""));
        assert_eq!(cursor.next(), Ok("later"));
    }

    proptest! {
        #[test]
        fn guarded_navigation_never_fails(
            entries in prop::collection::vec("[a-z]{0,6}", 0..8),
            toward_older in prop::collection::vec(any::<bool>(), 0..32),
        ) {
            let mut log = HistoryLog::new(DEFAULT_HISTORY_LIMIT);
            for entry in &entries {
                log.record(entry.clone());
            }
            let mut cursor = log.snapshot();
            cursor.append("");
            let _ = cursor.next();
            for older in toward_older {
                if older {
                    if cursor.has_previous() {
                        prop_assert!(cursor.previous().is_ok());
                    } else {
                        prop_assert_eq!(
                            cursor.previous(),
                            Err(NavigationError::NoPreviousEntry)
                        );
                    }
                } else if cursor.has_next() {
                    prop_assert!(cursor.next().is_ok());
                } else {
                    prop_assert_eq!(cursor.next(), Err(NavigationError::NoNextEntry));
                }
            }
        }
    }

    // ── Resolver tests ────────────────────────────────────────────────

    struct StubVocabulary;

    impl CommandVocabulary for StubVocabulary {
        fn resolve(&self, prefix: &str) -> Option<String> {
            match prefix {
                "ad" => Some("add".to_string()),
                "add" => Some(" n/NAME".to_string()),
                "a" => Some("a".to_string()),
                "li" => Some("list".to_string()),
                // An extension that is not a command, from a prefix that is
                // not a command either.
                "he" => Some("hel".to_string()),
                _ => None,
            }
        }

        fn options_for(&self, prefix: &str) -> Vec<String> {
            match prefix {
                "a" => vec!["add".to_string(), "alias".to_string()],
                _ => Vec::new(),
            }
        }

        fn is_complete_command(&self, text: &str) -> bool {
            matches!(text, "add" | "list")
        }
    }

    #[test]
    fn resolves_prefix_to_full_command() {
        assert_eq!(
            resolve_input("ad", &StubVocabulary),
            Ok(Resolution::Command("add".to_string()))
        );
    }

    #[test]
    fn appends_parameter_template_after_complete_command() {
        assert_eq!(
            resolve_input("add", &StubVocabulary),
            Ok(Resolution::Parameters("add n/NAME".to_string()))
        );
    }

    #[test]
    fn unchanged_completion_signals_ambiguity() {
        assert_eq!(
            resolve_input("a", &StubVocabulary),
            Ok(Resolution::Ambiguous(vec![
                "add".to_string(),
                "alias".to_string()
            ]))
        );
    }

    #[test]
    fn unknown_prefix_has_no_completion() {
        assert_eq!(
            resolve_input("zz", &StubVocabulary),
            Err(ResolveError::NoCompletionAvailable)
        );
    }

    #[test]
    fn non_command_extension_is_unactionable() {
        assert_eq!(
            resolve_input("he", &StubVocabulary),
            Ok(Resolution::Unactionable)
        );
    }

    // ── Controller tests ──────────────────────────────────────────────

    struct StubExecutor;

    impl CommandExecutor for StubExecutor {
        fn execute(&mut self, command: &str) -> Result<CommandOutcome, CommandRejected> {
            match command {
                "list" => Ok(CommandOutcome {
                    feedback: "Listed all.".to_string(),
                }),
                "add n/NAME" => Ok(CommandOutcome {
                    feedback: "Added.".to_string(),
                }),
                _ => Err(CommandRejected::new("Unknown command")),
            }
        }
    }

    fn console() -> Console<StubVocabulary, StubExecutor> {
        Console::new(StubVocabulary, StubExecutor, DEFAULT_HISTORY_LIMIT)
    }

    fn push_into(buf: &mut Vec<String>) -> impl FnMut(&str) + '_ {
        move |text| buf.push(text.to_string())
    }

    #[test]
    fn accepted_submission_clears_input_and_emits_feedback() {
        let mut console = console();
        console.on_text_edited("list");
        let mut feedback = Vec::new();
        assert_eq!(
            console.on_submit(&mut push_into(&mut feedback)),
            SubmitStatus::Accepted
        );
        assert_eq!(console.input(), "");
        assert_eq!(console.visual_state(), VisualState::Normal);
        assert_eq!(feedback, vec!["Listed all.".to_string()]);
        // The submission is reachable via Up.
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "list");
    }

    #[test]
    fn rejected_submission_keeps_input_and_sets_error() {
        let mut console = console();
        console.on_text_edited("frobnicate");
        let mut feedback = Vec::new();
        assert_eq!(
            console.on_submit(&mut push_into(&mut feedback)),
            SubmitStatus::Rejected
        );
        assert_eq!(console.input(), "frobnicate");
        assert_eq!(console.visual_state(), VisualState::Error);
        assert_eq!(feedback, vec!["Unknown command".to_string()]);
        // The failed attempt is still recorded.
        console.on_text_edited("");
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "frobnicate");
    }

    #[test]
    fn external_submission_clears_the_visible_field_on_success() {
        let mut console = console();
        console.on_text_edited("half-typed");
        let mut feedback = Vec::new();
        assert_eq!(
            console.on_submit_text("list", &mut push_into(&mut feedback)),
            SubmitStatus::Accepted
        );
        assert_eq!(console.input(), "");
        assert_eq!(feedback, vec!["Listed all.".to_string()]);
    }

    #[test]
    fn external_rejection_preserves_the_visible_field() {
        let mut console = console();
        console.on_text_edited("half-typed");
        let mut feedback = Vec::new();
        assert_eq!(
            console.on_submit_text("frobnicate", &mut push_into(&mut feedback)),
            SubmitStatus::Rejected
        );
        assert_eq!(console.input(), "half-typed");
        assert_eq!(console.visual_state(), VisualState::Error);
    }

    #[test]
    fn history_navigation_walks_submissions() {
        let mut console = console();
        console.on_text_edited("list");
        console.on_submit(&mut |_: &str| {});
        console.on_text_edited("frobnicate");
        console.on_submit(&mut |_: &str| {});
        console.on_text_edited("");

        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "frobnicate");
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "list");
        // Past the oldest entry Up is a no-op.
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::None);
        assert_eq!(console.input(), "list");
        assert_eq!(console.on_key(InputKey::Down), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "frobnicate");
        // Down past the newest entry lands on the empty sentinel.
        assert_eq!(console.on_key(InputKey::Down), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "");
        assert_eq!(console.on_key(InputKey::Down), KeyReaction::None);
    }

    #[test]
    fn autocomplete_replaces_input_with_command() {
        let mut console = console();
        console.on_text_edited("ad");
        assert_eq!(
            console.on_key(InputKey::Autocomplete),
            KeyReaction::InputReplaced
        );
        assert_eq!(console.input(), "add");
    }

    #[test]
    fn autocomplete_appends_parameter_template() {
        let mut console = console();
        console.on_text_edited("add");
        assert_eq!(
            console.on_key(InputKey::Autocomplete),
            KeyReaction::InputReplaced
        );
        assert_eq!(console.input(), "add n/NAME");
    }

    #[test]
    fn ambiguous_autocomplete_opens_menu_and_flags_error() {
        let mut console = console();
        console.on_text_edited("a");
        assert_eq!(
            console.on_key(InputKey::Autocomplete),
            KeyReaction::MenuOpened
        );
        assert_eq!(console.visual_state(), VisualState::Error);
        assert_eq!(
            console.menu_options(),
            Some(&["add".to_string(), "alias".to_string()][..])
        );
    }

    #[test]
    fn failed_autocomplete_sets_error_without_menu() {
        let mut console = console();
        console.on_text_edited("zz");
        assert_eq!(
            console.on_key(InputKey::Autocomplete),
            KeyReaction::CompletionFailed
        );
        assert_eq!(console.visual_state(), VisualState::Error);
        assert!(console.menu_options().is_none());
        assert_eq!(console.input(), "zz");
    }

    #[test]
    fn unactionable_autocomplete_leaves_session_untouched() {
        let mut console = console();
        console.on_text_edited("he");
        assert_eq!(console.on_key(InputKey::Autocomplete), KeyReaction::None);
        assert_eq!(console.input(), "he");
        assert_eq!(console.visual_state(), VisualState::Normal);
    }

    #[test]
    fn selecting_an_option_replaces_input_and_dismisses_menu() {
        let mut console = console();
        console.on_text_edited("a");
        console.on_key(InputKey::Autocomplete);
        console.on_option_selected("alias");
        assert_eq!(console.input(), "alias");
        assert!(console.menu_options().is_none());
    }

    #[test]
    fn any_other_key_closes_an_open_menu() {
        let mut console = console();
        console.on_text_edited("a");
        console.on_key(InputKey::Autocomplete);
        assert_eq!(console.on_key(InputKey::Other), KeyReaction::MenuClosed);
        assert!(console.menu_options().is_none());
        // Without a menu, other keys pass through untouched.
        assert_eq!(console.on_key(InputKey::Other), KeyReaction::None);
    }

    #[test]
    fn user_edit_resets_error_style() {
        let mut console = console();
        console.on_text_edited("zz");
        console.on_key(InputKey::Autocomplete);
        assert_eq!(console.visual_state(), VisualState::Error);
        console.on_text_edited("zza");
        assert_eq!(console.visual_state(), VisualState::Normal);
    }

    #[test]
    fn controller_replacement_keeps_error_style() {
        let mut console = console();
        console.on_text_edited("frobnicate");
        console.on_submit(&mut |_: &str| {});
        assert_eq!(console.visual_state(), VisualState::Error);
        // History replacement is controller-driven; the style stays.
        console.on_key(InputKey::Up);
        assert_eq!(console.visual_state(), VisualState::Error);
    }

    #[test]
    fn navigation_survives_across_one_snapshot_until_next_submission() {
        let mut console = console();
        console.on_text_edited("list");
        console.on_submit(&mut |_: &str| {});
        console.on_key(InputKey::Up);
        assert_eq!(console.input(), "list");
        // A new submission rebuilds the cursor over the grown log.
        console.on_text_edited("add n/NAME");
        console.on_submit(&mut |_: &str| {});
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "add n/NAME");
        assert_eq!(console.on_key(InputKey::Up), KeyReaction::InputReplaced);
        assert_eq!(console.input(), "list");
    }

    // ── Event tests ───────────────────────────────────────────────────

    #[test]
    fn event_log_sequences_monotonically() {
        let mut events = EventLog::new();
        let first = events.envelope(EventKind::CommandSubmitted {
            source: "input".to_string(),
        });
        let second = events.envelope(EventKind::CommandSucceeded {
            feedback: "ok".to_string(),
        });
        assert_eq!(first.seq_no, 1);
        assert_eq!(second.seq_no, 2);
        assert_eq!(first.session_id, second.session_id);
    }

    #[test]
    fn event_kind_serializes_tagged() {
        let kind = EventKind::CompletionAmbiguous {
            prefix: "a".to_string(),
            option_count: 2,
        };
        let value = serde_json::to_value(&kind).expect("serialize");
        assert_eq!(value["type"], "CompletionAmbiguous");
        assert_eq!(value["payload"]["option_count"], 2);
    }

    // ── Config tests ──────────────────────────────────────────────────

    #[test]
    fn config_defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.history.max_entries, DEFAULT_HISTORY_LIMIT);
        assert_eq!(cfg.ui.prompt, "> ");
        assert!(!cfg.telemetry.enabled);
    }

    #[test]
    fn project_settings_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = AppConfig::project_settings_path(dir.path());
        fs::create_dir_all(settings.parent().expect("parent")).expect("mkdir");
        fs::write(
            &settings,
            r#"{"history": {"max_entries": 7}, "ui": {"prompt": "$ "}}"#,
        )
        .expect("write settings");

        let cfg = AppConfig::load(dir.path()).expect("load");
        assert_eq!(cfg.history.max_entries, 7);
        assert_eq!(cfg.ui.prompt, "$ ");
        // Untouched sections keep their defaults.
        assert_eq!(cfg.ui.transcript_limit, 400);
    }

    #[test]
    fn legacy_toml_sits_beneath_json_layers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = runtime_dir(dir.path());
        fs::create_dir_all(&runtime).expect("mkdir");
        fs::write(
            AppConfig::legacy_toml_path(dir.path()),
            "[history]\nmax_entries = 5\n\n[ui]\nprompt = \"% \"\n",
        )
        .expect("write legacy");
        fs::write(
            AppConfig::project_settings_path(dir.path()),
            r#"{"ui": {"prompt": ">> "}}"#,
        )
        .expect("write settings");

        let cfg = AppConfig::load(dir.path()).expect("load");
        assert_eq!(cfg.history.max_entries, 5);
        assert_eq!(cfg.ui.prompt, ">> ");
    }

    #[test]
    fn ensure_writes_default_settings_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _cfg = AppConfig::ensure(dir.path()).expect("ensure");
        assert!(AppConfig::project_settings_path(dir.path()).exists());
    }

    proptest! {
        #[test]
        fn merge_json_value_is_idempotent_for_flat_objects(
            base in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12),
            overlay in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12),
        ) {
            let mut base_value = json!(base);
            let overlay_value = json!(overlay);
            merge_json_value(&mut base_value, &overlay_value);
            let once = base_value.clone();
            merge_json_value(&mut base_value, &overlay_value);
            prop_assert_eq!(base_value, once);
        }
    }
}
