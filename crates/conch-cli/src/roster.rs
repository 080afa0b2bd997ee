//! Demo executor: an in-memory contact roster driven by the catalog
//! command set.

use conch_core::{CommandExecutor, CommandOutcome, CommandRejected};

use crate::catalog::COMMANDS;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Contact {
    name: String,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
}

impl Contact {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(phone) = &self.phone {
            parts.push(format!("p: {phone}"));
        }
        if let Some(email) = &self.email {
            parts.push(format!("e: {email}"));
        }
        if let Some(address) = &self.address {
            parts.push(format!("a: {address}"));
        }
        if parts.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, parts.join(", "))
        }
    }
}

#[derive(Default)]
struct Fields {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
}

pub(crate) struct Roster {
    contacts: Vec<Contact>,
    selected: Option<usize>,
    submissions: Vec<String>,
    undo_stack: Vec<Vec<Contact>>,
    redo_stack: Vec<Vec<Contact>>,
    exit_requested: bool,
}

type ExecResult = Result<CommandOutcome, CommandRejected>;

fn outcome(feedback: impl Into<String>) -> ExecResult {
    Ok(CommandOutcome {
        feedback: feedback.into(),
    })
}

fn rejected(message: impl Into<String>) -> ExecResult {
    Err(CommandRejected::new(message))
}

impl Roster {
    pub(crate) fn new() -> Self {
        Self {
            contacts: Vec::new(),
            selected: None,
            submissions: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            exit_requested: false,
        }
    }

    fn checkpoint(&mut self) {
        self.undo_stack.push(self.contacts.clone());
        self.redo_stack.clear();
    }

    fn add(&mut self, rest: &str) -> ExecResult {
        let fields = parse_fields(rest);
        let Some(name) = fields.name else {
            return rejected("Invalid command format: add n/NAME p/PHONE e/EMAIL a/ADDRESS");
        };
        self.checkpoint();
        self.contacts.push(Contact {
            name: name.clone(),
            phone: fields.phone,
            email: fields.email,
            address: fields.address,
        });
        outcome(format!("New contact added: {name}"))
    }

    fn delete(&mut self, rest: &str) -> ExecResult {
        let index = parse_index(rest, "delete INDEX")?;
        if index >= self.contacts.len() {
            return rejected(format!("No contact at index {}", index + 1));
        }
        self.checkpoint();
        let removed = self.contacts.remove(index);
        self.selected = None;
        outcome(format!("Deleted contact: {}", removed.name))
    }

    fn edit(&mut self, rest: &str) -> ExecResult {
        let (index_token, fields_rest) = match rest.split_once(' ') {
            Some((first, tail)) => (first, tail),
            None => (rest, ""),
        };
        let index = parse_index(index_token, "edit INDEX n/NAME p/PHONE e/EMAIL a/ADDRESS")?;
        if index >= self.contacts.len() {
            return rejected(format!("No contact at index {}", index + 1));
        }
        let fields = parse_fields(fields_rest);
        if fields.name.is_none()
            && fields.phone.is_none()
            && fields.email.is_none()
            && fields.address.is_none()
        {
            return rejected("Invalid command format: edit INDEX n/NAME p/PHONE e/EMAIL a/ADDRESS");
        }
        self.checkpoint();
        let contact = &mut self.contacts[index];
        if let Some(name) = fields.name {
            contact.name = name;
        }
        if fields.phone.is_some() {
            contact.phone = fields.phone;
        }
        if fields.email.is_some() {
            contact.email = fields.email;
        }
        if fields.address.is_some() {
            contact.address = fields.address;
        }
        outcome(format!("Edited contact: {}", self.contacts[index].name))
    }

    fn find(&self, rest: &str) -> ExecResult {
        let keyword = rest.trim().to_lowercase();
        if keyword.is_empty() {
            return rejected("Invalid command format: find KEYWORD");
        }
        let matches: Vec<&Contact> = self
            .contacts
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&keyword))
            .collect();
        let mut lines: Vec<String> = matches
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c.describe()))
            .collect();
        lines.push(format!("{} contacts found.", matches.len()));
        outcome(lines.join("\n"))
    }

    fn list(&self) -> ExecResult {
        let mut lines: Vec<String> = self
            .contacts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c.describe()))
            .collect();
        lines.push("Listed all.".to_string());
        outcome(lines.join("\n"))
    }

    fn select(&mut self, rest: &str) -> ExecResult {
        let index = parse_index(rest, "select INDEX")?;
        if index >= self.contacts.len() {
            return rejected(format!("No contact at index {}", index + 1));
        }
        self.selected = Some(index);
        outcome(format!("Selected contact: {}", self.contacts[index].name))
    }

    fn clear(&mut self) -> ExecResult {
        self.checkpoint();
        self.contacts.clear();
        self.selected = None;
        outcome("Roster cleared.")
    }

    fn history(&self) -> ExecResult {
        // The current `history` submission is already recorded; skip it.
        let previous = &self.submissions[..self.submissions.len().saturating_sub(1)];
        if previous.is_empty() {
            return outcome("No commands entered yet.");
        }
        let mut lines = vec!["Entered commands (most recent first):".to_string()];
        lines.extend(previous.iter().rev().cloned());
        outcome(lines.join("\n"))
    }

    fn undo(&mut self) -> ExecResult {
        let Some(snapshot) = self.undo_stack.pop() else {
            return rejected("No changes to undo.");
        };
        self.redo_stack.push(std::mem::replace(&mut self.contacts, snapshot));
        self.selected = None;
        outcome("Undid last change.")
    }

    fn redo(&mut self) -> ExecResult {
        let Some(snapshot) = self.redo_stack.pop() else {
            return rejected("No changes to redo.");
        };
        self.undo_stack.push(std::mem::replace(&mut self.contacts, snapshot));
        self.selected = None;
        outcome("Redid last change.")
    }

    #[cfg(test)]
    fn selected_name(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.contacts.get(i))
            .map(|c| c.name.as_str())
    }
}

impl CommandExecutor for Roster {
    fn execute(&mut self, command: &str) -> ExecResult {
        self.submissions.push(command.to_string());
        let trimmed = command.trim();
        let (name, rest) = match trimmed.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (trimmed, ""),
        };
        match name {
            "add" => self.add(rest),
            "clear" => self.clear(),
            "delete" => self.delete(rest),
            "edit" => self.edit(rest),
            "exit" => {
                self.exit_requested = true;
                outcome("Exiting console.")
            }
            "find" => self.find(rest),
            "help" => outcome(help_text()),
            "history" => self.history(),
            "list" => self.list(),
            "redo" => self.redo(),
            "select" => self.select(rest),
            "undo" => self.undo(),
            other => rejected(unknown_command(other)),
        }
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

fn help_text() -> String {
    let mut lines = vec!["Available commands:".to_string()];
    for entry in COMMANDS {
        lines.push(format!("  {}{} - {}", entry.name, entry.template, entry.summary));
    }
    lines.join("\n")
}

fn unknown_command(name: &str) -> String {
    let hint = COMMANDS
        .iter()
        .map(|e| (e.name, strsim::levenshtein(name, e.name)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(close, _)| close);
    match hint {
        Some(close) => format!("Unknown command. Did you mean `{close}`?"),
        None => "Unknown command".to_string(),
    }
}

fn parse_index(token: &str, usage: &str) -> Result<usize, CommandRejected> {
    let token = token.trim();
    match token.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(CommandRejected::new(format!(
            "Invalid command format: {usage}"
        ))),
    }
}

/// Parse `n/`, `p/`, `e/`, `a/` prefixed fields; unprefixed tokens extend
/// the field that precedes them (names and addresses contain spaces).
fn parse_fields(rest: &str) -> Fields {
    let mut fields = Fields::default();
    let mut current: Option<char> = None;
    for token in rest.split_whitespace() {
        match token.split_once('/') {
            Some((key @ ("n" | "p" | "e" | "a"), value)) => {
                let key = key.as_bytes()[0] as char;
                *field_slot(&mut fields, key) = Some(value.to_string());
                current = Some(key);
            }
            _ => {
                if let Some(key) = current
                    && let Some(existing) = field_slot(&mut fields, key)
                {
                    existing.push(' ');
                    existing.push_str(token);
                }
            }
        }
    }
    fields
}

fn field_slot(fields: &mut Fields, key: char) -> &mut Option<String> {
    match key {
        'n' => &mut fields.name,
        'p' => &mut fields.phone,
        'e' => &mut fields.email,
        _ => &mut fields.address,
    }
}
