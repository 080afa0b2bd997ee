//! One-shot command execution, bypassing the interactive input field.

use anyhow::Result;
use conch_core::{AppConfig, Console, EventKind, EventLog, SubmitStatus};
use conch_observe::Observer;
use serde_json::json;
use std::path::Path;

use crate::ExecArgs;
use crate::catalog::CommandCatalog;
use crate::output::print_json;
use crate::roster::Roster;

pub(crate) fn run_exec(cwd: &Path, args: ExecArgs, verbose: bool, json_mode: bool) -> Result<()> {
    let config = AppConfig::load(cwd).unwrap_or_default();
    let mut observer = Observer::new(cwd, &config.telemetry)?;
    observer.set_verbose(verbose);
    let mut events = EventLog::new();

    let command = args.command.join(" ");
    let mut console = Console::new(CommandCatalog, Roster::new(), config.history.max_entries);
    observer.record_event(&events.envelope(EventKind::CommandSubmitted {
        source: "exec".to_string(),
    }))?;

    let mut feedback: Vec<String> = Vec::new();
    let status = console.on_submit_text(&command, &mut |text: &str| {
        feedback.push(text.to_string());
    });
    let text = feedback.join("\n");
    match status {
        SubmitStatus::Accepted => {
            observer.record_event(&events.envelope(EventKind::CommandSucceeded {
                feedback: text.clone(),
            }))?;
            if json_mode {
                print_json(&json!({"command": command, "accepted": true, "feedback": text}))?;
            } else {
                println!("{text}");
            }
            Ok(())
        }
        SubmitStatus::Rejected => {
            observer.record_event(&events.envelope(EventKind::CommandRejected {
                message: text.clone(),
            }))?;
            if json_mode {
                // Machine mode encodes the status in the payload instead of
                // the exit code.
                print_json(&json!({"command": command, "accepted": false, "feedback": text}))?;
                return Ok(());
            }
            anyhow::bail!("{text}")
        }
        SubmitStatus::Ignored => anyhow::bail!("console is busy"),
    }
}
