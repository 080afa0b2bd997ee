//! Print the built-in command vocabulary.

use anyhow::Result;
use serde_json::json;

use crate::catalog::COMMANDS;
use crate::output::print_json;

pub(crate) fn run_vocab(json_mode: bool) -> Result<()> {
    if json_mode {
        let rows: Vec<_> = COMMANDS
            .iter()
            .map(|entry| {
                json!({
                    "name": entry.name,
                    "template": entry.template,
                    "summary": entry.summary,
                })
            })
            .collect();
        return print_json(&rows);
    }
    let width = COMMANDS
        .iter()
        .map(|e| e.name.len() + e.template.len())
        .max()
        .unwrap_or(0);
    for entry in COMMANDS {
        let usage = format!("{}{}", entry.name, entry.template);
        println!("{usage:<width$}  {}", entry.summary);
    }
    Ok(())
}
