//! The built-in command vocabulary: a prefix catalog over the roster
//! command set, with parameter templates for the parameterized commands.

use conch_core::CommandVocabulary;

pub(crate) struct CatalogEntry {
    pub name: &'static str,
    pub template: &'static str,
    pub summary: &'static str,
}

pub(crate) const COMMANDS: &[CatalogEntry] = &[
    CatalogEntry {
        name: "add",
        template: " n/NAME p/PHONE e/EMAIL a/ADDRESS",
        summary: "Add a contact to the roster",
    },
    CatalogEntry {
        name: "clear",
        template: "",
        summary: "Remove every contact",
    },
    CatalogEntry {
        name: "delete",
        template: " INDEX",
        summary: "Delete the contact at INDEX",
    },
    CatalogEntry {
        name: "edit",
        template: " INDEX n/NAME p/PHONE e/EMAIL a/ADDRESS",
        summary: "Edit fields of the contact at INDEX",
    },
    CatalogEntry {
        name: "exit",
        template: "",
        summary: "End the session",
    },
    CatalogEntry {
        name: "find",
        template: " KEYWORD",
        summary: "List contacts whose name matches KEYWORD",
    },
    CatalogEntry {
        name: "help",
        template: "",
        summary: "Show usage for every command",
    },
    CatalogEntry {
        name: "history",
        template: "",
        summary: "List entered commands, most recent first",
    },
    CatalogEntry {
        name: "list",
        template: "",
        summary: "List every contact",
    },
    CatalogEntry {
        name: "redo",
        template: "",
        summary: "Reapply the last undone change",
    },
    CatalogEntry {
        name: "select",
        template: " INDEX",
        summary: "Select the contact at INDEX",
    },
    CatalogEntry {
        name: "undo",
        template: "",
        summary: "Revert the last change",
    },
];

/// Prefix vocabulary over the static command table.
pub(crate) struct CommandCatalog;

impl CommandVocabulary for CommandCatalog {
    fn resolve(&self, prefix: &str) -> Option<String> {
        if let Some(entry) = COMMANDS.iter().find(|e| e.name == prefix) {
            // An exact command name completes to its parameter template.
            // Parameterless commands resolve to themselves, which reads as
            // an ambiguity with a single option.
            return Some(if entry.template.is_empty() {
                prefix.to_string()
            } else {
                entry.template.to_string()
            });
        }
        let matches: Vec<&str> = COMMANDS
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .map(|e| e.name)
            .collect();
        match matches.len() {
            0 => None,
            1 => Some(matches[0].to_string()),
            _ => {
                let common = longest_common_prefix(&matches);
                Some(if common.len() > prefix.len() {
                    common
                } else {
                    prefix.to_string()
                })
            }
        }
    }

    fn options_for(&self, prefix: &str) -> Vec<String> {
        COMMANDS
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .map(|e| e.name.to_string())
            .collect()
    }

    fn is_complete_command(&self, text: &str) -> bool {
        COMMANDS.iter().any(|e| e.name == text)
    }
}

fn longest_common_prefix(names: &[&str]) -> String {
    let Some((first, rest)) = names.split_first() else {
        return String::new();
    };
    let mut len = first.len();
    for name in rest {
        len = first
            .bytes()
            .zip(name.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    first[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_core::{Resolution, resolve_input};

    #[test]
    fn unique_prefix_completes_to_the_command() {
        assert_eq!(CommandCatalog.resolve("ad"), Some("add".to_string()));
        assert_eq!(CommandCatalog.resolve("un"), Some("undo".to_string()));
    }

    #[test]
    fn exact_command_resolves_to_its_template() {
        assert_eq!(
            CommandCatalog.resolve("add"),
            Some(" n/NAME p/PHONE e/EMAIL a/ADDRESS".to_string())
        );
        assert_eq!(CommandCatalog.resolve("delete"), Some(" INDEX".to_string()));
    }

    #[test]
    fn shared_prefix_resolves_to_itself() {
        assert_eq!(CommandCatalog.resolve("e"), Some("e".to_string()));
        assert_eq!(CommandCatalog.resolve("h"), Some("h".to_string()));
        assert_eq!(
            CommandCatalog.options_for("e"),
            vec!["edit".to_string(), "exit".to_string()]
        );
    }

    #[test]
    fn unknown_prefix_resolves_to_nothing() {
        assert_eq!(CommandCatalog.resolve("frob"), None);
        assert!(CommandCatalog.options_for("frob").is_empty());
    }

    #[test]
    fn empty_prefix_offers_the_whole_table() {
        assert_eq!(CommandCatalog.resolve(""), Some(String::new()));
        assert_eq!(CommandCatalog.options_for("").len(), COMMANDS.len());
    }

    #[test]
    fn membership_checks_exact_names_only() {
        assert!(CommandCatalog.is_complete_command("list"));
        assert!(!CommandCatalog.is_complete_command("lis"));
        assert!(!CommandCatalog.is_complete_command("list "));
    }

    // End-to-end through the resolver, with the catalog as vocabulary.

    #[test]
    fn resolver_completes_and_parameterizes_against_the_catalog() {
        assert_eq!(
            resolve_input("ad", &CommandCatalog),
            Ok(Resolution::Command("add".to_string()))
        );
        assert_eq!(
            resolve_input("add", &CommandCatalog),
            Ok(Resolution::Parameters(
                "add n/NAME p/PHONE e/EMAIL a/ADDRESS".to_string()
            ))
        );
        assert_eq!(
            resolve_input("e", &CommandCatalog),
            Ok(Resolution::Ambiguous(vec![
                "edit".to_string(),
                "exit".to_string()
            ]))
        );
    }
}
