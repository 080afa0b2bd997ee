//! The interactive console session.

use anyhow::Result;
use conch_core::{AppConfig, Console};
use conch_observe::Observer;
use std::path::Path;

use crate::catalog::CommandCatalog;
use crate::roster::Roster;

pub(crate) fn run_console_session(cwd: &Path, verbose: bool) -> Result<()> {
    let config = AppConfig::ensure(cwd)?;
    let mut observer = Observer::new(cwd, &config.telemetry)?;
    observer.set_verbose(verbose);
    observer.verbose_log(&format!("session log at {}", observer.log_path().display()));

    let mut console = Console::new(CommandCatalog, Roster::new(), config.history.max_entries);
    conch_ui::run_console(&mut console, &observer, &config)
}
