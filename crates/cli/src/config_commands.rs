use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use chatrelay_config::{Severity, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the config file that would be loaded.
    Path,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(chatrelay_config::find_config_file);
    match action {
        ConfigAction::Check { verbose } => check(path, verbose),
        ConfigAction::Path => {
            match path {
                Some(path) => println!("{}", path.display()),
                None => {
                    let dir = chatrelay_config::config_dir()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "<unknown>".into());
                    eprintln!("No config file found in ./ or {dir}");
                },
            }
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let Some(path) = path else {
        eprintln!("No config file found; defaults will be used.");
        return Ok(());
    };
    eprintln!("Checking {}\n", path.display());
    let result = validate::validate_file(&path);

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if result.has_errors() {
        anyhow::bail!("config check failed");
    }
    Ok(())
}
