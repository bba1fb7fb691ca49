//! Settings loading, validation and env substitution.
//!
//! Config files: `chatrelay.toml`, `chatrelay.yaml`, `chatrelay.yml` or
//! `chatrelay.json`, searched in `./` then the user config directory
//! (`~/.config/chatrelay/` on Linux).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all
//! string values. Platform sections are kept as raw JSON; each adapter crate
//! owns the typed shape of its own section.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config_str},
    schema::{RuntimeConfig, ServerConfig, Settings},
    validate::{Diagnostic, Severity, ValidationResult},
};
