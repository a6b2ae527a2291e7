// Library root
// -----------
// Everything the `fxf` binary does lives here so it can be tested without
// a terminal.
//
// Module responsibilities:
// - `secrets` / `profile`: where tokens and profiles are kept.
// - `credentials`: resolves tokens and registers instances for the active
//   profile.
// - `api`: reference-counted HTTP sessions and the typed endpoints.
// - `ui`: token prompt, the validation loop and output helpers.
// - `cli` / `commands`: argument definitions and command handlers.
pub mod api;
pub mod cli;
pub mod commands;
pub mod credentials;
pub mod error;
pub mod git;
pub mod interrupt;
pub mod profile;
pub mod secrets;
pub mod settings;
pub mod ui;

pub use credentials::CredentialManager;
pub use error::{ApiError, ConfigError, FxfError};
