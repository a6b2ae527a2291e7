// UI layer: the token prompt, the loop that keeps asking until a token
// authenticates, and small output helpers (colored lines, tables, spinner).

use std::io;
use std::time::Duration;

use comfy_table::Table;
use crossterm::style::Stylize;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::api::CurrentUser;
use crate::credentials::CredentialManager;
use crate::error::{ApiError, FxfError};
use crate::interrupt;

/// Which prompt to show: the first one, or the one after a rejected token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

impl Attempt {
    pub fn message(self) -> &'static str {
        match self {
            Attempt::First => "What is your token?",
            Attempt::Retry => "Invalid token, please try again",
        }
    }
}

/// Source of candidate tokens.
pub trait TokenPrompt {
    fn ask(&mut self, attempt: Attempt) -> io::Result<String>;
}

/// Masked terminal prompt.
pub struct PasswordPrompt;

impl TokenPrompt for PasswordPrompt {
    fn ask(&mut self, attempt: Attempt) -> io::Result<String> {
        let message = match attempt {
            Attempt::First => attempt.message().cyan().to_string(),
            Attempt::Retry => attempt.message().red().bold().to_string(),
        };
        Password::new().with_prompt(message).interact()
    }
}

/// Prompts for tokens until one authenticates against `instance`.
///
/// Only a 403 or a non-authenticated identity leads to another prompt.
/// Any other HTTP status aborts with [`FxfError::UnexpectedServer`] and an
/// unusable address with [`FxfError::InvalidInstanceUrl`].
pub fn acquire_token(
    credentials: &CredentialManager,
    instance: &str,
    prompt: &mut dyn TokenPrompt,
) -> Result<(CurrentUser, String), FxfError> {
    let mut attempt = Attempt::First;
    loop {
        interrupt::check()?;
        let token = prompt.ask(attempt)?;
        attempt = Attempt::Retry;

        let progress = spinner("Checking token...");
        let outcome = check_token(credentials, instance, &token);
        progress.finish_and_clear();
        interrupt::check()?;

        if let Some(user) = outcome? {
            return Ok((user, token));
        }
    }
}

// `Ok(None)` means "ask again".
fn check_token(
    credentials: &CredentialManager,
    instance: &str,
    token: &str,
) -> Result<Option<CurrentUser>, FxfError> {
    let session = credentials.open_session(instance, Some(token))?;
    match session.me().current_user() {
        Ok(user) if user.is_authenticated() => Ok(Some(user)),
        Ok(user) => {
            debug!(instance, kind = %user.kind, "Token does not authenticate");
            Ok(None)
        }
        Err(ApiError::HttpStatus { status: 403, .. }) => {
            debug!(instance, "Token rejected");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Spinner on stderr; hidden when stderr is not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        progress.set_style(style);
    }
    progress.set_message(message.to_string());
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

pub fn success(message: &str) {
    println!("{}", message.green());
}

pub fn notice(message: &str) {
    println!("{}", message.cyan());
}

pub fn warning(message: &str) {
    println!("{}", message.yellow());
}

pub fn failure(message: &str) {
    println!("{}", message.red());
}

pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_header(headers.to_vec());
    table
}

pub fn print_table(table: &Table) {
    println!("{table}");
}
