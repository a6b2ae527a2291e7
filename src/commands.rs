// Command handlers. `run` builds the credential manager from the parsed
// arguments and dispatches; each handler prints its own results.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use comfy_table::{Cell, Color};
use tracing::{debug, warn};

use crate::api::{GeneratedFile, GhaOutcome};
use crate::cli::{AuthCommands, Cli, Commands, ProjectCommands};
use crate::credentials::CredentialManager;
use crate::error::{ApiError, FxfError};
use crate::git::Repository;
use crate::interrupt;
use crate::profile::ConnectedProject;
use crate::secrets::KeyringStore;
use crate::settings::Settings;
use crate::ui::{self, PasswordPrompt, TokenPrompt};

pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::new(Some(cli.profile), cli.config, cli.timeout);
    debug!(
        profile = %settings.profile,
        config = %settings.config_path.display(),
        "Resolved settings"
    );
    let credentials = CredentialManager::new(&settings, Box::new(KeyringStore::new()));

    match cli.command {
        Commands::Auth { command } => match command {
            AuthCommands::Login { instance_url } => {
                login(&credentials, &instance_url, &mut PasswordPrompt)
            }
            AuthCommands::Test => test_tokens(&credentials),
        },
        Commands::Project { command } => match command {
            ProjectCommands::Connect(args) => connect(&credentials, &args.directory),
            ProjectCommands::Gha(args) => gha(&credentials, &args.directory),
        },
    }
}

/// `fxf auth login`: validate a token interactively, then store it.
pub fn login(
    credentials: &CredentialManager,
    instance: &str,
    prompt: &mut dyn TokenPrompt,
) -> Result<()> {
    let (user, token) = ui::acquire_token(credentials, instance, prompt)?;
    ui::success(&format!("Welcome {}", user.display_name()));
    interrupt::check()?;
    credentials.save_credential(instance, &token)?;
    Ok(())
}

/// Health of one registered instance, as shown by `fxf auth test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainStatus {
    Ok,
    NotAuthenticated,
    InvalidToken,
    Http(u16),
    NoToken,
    InvalidUrl,
    Unreachable,
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainStatus::Ok => f.write_str("OK"),
            DomainStatus::NotAuthenticated => f.write_str("Not Authenticated"),
            DomainStatus::InvalidToken => f.write_str("Invalid Token"),
            DomainStatus::Http(status) => write!(f, "HTTP {status}"),
            DomainStatus::NoToken => f.write_str("No Token"),
            DomainStatus::InvalidUrl => f.write_str("Invalid URL"),
            DomainStatus::Unreachable => f.write_str("Unreachable"),
        }
    }
}

/// Checks the stored token of `domain` against its `me/` endpoint.
pub fn probe_domain(credentials: &CredentialManager, domain: &str) -> Result<DomainStatus, FxfError> {
    let session = match credentials.open_session(domain, None) {
        Ok(session) => session,
        Err(FxfError::MissingCredential { .. }) => return Ok(DomainStatus::NoToken),
        Err(FxfError::Api(ApiError::InvalidToken)) => return Ok(DomainStatus::InvalidToken),
        Err(e) => return Err(e),
    };

    let answer = session.me().current_user();
    interrupt::check()?;
    let status = match answer {
        Ok(user) if user.is_authenticated() => DomainStatus::Ok,
        Ok(_) => DomainStatus::NotAuthenticated,
        Err(ApiError::HttpStatus { status: 403, .. }) => DomainStatus::InvalidToken,
        Err(ApiError::HttpStatus { status, .. }) => DomainStatus::Http(status),
        Err(ApiError::UnsupportedProtocol { .. }) => DomainStatus::InvalidUrl,
        Err(e) => {
            warn!(domain, error = %e, "Instance unreachable");
            DomainStatus::Unreachable
        }
    };
    Ok(status)
}

/// `fxf auth test`
pub fn test_tokens(credentials: &CredentialManager) -> Result<()> {
    let domains = credentials.list_domains()?;
    if domains.is_empty() {
        ui::failure("No domains found");
        ui::notice("Run `fxf auth login` to login to an instance");
        return Ok(());
    }

    let mut table = ui::table(&["Instance URL", "Status"]);
    for domain in domains {
        interrupt::check()?;
        let status = probe_domain(credentials, &domain)?;
        let color = if status == DomainStatus::Ok {
            Color::Green
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new(&domain).fg(Color::Cyan),
            Cell::new(status).fg(color),
        ]);
    }
    ui::print_table(&table);
    Ok(())
}

/// `fxf project connect`
pub fn connect(credentials: &CredentialManager, directory: &Path) -> Result<()> {
    if !credentials.has_credentials()? {
        bail!("No credentials found, please use 'fxf auth login' first");
    }

    let (origin, _) = find_origin(directory)?;
    ui::success(&format!("Found Git origin: {origin}"));

    if connect_origin(credentials, &origin)?.is_empty() {
        bail!("None of your Flux Capacitor instances have this project, please create it first");
    }
    Ok(())
}

/// Asks every registered instance for the project behind `origin` and
/// records each match in the profile.
pub fn connect_origin(
    credentials: &CredentialManager,
    origin: &str,
) -> Result<Vec<ConnectedProject>, FxfError> {
    let mut connected = Vec::new();

    for domain in credentials.list_domains()? {
        interrupt::check()?;
        let session = credentials.open_session(&domain, None)?;
        let resolved = session.project().resolve(origin)?;
        interrupt::check()?;
        let Some(project) = resolved.project else {
            debug!(domain = %domain, origin, "Project unknown to instance");
            continue;
        };

        ui::success(&format!("Found project: {} on {domain}", project.name));
        let entry = ConnectedProject {
            domain: domain.clone(),
            id: project.id,
            name: project.name,
        };
        interrupt::check()?;
        credentials.save_project(origin, &entry)?;
        ui::success("Connected!");
        connected.push(entry);
    }

    Ok(connected)
}

/// `fxf project gha`
pub fn gha(credentials: &CredentialManager, directory: &Path) -> Result<()> {
    let (origin, repo) = find_origin(directory)?;

    let project = match credentials.project(&origin)? {
        Some(project) => project,
        None => {
            ui::warning("This project is not connected. Attempting to connect.");
            connect(credentials, directory)?;
            credentials
                .project(&origin)?
                .ok_or_else(|| anyhow!("{origin} is still not connected"))?
        }
    };

    let fluxfile_path = repo.root().join("Fluxfile");
    if !fluxfile_path.exists() {
        bail!("This project has no Fluxfile. Please write it before proceeding.");
    }
    let fluxfile = fs::read_to_string(&fluxfile_path)
        .with_context(|| format!("Failed to read {}", fluxfile_path.display()))?;

    let session = credentials.open_session(&project.domain, None)?;
    let outcome = session.project().gha(&project.id, &fluxfile);
    interrupt::check()?;
    match outcome {
        Ok(GhaOutcome::Generated(files)) => {
            for path in write_generated(repo.root(), &files)? {
                ui::success(&format!("Generated {}", path.display()));
            }
        }
        Ok(GhaOutcome::Rejected(issues)) => {
            let mut table = ui::table(&["Path", "Error"]);
            for issue in &issues {
                table.add_row(vec![
                    Cell::new(issue.dotted_path()).fg(Color::Cyan),
                    Cell::new(&issue.message),
                ]);
            }
            ui::failure("Invalid Fluxfile");
            ui::print_table(&table);
        }
        Err(ApiError::HttpStatus { status: 400, .. }) => bail!("Unknown error from API"),
        Err(ApiError::HttpStatus { status, .. }) => bail!("API error: HTTP {status}"),
        Err(e) => return Err(FxfError::from(e).into()),
    }
    Ok(())
}

/// Writes generated files below `root`, refusing names that would land
/// outside of it. Returns the relative names written.
pub fn write_generated(root: &Path, files: &[GeneratedFile]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let relative = PathBuf::from(&file.name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            bail!("Refusing to write {} outside of the repository", file.name);
        }

        let path = root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(relative);
    }
    Ok(written)
}

fn find_origin(directory: &Path) -> Result<(String, Repository)> {
    if !directory.is_dir() {
        bail!("{} is not a directory", directory.display());
    }
    let repo = Repository::discover(directory)
        .ok_or_else(|| anyhow!("This directory is not a valid Git repository"))?;
    let origin = repo
        .origin()
        .ok_or_else(|| anyhow!("This repository has no origin"))?;
    Ok((origin, repo))
}
