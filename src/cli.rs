use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::profile::DEFAULT_PROFILE;
use crate::settings::CONFIG_FILE_ENV;

/// The local counterpart of Flux Capacitor that will help you manage
/// projects on your local machine.
#[derive(Parser, Debug)]
#[command(name = "fxf", version)]
pub struct Cli {
    /// Scope all operations to this profile
    #[arg(short, long, global = true, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Configuration file (defaults to <config dir>/fxf/config.toml)
    #[arg(long, global = true, env = CONFIG_FILE_ENV)]
    pub config: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, global = true, env = "FXF_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage authentication and Flux Capacitor instances.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Manage projects and local code repositories.
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Login to a Flux Capacitor instance, based on the provided instance url.
    Login {
        /// Base URL of the instance to login to.
        #[arg(short = 'u', long)]
        instance_url: String,
    },

    /// Tests all registered authentication tokens.
    Test,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Associates a Git repo to a connected instance.
    Connect(DirectoryArgs),

    /// Generates the GitHub Action files for this project.
    Gha(DirectoryArgs),
}

#[derive(Args, Debug)]
pub struct DirectoryArgs {
    /// Directory where the project is.
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "fxf", "auth", "login", "-u", "https://flux.example.org", "-p", "work",
        ])
        .unwrap();

        assert_eq!(cli.profile, "work");
        assert!(matches!(
            cli.command,
            Commands::Auth {
                command: AuthCommands::Login { ref instance_url }
            } if instance_url == "https://flux.example.org"
        ));
    }

    #[test]
    fn login_requires_instance_url() {
        assert!(Cli::try_parse_from(["fxf", "auth", "login"]).is_err());
    }

    #[test]
    fn project_directory_defaults_to_cwd() {
        let cli = Cli::try_parse_from(["fxf", "project", "gha"]).unwrap();
        let Commands::Project {
            command: ProjectCommands::Gha(args),
        } = cli.command
        else {
            panic!("expected project gha");
        };
        assert_eq!(args.directory, PathBuf::from("."));
        assert_eq!(cli.profile, DEFAULT_PROFILE);
    }
}
