// Error types shared by the library.
// - `ApiError`: everything that can go wrong talking to an instance.
// - `ConfigError`: reading or writing the profile document.
// - `FxfError`: the user-facing taxonomy the binary reports.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the HTTP layer (see `api`).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx answer. The body has already been read in full.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The instance URL cannot be used as an HTTP(S) address.
    #[error("unsupported protocol or malformed address: {url}")]
    UnsupportedProtocol { url: String },

    #[error("the token cannot be sent as an HTTP header")]
    InvalidToken,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status code when the server answered with an error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("unexpected content in {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Domain errors surfaced to the user.
#[derive(Debug, Error)]
pub enum FxfError {
    #[error("No token found for {instance} (profile: {profile})")]
    MissingCredential { instance: String, profile: String },

    #[error("Invalid URL: {instance}")]
    InvalidInstanceUrl { instance: String },

    #[error("Unexpected error: {detail}")]
    UnexpectedServer { detail: String },

    #[error("interrupted")]
    Interrupted,

    #[error("secret storage error: {0}")]
    SecretStore(#[from] keyring::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(ApiError),

    #[error("prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

impl From<ApiError> for FxfError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::HttpStatus { status, .. } => FxfError::UnexpectedServer {
                detail: format!("HTTP {status}"),
            },
            ApiError::UnsupportedProtocol { url } => FxfError::InvalidInstanceUrl { instance: url },
            ApiError::Transport(e) if e.is_timeout() => FxfError::UnexpectedServer {
                detail: format!("request timed out: {e}"),
            },
            other => FxfError::Api(other),
        }
    }
}
