// Runtime settings, resolved once in `main` and passed down explicitly.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_TIMEOUT;
use crate::profile::DEFAULT_PROFILE;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "FXF_CONFIG_FILE";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Profile every operation is scoped to.
    pub profile: String,
    pub config_path: PathBuf,
    pub timeout: Duration,
}

impl Settings {
    pub fn new(profile: Option<String>, config_path: Option<PathBuf>, timeout: Option<u64>) -> Self {
        Settings {
            profile: profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            config_path: config_path.unwrap_or_else(default_config_path),
            timeout: timeout.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// `<user config dir>/fxf/config.toml`, or `./fxf/config.toml` when the
/// platform has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fxf")
        .join("config.toml")
}
