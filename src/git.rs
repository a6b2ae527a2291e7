// Git helpers: locate the repository around a directory and read its
// origin remote by shelling out to `git`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Finds the repository containing `directory`, if any.
    pub fn discover(directory: &Path) -> Option<Self> {
        let root = git(directory, &["rev-parse", "--show-toplevel"])?;
        Some(Repository {
            root: PathBuf::from(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL of the `origin` remote.
    pub fn origin(&self) -> Option<String> {
        git(&self.root, &["config", "--get", "remote.origin.url"])
    }
}

fn git(directory: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(directory)
        .stderr(Stdio::null())
        .output()
        .map_err(|e| debug!(error = %e, "Could not run git"))
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8(output.stdout).ok()?;
    let value = stdout.trim_end_matches(['\r', '\n']);
    (!value.is_empty()).then(|| value.to_string())
}
