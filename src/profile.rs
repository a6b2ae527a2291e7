// Profile store.
// - Profiles live in one TOML document (by default `~/.config/fxf/config.toml`):
//
//     [profiles.default]
//     domains = ["https://flux.example.org"]
//
//     [profiles.default.projects."git@github.com:acme/app.git"]
//     domain = "https://flux.example.org"
//     id = 42
//     name = "app"
//
// - Edits go through `toml_edit`, so comments and layout the user wrote
//   survive. The file is only rewritten when an edit changed something,
//   and then atomically through a sibling temp file.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use toml_edit::{value, Array, DocumentMut, Item, Table};
use tracing::debug;

use crate::api::ProjectId;
use crate::error::ConfigError;

pub const DEFAULT_PROFILE: &str = "default";

/// A git origin associated with a project on one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedProject {
    pub domain: String,
    pub id: ProjectId,
    pub name: String,
}

/// Read-only snapshot of one profile. Empty when the profile is absent.
#[derive(Debug, Clone, Default)]
pub struct ProfileView {
    domains: Vec<String>,
    projects: HashMap<String, ConnectedProject>,
}

impl ProfileView {
    fn from_item(profile: &Item) -> Self {
        let domains = profile
            .get("domains")
            .and_then(Item::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let projects = profile
            .get("projects")
            .and_then(Item::as_table_like)
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(origin, entry)| {
                        Some((origin.to_string(), connected_project(entry)?))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ProfileView { domains, projects }
    }

    /// Instance URLs in registration order.
    pub fn domains(&self) -> Vec<String> {
        self.domains.clone()
    }

    pub fn project(&self, origin: &str) -> Option<ConnectedProject> {
        self.projects.get(origin).cloned()
    }
}

/// Mutable access to one profile inside an [`ProfileStore::edit_profile`] scope.
pub struct ProfileEditor<'a> {
    table: &'a mut Table,
    path: &'a Path,
}

impl ProfileEditor<'_> {
    /// Appends `instance` to `domains` unless already listed.
    /// Returns whether the list changed.
    pub fn add_domain(&mut self, instance: &str) -> Result<bool, ConfigError> {
        let path = self.path;
        let domains = self
            .table
            .entry("domains")
            .or_insert(value(Array::new()))
            .as_array_mut()
            .ok_or_else(|| malformed(path, "`domains` is not an array"))?;

        if domains.iter().any(|d| d.as_str() == Some(instance)) {
            return Ok(false);
        }
        domains.push(instance);
        Ok(true)
    }

    pub fn set_project(
        &mut self,
        origin: &str,
        project: &ConnectedProject,
    ) -> Result<(), ConfigError> {
        let path = self.path;
        let projects = self
            .table
            .entry("projects")
            .or_insert(implicit_table())
            .as_table_mut()
            .ok_or_else(|| malformed(path, "`projects` is not a table"))?;

        let mut entry = Table::new();
        entry.insert("domain", value(project.domain.as_str()));
        entry.insert(
            "id",
            match &project.id {
                ProjectId::Int(id) => value(*id),
                ProjectId::Str(id) => value(id.as_str()),
            },
        );
        entry.insert("name", value(project.name.as_str()));
        projects.insert(origin, Item::Table(entry));
        Ok(())
    }
}

/// On-disk document holding every profile.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProfileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the named profile, or an empty view when either the profile
    /// or the whole document does not exist.
    pub fn read_profile(&self, name: &str) -> Result<ProfileView, ConfigError> {
        let (document, _) = self.read_document()?;
        Ok(document
            .get("profiles")
            .and_then(|profiles| profiles.get(name))
            .map(ProfileView::from_item)
            .unwrap_or_default())
    }

    /// Runs `edit` against the named profile, creating it if needed.
    ///
    /// The document is persisted only if `edit` returns `Ok` and the
    /// rendered content changed. An error (or a panic) inside `edit` leaves
    /// the file untouched.
    pub fn edit_profile<T, E>(
        &self,
        name: &str,
        edit: impl FnOnce(&mut ProfileEditor<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<ConfigError>,
    {
        let (mut document, original) = self.read_document()?;

        let profile = profile_table_mut(&mut document, name, &self.path)?;
        let mut editor = ProfileEditor {
            table: profile,
            path: &self.path,
        };
        let out = edit(&mut editor)?;

        let rendered = document.to_string();
        if rendered != original {
            self.write_document(&rendered)?;
            debug!(path = %self.path.display(), profile = name, "Profile document written");
        }
        Ok(out)
    }

    // Parsed document plus the text it came from ("" when missing).
    fn read_document(&self) -> Result<(DocumentMut, String), ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let document = content
            .parse::<DocumentMut>()
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok((document, content))
    }

    fn write_document(&self, content: &str) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

fn profile_table_mut<'a>(
    document: &'a mut DocumentMut,
    name: &str,
    path: &Path,
) -> Result<&'a mut Table, ConfigError> {
    let profiles = document
        .as_table_mut()
        .entry("profiles")
        .or_insert(implicit_table())
        .as_table_mut()
        .ok_or_else(|| malformed(path, "`profiles` is not a table"))?;

    profiles
        .entry(name)
        .or_insert(implicit_table())
        .as_table_mut()
        .ok_or_else(|| malformed(path, &format!("profile `{name}` is not a table")))
}

// Header-less until it holds a key of its own.
fn implicit_table() -> Item {
    let mut table = Table::new();
    table.set_implicit(true);
    Item::Table(table)
}

fn connected_project(entry: &Item) -> Option<ConnectedProject> {
    let id = entry.get("id")?;
    let id = match (id.as_integer(), id.as_str()) {
        (Some(id), _) => ProjectId::Int(id),
        (None, Some(id)) => ProjectId::Str(id.to_string()),
        (None, None) => return None,
    };
    Some(ConnectedProject {
        domain: entry.get("domain")?.as_str()?.to_string(),
        id,
        name: entry.get("name")?.as_str()?.to_string(),
    })
}

fn malformed(path: &Path, reason: &str) -> ConfigError {
    ConfigError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FxfError;

    fn store_in(dir: &tempfile::TempDir) -> ProfileStore {
        ProfileStore::new(dir.path().join("nested").join("config.toml"))
    }

    #[test]
    fn missing_document_reads_as_empty_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let view = store.read_profile(DEFAULT_PROFILE).unwrap();
        assert!(view.domains().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn edit_creates_document_and_keeps_domains_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for url in ["https://a.example", "https://b.example", "https://a.example"] {
            store
                .edit_profile(DEFAULT_PROFILE, |p| p.add_domain(url))
                .unwrap();
        }

        let view = store.read_profile(DEFAULT_PROFILE).unwrap();
        assert_eq!(view.domains(), vec!["https://a.example", "https://b.example"]);
        assert!(store.read_profile("work").unwrap().domains().is_empty());
    }

    #[test]
    fn failed_edit_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://a.example"))
            .unwrap();
        let before = fs::read(store.path()).unwrap();

        let result: Result<(), ConfigError> = store.edit_profile(DEFAULT_PROFILE, |p| {
            p.add_domain("https://b.example")?;
            Err(ConfigError::Malformed {
                path: PathBuf::from("x"),
                reason: "boom".into(),
            })
        });

        assert!(result.is_err());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn failed_edit_does_not_create_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let result: Result<(), FxfError> = store.edit_profile("work", |p| {
            p.add_domain("https://a.example")?;
            Err(FxfError::Interrupted)
        });

        assert!(matches!(result, Err(FxfError::Interrupted)));
        assert!(!store.path().exists());
    }

    #[test]
    fn unchanged_edit_keeps_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("config.toml"));
        let original = "# my instances\n[profiles.default]\ndomains = [\"https://a.example\"] # main\n";
        fs::write(store.path(), original).unwrap();

        let added = store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://a.example"))
            .unwrap();

        assert!(!added);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);
    }

    #[test]
    fn adding_a_domain_keeps_user_comments() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("config.toml"));
        fs::write(
            store.path(),
            "# my instances\n[profiles.default]\ndomains = [\"https://a.example\"] # main\n",
        )
        .unwrap();

        let added = store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://b.example"))
            .unwrap();

        assert!(added);
        let written = fs::read_to_string(store.path()).unwrap();
        assert!(written.starts_with("# my instances\n"), "{written}");
        assert!(written.contains("# main"), "{written}");
        assert_eq!(
            store.read_profile(DEFAULT_PROFILE).unwrap().domains(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn write_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("config.toml"));

        store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://a.example"))
            .unwrap();
        store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://b.example"))
            .unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("config.toml")]);
    }

    #[test]
    fn rewrite_keeps_key_order_of_other_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("config.toml"));
        fs::write(
            store.path(),
            "[profiles.work]\ndomains = [\"https://w.example\"]\n\n[profiles.default]\ndomains = []\n",
        )
        .unwrap();

        store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://a.example"))
            .unwrap();

        let written = fs::read_to_string(store.path()).unwrap();
        let work = written.find("[profiles.work]").unwrap();
        let default = written.find("[profiles.default]").unwrap();
        assert!(work < default);
        assert_eq!(
            store.read_profile("work").unwrap().domains(),
            vec!["https://w.example"]
        );
    }

    #[test]
    fn malformed_domains_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("config.toml"));
        fs::write(store.path(), "[profiles.default]\ndomains = \"nope\"\n").unwrap();

        let err = store
            .edit_profile(DEFAULT_PROFILE, |p| p.add_domain("https://a.example"))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(store.read_profile(DEFAULT_PROFILE).unwrap().domains().is_empty());
    }

    #[test]
    fn projects_round_trip_through_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let project = ConnectedProject {
            domain: "https://a.example".into(),
            id: ProjectId::Int(42),
            name: "app".into(),
        };

        store
            .edit_profile(DEFAULT_PROFILE, |p| {
                p.set_project("git@github.com:acme/app.git", &project)
            })
            .unwrap();

        let view = store.read_profile(DEFAULT_PROFILE).unwrap();
        assert_eq!(view.project("git@github.com:acme/app.git"), Some(project));
        assert_eq!(view.project("git@github.com:acme/other.git"), None);
    }
}
