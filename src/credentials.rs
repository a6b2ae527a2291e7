// Credential manager: ties the profile document and the secret store
// together for one active profile.

use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::{ApiFactory, Session};
use crate::error::FxfError;
use crate::profile::{ConnectedProject, ProfileStore};
use crate::secrets::SecretStore;
use crate::settings::Settings;

pub struct CredentialManager {
    profile: String,
    timeout: Duration,
    profiles: ProfileStore,
    secrets: Box<dyn SecretStore>,
}

impl CredentialManager {
    pub fn new(settings: &Settings, secrets: Box<dyn SecretStore>) -> Self {
        CredentialManager {
            profile: settings.profile.clone(),
            timeout: settings.timeout,
            profiles: ProfileStore::new(&settings.config_path),
            secrets,
        }
    }

    /// Name of the profile all operations are scoped to.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn profile_store(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Returns `explicit` when given and non-empty, else the stored token.
    /// Never prompts and never touches the network.
    pub fn resolve_token(&self, instance: &str, explicit: Option<&str>) -> Result<String, FxfError> {
        if let Some(token) = explicit.filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        match self.secrets.load(instance)? {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(FxfError::MissingCredential {
                instance: instance.to_string(),
                profile: self.profile.clone(),
            }),
        }
    }

    /// Factory for `instance`, for callers that want to nest sessions.
    pub fn api(&self, instance: &str, explicit: Option<&str>) -> Result<Rc<ApiFactory>, FxfError> {
        let token = self.resolve_token(instance, explicit)?;
        Ok(ApiFactory::with_timeout(instance, token, self.timeout))
    }

    pub fn open_session(&self, instance: &str, explicit: Option<&str>) -> Result<Session, FxfError> {
        Ok(self.api(instance, explicit)?.enter()?)
    }

    /// Adds `instance` to the profile's domains. Returns whether it was new.
    pub fn record_domain(&self, instance: &str) -> Result<bool, FxfError> {
        self.profiles
            .edit_profile(&self.profile, |profile| Ok(profile.add_domain(instance)?))
    }

    /// Registers `instance` in the profile and stores its token. If the
    /// token cannot be stored the profile is left as it was.
    pub fn save_credential(&self, instance: &str, token: &str) -> Result<(), FxfError> {
        self.profiles.edit_profile::<_, FxfError>(&self.profile, |profile| {
            profile.add_domain(instance)?;
            self.secrets.save(instance, token)?;
            Ok(())
        })?;
        info!(instance, profile = %self.profile, "Saved credentials");
        Ok(())
    }

    pub fn list_domains(&self) -> Result<Vec<String>, FxfError> {
        Ok(self.profiles.read_profile(&self.profile)?.domains())
    }

    /// Whether at least one instance is registered in the profile.
    pub fn has_credentials(&self) -> Result<bool, FxfError> {
        Ok(!self.list_domains()?.is_empty())
    }

    pub fn save_project(&self, origin: &str, project: &ConnectedProject) -> Result<(), FxfError> {
        self.profiles.edit_profile::<_, FxfError>(&self.profile, |profile| {
            Ok(profile.set_project(origin, project)?)
        })?;
        debug!(origin, domain = %project.domain, "Connected project");
        Ok(())
    }

    pub fn project(&self, origin: &str) -> Result<Option<ConnectedProject>, FxfError> {
        Ok(self.profiles.read_profile(&self.profile)?.project(origin))
    }
}
