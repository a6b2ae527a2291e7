// API client module: a blocking HTTP client bound to one instance and one
// token. `ApiFactory` owns at most one `reqwest` client at a time; every
// `Session` handed out by `enter` shares it and the client is dropped when
// the last (outermost) session goes away.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;

/// Path every endpoint hangs off, relative to the instance host.
pub const API_PREFIX: &str = "/back/api/";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Clients currently open in this process, across all factories.
static LIVE_CLIENTS: AtomicUsize = AtomicUsize::new(0);

/// Number of API clients currently open in the process.
pub fn live_clients() -> usize {
    LIVE_CLIENTS.load(Ordering::SeqCst)
}

/// Owner of the HTTP client for one (instance, token) pair.
///
/// Not a pool: nested `enter` calls reuse the same client and only the
/// outermost session closes it. Meant for nested use on one thread, which
/// `Rc` enforces.
pub struct ApiFactory {
    instance: String,
    token: String,
    timeout: Duration,
    state: RefCell<FactoryState>,
}

#[derive(Default)]
struct FactoryState {
    client: Option<Client>,
    depth: usize,
    opened: usize,
    closed: usize,
}

impl ApiFactory {
    pub fn new(instance: impl Into<String>, token: impl Into<String>) -> Rc<Self> {
        Self::with_timeout(instance, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        instance: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Rc<Self> {
        Rc::new(ApiFactory {
            instance: instance.into(),
            token: token.into(),
            timeout,
            state: RefCell::new(FactoryState::default()),
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Number of sessions currently alive on this factory.
    pub fn depth(&self) -> usize {
        self.state.borrow().depth
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().client.is_some()
    }

    /// Opens a session, building the client on first entry.
    ///
    /// The instance URL is not checked here; a malformed one surfaces as
    /// [`ApiError::UnsupportedProtocol`] on the first request.
    pub fn enter(self: &Rc<Self>) -> Result<Session, ApiError> {
        let mut state = self.state.borrow_mut();
        let client = match state.client.clone() {
            Some(client) => client,
            None => {
                let client = self.build_client()?;
                state.client = Some(client.clone());
                state.opened += 1;
                LIVE_CLIENTS.fetch_add(1, Ordering::SeqCst);
                debug!(instance = %self.instance, "Opened API client");
                client
            }
        };
        state.depth += 1;

        Ok(Session {
            factory: Rc::clone(self),
            client,
        })
    }

    fn exit(&self) {
        let mut state = self.state.borrow_mut();
        if state.depth == 0 {
            return;
        }
        state.depth -= 1;

        if state.depth == 0 && state.client.take().is_some() {
            state.closed += 1;
            LIVE_CLIENTS.fetch_sub(1, Ordering::SeqCst);
            debug!(instance = %self.instance, "Closed API client");
        }
    }

    fn build_client(&self) -> Result<Client, ApiError> {
        let mut auth = HeaderValue::from_str(&format!("Token {}", self.token))
            .map_err(|_| ApiError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;
        Ok(client)
    }

    fn base_url(&self) -> Result<Url, ApiError> {
        let unsupported = || ApiError::UnsupportedProtocol {
            url: self.instance.clone(),
        };
        let url = Url::parse(&self.instance).map_err(|_| unsupported())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(unsupported());
        }
        url.join(API_PREFIX).map_err(|_| unsupported())
    }
}

impl fmt::Debug for ApiFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFactory")
            .field("instance", &self.instance)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Live handle on an instance. Dropping it releases its share of the client.
pub struct Session {
    factory: Rc<ApiFactory>,
    client: Client,
}

impl Session {
    /// The "who am I" namespace.
    pub fn me(&self) -> MeApi<'_> {
        MeApi { session: self }
    }

    pub fn project(&self) -> ProjectApi<'_> {
        ProjectApi { session: self }
    }

    /// Opens a nested session on the same client.
    pub fn enter(&self) -> Result<Session, ApiError> {
        self.factory.enter()
    }

    pub fn instance(&self) -> &str {
        self.factory.instance()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.factory
            .base_url()?
            .join(path)
            .map_err(|_| ApiError::UnsupportedProtocol {
                url: self.factory.instance.clone(),
            })
    }

    fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().map_err(|e| {
            if e.is_builder() {
                ApiError::UnsupportedProtocol {
                    url: self.factory.instance.clone(),
                }
            } else {
                ApiError::Transport(e)
            }
        })?;
        read_checked(response)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let body = self.send(self.client.get(url).query(query))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let body = self.send(self.client.post(url).json(payload))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("instance", &self.instance())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.factory.exit();
    }
}

/// Reads the whole body, then turns non-2xx answers into `HttpStatus`.
fn read_checked(response: Response) -> Result<Vec<u8>, ApiError> {
    let status = response.status();
    let body = response.bytes()?.to_vec();
    if !status.is_success() {
        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body)
}

/// Project identifiers come back as integers or strings depending on the
/// instance version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectId {
    Int(i64),
    Str(String),
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectId::Int(id) => write!(f, "{id}"),
            ProjectId::Str(id) => f.write_str(id),
        }
    }
}

/// Answer of `GET me/`. `kind` is `"authenticated"` for a valid token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CurrentUser {
    pub fn is_authenticated(&self) -> bool {
        self.kind == "authenticated"
    }

    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Answer of `GET project/resolve/`.
#[derive(Debug, Clone, Deserialize)]
pub struct Resolution {
    pub project: Option<Project>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub content: String,
}

/// One Fluxfile validation error reported by the GHA endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FluxfileIssue {
    pub path: Vec<serde_json::Value>,
    pub message: String,
}

impl FluxfileIssue {
    /// Path segments joined with dots, e.g. `steps.0`.
    pub fn dotted_path(&self) -> String {
        self.path
            .iter()
            .map(|segment| match segment {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GhaOutcome {
    Generated(Vec<GeneratedFile>),
    /// The server refused the Fluxfile (HTTP 400).
    Rejected(Vec<FluxfileIssue>),
}

#[derive(Deserialize)]
struct GeneratedFiles {
    files: Vec<GeneratedFile>,
}

#[derive(Deserialize)]
struct FluxfileRejection {
    #[serde(default)]
    fluxfile: Option<Vec<FluxfileIssue>>,
}

#[derive(Serialize)]
struct GhaRequest<'a> {
    fluxfile: &'a str,
}

pub struct MeApi<'a> {
    session: &'a Session,
}

impl MeApi<'_> {
    /// Who the token belongs to (authenticated or not).
    pub fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.session.get_json("me/", &[])
    }
}

pub struct ProjectApi<'a> {
    session: &'a Session,
}

impl ProjectApi<'_> {
    /// Finds the project whose repository has the given git remote.
    pub fn resolve(&self, remote: &str) -> Result<Resolution, ApiError> {
        self.session
            .get_json("project/resolve/", &[("remote", remote)])
    }

    /// Generates the GitHub Actions files for a project from its Fluxfile.
    ///
    /// A 400 carrying a `fluxfile` error list becomes
    /// [`GhaOutcome::Rejected`]; any other failure is returned as is.
    pub fn gha(&self, project: &ProjectId, fluxfile: &str) -> Result<GhaOutcome, ApiError> {
        let path = format!("project/{project}/gha/");
        match self
            .session
            .post_json::<GeneratedFiles, _>(&path, &GhaRequest { fluxfile })
        {
            Ok(generated) => Ok(GhaOutcome::Generated(generated.files)),
            Err(ApiError::HttpStatus { status: 400, body }) => {
                match serde_json::from_str::<FluxfileRejection>(&body) {
                    Ok(FluxfileRejection {
                        fluxfile: Some(issues),
                    }) if !issues.is_empty() => Ok(GhaOutcome::Rejected(issues)),
                    _ => Err(ApiError::HttpStatus { status: 400, body }),
                }
            }
            Err(e) => Err(e),
        }
    }
}
