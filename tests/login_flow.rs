use std::collections::VecDeque;
use std::io;

use fxf_cli::commands::{self, DomainStatus};
use fxf_cli::secrets::MemorySecretStore;
use fxf_cli::settings::Settings;
use fxf_cli::ui::{Attempt, TokenPrompt};
use fxf_cli::{CredentialManager, FxfError};
use httpmock::prelude::*;
use serde_json::json;

struct Tokens(VecDeque<&'static str>);

impl TokenPrompt for Tokens {
    fn ask(&mut self, _: Attempt) -> io::Result<String> {
        self.0
            .pop_front()
            .map(str::to_string)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more tokens"))
    }
}

fn tokens(list: &[&'static str]) -> Tokens {
    Tokens(list.iter().copied().collect())
}

fn manager(config: &std::path::Path, profile: &str) -> CredentialManager {
    let settings = Settings::new(Some(profile.into()), Some(config.to_path_buf()), Some(5));
    CredentialManager::new(&settings, Box::new(MemorySecretStore::new()))
}

#[test]
fn login_then_use_stored_token() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/back/api/me/")
            .header("authorization", "Token wrong");
        then.status(403).json_body(json!({"detail": "Invalid token."}));
    });
    let me = server.mock(|when, then| {
        when.method(GET)
            .path("/back/api/me/")
            .header("authorization", "Token right");
        then.status(200).json_body(json!({
            "type": "authenticated",
            "first_name": "Grace",
            "last_name": "Hopper",
        }));
    });
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("fxf").join("config.toml");
    let cm = manager(&config, "default");
    let instance = server.base_url();

    commands::login(&cm, &instance, &mut tokens(&["wrong", "right"])).unwrap();

    assert_eq!(cm.resolve_token(&instance, None).unwrap(), "right");
    assert_eq!(cm.list_domains().unwrap(), vec![instance.clone()]);
    assert_eq!(commands::probe_domain(&cm, &instance).unwrap(), DomainStatus::Ok);
    me.assert_hits(2);

    // logging in again does not duplicate the domain
    commands::login(&cm, &instance, &mut tokens(&["right"])).unwrap();
    assert_eq!(cm.list_domains().unwrap(), vec![instance.clone()]);

    let document = std::fs::read_to_string(&config).unwrap();
    assert!(document.contains(&instance));
    assert!(!document.contains("right"), "tokens never land in the profile document");
}

#[test]
fn failed_login_registers_nothing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/back/api/me/");
        then.status(500);
    });
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let cm = manager(&config, "default");

    let err = commands::login(&cm, &server.base_url(), &mut tokens(&["tok"])).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<FxfError>(),
        Some(FxfError::UnexpectedServer { .. })
    ));
    assert!(!config.exists());
}

#[test]
fn session_reuses_one_client_across_nested_calls() {
    let server = MockServer::start();
    let resolve = server.mock(|when, then| {
        when.method(GET).path("/back/api/project/resolve/");
        then.status(200)
            .json_body(json!({"project": {"id": 1, "name": "app"}}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/back/api/me/");
        then.status(200).json_body(json!({"type": "authenticated"}));
    });
    let dir = tempfile::tempdir().unwrap();
    let cm = manager(&dir.path().join("config.toml"), "default");
    cm.save_credential(&server.base_url(), "tok").unwrap();

    let factory = cm.api(&server.base_url(), None).unwrap();
    {
        let outer = factory.enter().unwrap();
        assert!(outer.me().current_user().unwrap().is_authenticated());
        {
            let inner = outer.enter().unwrap();
            assert_eq!(factory.depth(), 2);
            let project = inner.project().resolve("origin").unwrap().project.unwrap();
            assert_eq!(project.name, "app");
        }
        assert!(factory.is_open());
    }
    assert!(!factory.is_open());
    resolve.assert_hits(1);
}
