use std::sync::Arc;
use std::time::Duration;

use kgfl_session::{
    CredentialPair, FileCredentialStore, GuardDecision, SessionConfig, SessionContext, SessionError,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer) -> SessionContext {
    SessionContext::builder(SessionConfig::with_base_url(format!("{}/api", server.uri())))
        .build()
        .expect("context builds")
}

fn editor() -> serde_json::Value {
    json!({"id": 7, "username": "editor", "role": "editor", "first_name": "Nurlan", "last_name": "Ibraimov"})
}

#[tokio::test]
async fn login_stores_credentials_and_publishes_principal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "editor", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "a-1",
            "refresh": "r-1",
            "user": editor(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server);
    let mut state = ctx.session().watch();
    let principal = ctx
        .session()
        .login("editor", "secret")
        .await
        .expect("login succeeds");

    assert_eq!(principal.username, "editor");
    assert_eq!(principal.display_name(), "Nurlan Ibraimov");
    assert_eq!(
        ctx.coordinator().credentials().pair().expect("read store"),
        Some(CredentialPair::new("a-1", "r-1"))
    );
    assert!(state.has_changed().expect("sender alive"));
    let current = state.borrow_and_update().clone();
    assert!(current.authenticated());
    assert_eq!(current.role(), Some("editor"));
    assert_eq!(ctx.route_guard().require_role("editor").decide(), GuardDecision::Allow);
    assert_eq!(ctx.route_guard().require_role("admin").decide(), GuardDecision::Forbidden);
}

#[tokio::test]
async fn rejected_login_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "No active account found with the given credentials"})),
        )
        .mount(&server)
        .await;

    let ctx = context(&server);
    let err = ctx
        .session()
        .login("editor", "wrong")
        .await
        .expect_err("login rejected");

    match err {
        SessionError::InvalidCredentials { message } => {
            assert_eq!(message, "No active account found with the given credentials");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ctx.coordinator().credentials().pair().expect("read store").is_none());
    assert!(ctx.session().state().is_initializing());
    assert_eq!(ctx.route_guard().decide(), GuardDecision::Loading);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let server = MockServer::start().await;
    let ctx = context(&server);
    ctx.coordinator()
        .credentials()
        .store_pair(&CredentialPair::new("a-1", "r-1"))
        .expect("store credentials");

    let mut state = ctx.session().watch();
    ctx.session().logout().expect("first logout");
    assert!(state.has_changed().expect("sender alive"));
    state.borrow_and_update();

    ctx.session().logout().expect("second logout");
    assert!(!state.has_changed().expect("sender alive"));
    assert!(ctx.coordinator().credentials().pair().expect("read store").is_none());
    assert_eq!(ctx.route_guard().decide(), GuardDecision::RedirectToLogin);
}

#[tokio::test]
async fn restore_without_stored_credential_skips_the_network() {
    let server = MockServer::start().await;
    let ctx = context(&server);

    let state = ctx.session().restore_session().await.expect("restore");
    assert!(!state.authenticated());
    assert!(!state.is_initializing());
    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn restore_recovers_through_a_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(editor()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server);
    ctx.coordinator()
        .credentials()
        .store_pair(&CredentialPair::new("expired", "r-1"))
        .expect("store credentials");

    let mut guard = ctx.route_guard();
    let (state, decision) = tokio::join!(ctx.session().restore_session(), guard.settled());
    let state = state.expect("restore");
    assert!(state.authenticated());
    assert_eq!(state.principal().map(|p| p.id), Some(7));
    assert_eq!(decision, GuardDecision::Allow);
}

#[tokio::test]
async fn restore_failure_logs_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let ctx = context(&server);
    ctx.coordinator()
        .credentials()
        .store_pair(&CredentialPair::new("expired", "revoked"))
        .expect("store credentials");

    let state = ctx.session().restore_session().await.expect("restore settles");
    assert!(!state.authenticated());
    assert!(!state.is_initializing());
    assert!(ctx.coordinator().credentials().pair().expect("read store").is_none());
}

#[tokio::test]
async fn restore_treats_server_errors_as_signed_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let ctx = context(&server);
    ctx.coordinator()
        .credentials()
        .store_pair(&CredentialPair::new("a-1", "r-1"))
        .expect("store credentials");

    let state = ctx.session().restore_session().await.expect("restore settles");
    assert!(!state.authenticated());
    assert!(!state.is_initializing());
    assert_eq!(ctx.coordinator().refresh_count(), 0);
}

#[tokio::test]
async fn concurrent_restores_share_one_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(editor())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server);
    ctx.coordinator()
        .credentials()
        .store_pair(&CredentialPair::new("a-1", "r-1"))
        .expect("store credentials");

    let session = ctx.session();
    let (first, second) = tokio::join!(session.restore_session(), session.restore_session());
    assert!(first.expect("first restore").authenticated());
    assert!(second.expect("second restore").authenticated());
}

#[tokio::test]
async fn file_store_survives_a_new_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a-1",
            "refresh_token": "r-1",
            "user": editor(),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer a-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(editor()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tmp dir");
    let file = dir.path().join("credentials.json");
    let config = SessionConfig::with_base_url(format!("{}/api", server.uri()));

    let first = SessionContext::builder(config.clone())
        .credential_store(Arc::new(FileCredentialStore::new(&file)))
        .build()
        .expect("context builds");
    first.session().login("editor", "secret").await.expect("login");
    first.shutdown();

    let second = SessionContext::builder(config)
        .credential_store(Arc::new(FileCredentialStore::new(&file)))
        .build()
        .expect("context builds");
    let state = second.session().restore_session().await.expect("restore");
    assert!(state.authenticated());

    second.session().logout().expect("logout");
    assert!(!file.exists());
}
