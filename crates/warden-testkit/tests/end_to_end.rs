//! End-to-end tests: a real supervisor over a memory store, driven through
//! the client side of the key exchange.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use warden::perms::{AuthRequest, Verdict};
use warden::{
    Action, CategoryAction, PermissionAction, ReplyBody, ResultCode, RightAction, RightInfo,
    StaticDirectory, Supervisor, WardenConfig,
};
use warden_core::{hash_password, perpetual, Credential, GrantScope};
use warden_store::{SqliteStore, Store, StoreOp};
use warden_testkit::{
    credential_request, loopback, provision_user, seeded_store, test_config, TestClient,
    TestServer, ROOT_BOOTSTRAP_TOKEN, ROOT_PASSWORD,
};

fn remote() -> IpAddr {
    "10.0.0.7".parse().unwrap()
}

/// Route supervisor logs through the test harness; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn code_of(server: &TestServer, action: Action) -> ResultCode {
    server.handle.request(action).await.unwrap().code
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrap
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_then_validate() {
    let (server, token) = TestServer::bootstrapped(test_config()).await.unwrap();

    server
        .handle
        .validate_token("root", token.value.clone(), loopback())
        .await
        .unwrap();

    let wrong_user = server
        .handle
        .validate_token("alice", token.value.clone(), loopback())
        .await;
    assert_eq!(wrong_user, Err(ResultCode::Unauthorized));

    let unknown = server
        .handle
        .validate_token("root", "deadbeef", loopback())
        .await;
    assert_eq!(unknown, Err(ResultCode::Unauthorized));

    let verdict = server
        .handle
        .authorize(AuthRequest::global("root", "schema_add"))
        .await;
    assert_eq!(verdict, Verdict::ADMIN);
}

#[tokio::test]
async fn test_bootstrap_succeeds_once() {
    let (server, _) = TestServer::bootstrapped(test_config()).await.unwrap();
    let commits = server.store.commit_count();

    let again = TestClient::loopback()
        .bootstrap_root(&server.handle, "other", ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap_err();
    assert_eq!(again.code(), Some(ResultCode::Conflict));
    assert_eq!(server.store.commit_count(), commits);

    // The original password still works.
    TestClient::loopback()
        .issue_token(&server.handle, "root", ROOT_PASSWORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_rejections() {
    let server = TestServer::start(test_config()).await.unwrap();
    let client = TestClient::loopback();

    let wrong_token = client
        .bootstrap_root(&server.handle, ROOT_PASSWORD, "guess")
        .await
        .unwrap_err();
    assert_eq!(wrong_token.code(), Some(ResultCode::Unauthorized));

    let request = credential_request("alice", ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN, None);
    let (_, sealed) = client.seal(&server.handle, &request).await.unwrap();
    let wrong_user = server.handle.bootstrap_root(sealed).await;
    assert_eq!(wrong_user, Err(ResultCode::BadRequest));

    // Nothing was persisted; bootstrap still works.
    client
        .bootstrap_root(&server.handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Key exchange
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_replayed_request_is_not_found() {
    let server = TestServer::start(test_config()).await.unwrap();
    let request = credential_request("root", ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN, None);
    let (_, sealed) = TestClient::loopback()
        .seal(&server.handle, &request)
        .await
        .unwrap();

    server.handle.bootstrap_root(sealed.clone()).await.unwrap();

    let replay = server.handle.bootstrap_root(sealed).await;
    assert_eq!(replay, Err(ResultCode::NotFound));
}

#[tokio::test]
async fn test_unknown_request_id_is_not_found() {
    let server = TestServer::start(test_config()).await.unwrap();
    let request = credential_request("root", ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN, None);
    let (_, mut sealed) = TestClient::loopback()
        .seal(&server.handle, &request)
        .await
        .unwrap();
    sealed.request_id = Uuid::new_v4();

    assert_eq!(
        server.handle.bootstrap_root(sealed).await,
        Err(ResultCode::NotFound)
    );
}

#[tokio::test]
async fn test_origin_mismatch_consumes_exchange() {
    let server = TestServer::start(test_config()).await.unwrap();
    let request = credential_request("root", ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN, None);
    let (_, sealed) = TestClient::new(remote())
        .seal(&server.handle, &request)
        .await
        .unwrap();

    let mut moved = sealed.clone();
    moved.client_address = loopback();
    assert_eq!(
        server.handle.bootstrap_root(moved).await,
        Err(ResultCode::NotFound)
    );

    // The exchange is gone even for the right address.
    assert_eq!(
        server.handle.bootstrap_root(sealed).await,
        Err(ResultCode::NotFound)
    );
}

#[tokio::test]
async fn test_garbled_payload_is_server_error() {
    let server = TestServer::start(test_config()).await.unwrap();
    let request = credential_request("root", ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN, None);
    let (_, mut sealed) = TestClient::loopback()
        .seal(&server.handle, &request)
        .await
        .unwrap();
    sealed.payload = "bm90IGNpcGhlcnRleHQ=".into();

    assert_eq!(
        server.handle.bootstrap_root(sealed).await,
        Err(ResultCode::ServerError)
    );
}

#[tokio::test]
async fn test_kex_init_rejects_bad_public_key() {
    let server = TestServer::start(test_config()).await.unwrap();
    let message = warden_core::KexMessage {
        public_key: "not hex".into(),
        request_id: Uuid::nil(),
        initialization_vector: String::new(),
    };

    assert_eq!(
        server.handle.kex_init(message, loopback()).await,
        Err(ResultCode::BadRequest)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Issuing tokens
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_issue_token() {
    let (server, first) = TestServer::bootstrapped(test_config()).await.unwrap();

    let second = TestClient::loopback()
        .issue_token(&server.handle, "root", ROOT_PASSWORD)
        .await
        .unwrap();
    assert_ne!(first.value, second.value);
    server
        .handle
        .validate_token("root", second.value, loopback())
        .await
        .unwrap();

    let commits = server.store.commit_count();
    let wrong = TestClient::loopback()
        .issue_token(&server.handle, "root", "wrong")
        .await
        .unwrap_err();
    assert_eq!(wrong.code(), Some(ResultCode::Unauthorized));
    assert_eq!(server.store.commit_count(), commits);
}

#[tokio::test]
async fn test_issue_token_for_inactive_user() {
    let store = seeded_store().await.unwrap();
    provision_user(&store, "alice", &[]).await.unwrap();
    let server = TestServer::start_with(test_config(), store, Arc::new(StaticDirectory::new()))
        .await
        .unwrap();
    let commits = server.store.commit_count();

    let err = TestClient::loopback()
        .issue_token(&server.handle, "alice", "anything")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::Unauthorized));
    assert_eq!(server.store.commit_count(), commits);
}

#[tokio::test]
async fn test_issue_token_for_expired_credential() {
    let store = seeded_store().await.unwrap();
    let id = provision_user(&store, "alice", &[]).await.unwrap();
    let now = Utc::now();
    let expired = Credential::new(
        id,
        "alice",
        hash_password("secret").unwrap(),
        now - Duration::days(2),
        now - Duration::days(1),
    );
    store
        .commit(vec![
            StoreOp::SetUserCredential(expired),
            StoreOp::ActivateUser(id),
        ])
        .await
        .unwrap();

    let server = TestServer::start_with(test_config(), store, Arc::new(StaticDirectory::new()))
        .await
        .unwrap();
    let commits = server.store.commit_count();

    let err = TestClient::loopback()
        .issue_token(&server.handle, "alice", "secret")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::Unauthorized));
    assert_eq!(server.store.commit_count(), commits);
}

#[tokio::test]
async fn test_root_restricted_to_loopback() {
    let config = WardenConfig {
        root_restricted: true,
        ..test_config()
    };
    let (server, _) = TestServer::bootstrapped(config).await.unwrap();

    let remote_attempt = TestClient::new(remote())
        .issue_token(&server.handle, "root", ROOT_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(remote_attempt.code(), Some(ResultCode::Unauthorized));

    TestClient::loopback()
        .issue_token(&server.handle, "root", ROOT_PASSWORD)
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Activation
// ─────────────────────────────────────────────────────────────────────────────

async fn ldap_server() -> TestServer {
    let store = seeded_store().await.unwrap();
    for user in ["alice", "bob", "carol"] {
        provision_user(&store, user, &[]).await.unwrap();
    }
    let directory = StaticDirectory::new()
        .with_user("alice", "upstream-a")
        .with_user("bob", "upstream-b");
    TestServer::start_with(test_config(), store, Arc::new(directory))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_activate_user_via_directory() {
    let server = ldap_server().await;
    let client = TestClient::loopback();

    let token = client
        .activate_user(&server.handle, "alice", "new-password", "upstream-a", None)
        .await
        .unwrap();
    assert_eq!(token.user_name, "alice");
    server
        .handle
        .validate_token("alice", token.value, loopback())
        .await
        .unwrap();

    client
        .issue_token(&server.handle, "alice", "new-password")
        .await
        .unwrap();

    let again = client
        .activate_user(&server.handle, "alice", "newer", "upstream-a", None)
        .await
        .unwrap_err();
    assert_eq!(again.code(), Some(ResultCode::Conflict));

    let user = server.store.find_user("alice").await.unwrap().unwrap();
    assert!(user.is_active);
}

#[tokio::test]
async fn test_activation_rejections() {
    let server = ldap_server().await;
    let client = TestClient::loopback();

    let wrong_upstream = client
        .activate_user(&server.handle, "bob", "new-password", "guess", None)
        .await
        .unwrap_err();
    assert_eq!(wrong_upstream.code(), Some(ResultCode::Unauthorized));

    let reused = client
        .activate_user(&server.handle, "bob", "upstream-b", "upstream-b", None)
        .await
        .unwrap_err();
    assert_eq!(reused.code(), Some(ResultCode::NotAcceptable));

    let no_directory_entry = client
        .activate_user(&server.handle, "carol", "pw", "anything", None)
        .await
        .unwrap_err();
    assert_eq!(no_directory_entry.code(), Some(ResultCode::Unauthorized));

    let unknown = client
        .activate_user(&server.handle, "mallory", "pw", "anything", None)
        .await
        .unwrap_err();
    assert_eq!(unknown.code(), Some(ResultCode::NotFound));

    let root = client
        .activate_user(&server.handle, "root", "pw", "anything", None)
        .await
        .unwrap_err();
    assert_eq!(root.code(), Some(ResultCode::BadRequest));

    let request = credential_request("alice", "pw", "upstream-a", None);
    let (_, sealed) = client.seal(&server.handle, &request).await.unwrap();
    let mismatch = server.handle.activate_user("bob", sealed).await;
    assert_eq!(mismatch, Err(ResultCode::BadRequest));

    // Bob can still activate after the failures.
    client
        .activate_user(&server.handle, "bob", "new-password", "upstream-b", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_activate_user_via_token() {
    let store = seeded_store().await.unwrap();
    let id = provision_user(&store, "dave", &[]).await.unwrap();
    store
        .commit(vec![StoreOp::SetActivationToken {
            user_id: id,
            token_hash: hash_password("activation-123").unwrap(),
        }])
        .await
        .unwrap();

    let config = WardenConfig {
        activation: warden::ActivationMethod::Token,
        ..test_config()
    };
    let server = TestServer::start_with(config, store, Arc::new(StaticDirectory::new()))
        .await
        .unwrap();
    let client = TestClient::loopback();

    let wrong = client
        .activate_user(&server.handle, "dave", "pw", "activation-999", None)
        .await
        .unwrap_err();
    assert_eq!(wrong.code(), Some(ResultCode::Unauthorized));

    let expires_at = Utc::now() + Duration::days(30);
    client
        .activate_user(&server.handle, "dave", "pw", "activation-123", Some(expires_at))
        .await
        .unwrap();
    client.issue_token(&server.handle, "dave", "pw").await.unwrap();

    let stored = server.store.load_credentials().await.unwrap();
    let dave = stored.iter().find(|c| c.user_name == "dave").unwrap();
    assert!(dave.expires_at < perpetual());
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorization_verdicts() {
    let store = seeded_store().await.unwrap();
    provision_user(&store, "alice", &["global_schema"]).await.unwrap();
    provision_user(&store, "bob", &[]).await.unwrap();
    provision_user(&store, "olga", &["omnipotence"]).await.unwrap();
    let server = TestServer::start_with(test_config(), store, Arc::new(StaticDirectory::new()))
        .await
        .unwrap();

    let cases = [
        ("alice", Verdict::LIMITED, ResultCode::Ok),
        ("bob", Verdict::DENIED, ResultCode::Forbidden),
        ("olga", Verdict::ADMIN, ResultCode::Ok),
        ("nobody", Verdict::DENIED, ResultCode::Forbidden),
    ];
    for (user, verdict, code) in cases {
        let reply = server
            .handle
            .request(Action::Authorize(AuthRequest::global(user, "schema_list")))
            .await
            .unwrap();
        assert_eq!(reply.code, code, "{user}");
        assert_eq!(reply.body, ReplyBody::Verdict(verdict), "{user}");
    }

    let unknown_action = server
        .handle
        .authorize(AuthRequest::global("alice", "schema_explode"))
        .await;
    assert_eq!(unknown_action, Verdict::DENIED);
}

#[tokio::test]
async fn test_open_instance_admits_everyone() {
    let config = WardenConfig {
        open_instance: true,
        ..test_config()
    };
    let server = TestServer::start(config).await.unwrap();

    let verdict = server
        .handle
        .authorize(AuthRequest::global("nobody", "anything"))
        .await;
    assert_eq!(verdict, Verdict::ADMIN);
}

// ─────────────────────────────────────────────────────────────────────────────
// Read-only, commit failure, latency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_readonly_rejects_mutations() {
    let config = WardenConfig {
        readonly: true,
        ..test_config()
    };
    let server = TestServer::start(config).await.unwrap();
    let commits = server.store.commit_count();

    let bootstrap = TestClient::loopback()
        .bootstrap_root(&server.handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap_err();
    assert_eq!(bootstrap.code(), Some(ResultCode::Conflict));

    let add = code_of(&server, Action::Category(CategoryAction::Add("x".into()))).await;
    assert_eq!(add, ResultCode::Conflict);

    let list = code_of(&server, Action::Category(CategoryAction::List)).await;
    assert_eq!(list, ResultCode::Ok);

    assert_eq!(server.store.commit_count(), commits);
}

#[tokio::test]
async fn test_commit_failure_leaves_memory_untouched() {
    init_tracing();
    let server = TestServer::start(test_config()).await.unwrap();
    let client = TestClient::loopback();

    server.store.set_fail_commits(true);
    let failed = client
        .bootstrap_root(&server.handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap_err();
    assert_eq!(failed.code(), Some(ResultCode::ServerError));
    server.store.set_fail_commits(false);

    // No credential reached memory.
    let issue = client
        .issue_token(&server.handle, "root", ROOT_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(issue.code(), Some(ResultCode::Unauthorized));

    // Root was never enabled, so bootstrap can be retried.
    client
        .bootstrap_root(&server.handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_commit_failure_leaves_tables_untouched() {
    let server = TestServer::start(test_config()).await.unwrap();

    server.store.set_fail_commits(true);
    let add = code_of(&server, Action::Category(CategoryAction::Add("custom".into()))).await;
    assert_eq!(add, ResultCode::ServerError);
    server.store.set_fail_commits(false);

    let reply = server
        .handle
        .request(Action::Category(CategoryAction::List))
        .await
        .unwrap();
    let categories = match reply.body {
        ReplyBody::Categories(categories) => categories,
        other => panic!("expected categories, got {other:?}"),
    };
    assert!(!categories.contains(&"custom".to_string()));
}

#[tokio::test]
async fn test_latency_floor() {
    let config = WardenConfig {
        minimum_latency_ms: 300,
        ..test_config()
    };
    let server = TestServer::start(config).await.unwrap();

    let started = Instant::now();
    let result = server
        .handle
        .validate_token("root", "deadbeef", loopback())
        .await;
    assert_eq!(result, Err(ResultCode::Unauthorized));
    assert!(started.elapsed() >= StdDuration::from_millis(300));
}

#[tokio::test]
async fn test_concurrent_issue_token_keeps_runtime_responsive() {
    init_tracing();
    let (server, _) = TestServer::bootstrapped(test_config()).await.unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let handle = server.handle.clone();
            tokio::spawn(async move {
                TestClient::loopback()
                    .issue_token(&handle, "root", "wrong")
                    .await
            })
        })
        .collect();

    // Password checks run beside this loop; a 1ms sleep must keep waking
    // on time while they do.
    let mut worst = StdDuration::ZERO;
    while !attempts.iter().all(|attempt| attempt.is_finished()) {
        let tick = Instant::now();
        tokio::time::sleep(StdDuration::from_millis(1)).await;
        worst = worst.max(tick.elapsed());
    }

    for attempt in attempts {
        let err = attempt.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::Unauthorized));
    }
    assert!(
        worst < StdDuration::from_millis(100),
        "runtime stalled for {worst:?}"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories, permissions and rights
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_category_and_permission_management() {
    let server = TestServer::start(test_config()).await.unwrap();
    let category = |action| Action::Category(action);
    let permission = |action| Action::Permission(action);

    assert_eq!(
        code_of(&server, category(CategoryAction::Add("custom".into()))).await,
        ResultCode::Accepted
    );
    assert_eq!(
        code_of(&server, category(CategoryAction::Add("custom".into()))).await,
        ResultCode::Conflict
    );

    let add = PermissionAction::Add {
        name: "custom_read".into(),
        category: "custom".into(),
    };
    assert_eq!(code_of(&server, permission(add)).await, ResultCode::Accepted);

    let orphan = PermissionAction::Add {
        name: "orphan".into(),
        category: "missing".into(),
    };
    assert_eq!(code_of(&server, permission(orphan)).await, ResultCode::NotFound);

    assert_eq!(
        code_of(&server, category(CategoryAction::Remove("custom".into()))).await,
        ResultCode::Conflict
    );

    let shown = server
        .handle
        .request(permission(PermissionAction::Show("custom_read".into())))
        .await
        .unwrap();
    assert_eq!(shown.code, ResultCode::Ok);

    assert_eq!(
        code_of(&server, permission(PermissionAction::Remove("custom_read".into()))).await,
        ResultCode::Accepted
    );
    assert_eq!(
        code_of(&server, permission(PermissionAction::Show("custom_read".into()))).await,
        ResultCode::NotFound
    );
    assert_eq!(
        code_of(&server, category(CategoryAction::Remove("custom".into()))).await,
        ResultCode::Accepted
    );
    assert_eq!(
        code_of(&server, category(CategoryAction::Remove("custom".into()))).await,
        ResultCode::NotFound
    );
}

#[tokio::test]
async fn test_right_management() {
    let store = seeded_store().await.unwrap();
    provision_user(&store, "alice", &[]).await.unwrap();
    let server = TestServer::start_with(test_config(), store, Arc::new(StaticDirectory::new()))
        .await
        .unwrap();
    let repository = Uuid::new_v4();

    let grant = |permission: &str, scope| {
        Action::Right(RightAction::Grant {
            user: "alice".into(),
            permission: permission.into(),
            scope,
        })
    };

    assert_eq!(
        code_of(&server, grant("repository_read", GrantScope::Repository(repository))).await,
        ResultCode::Accepted
    );
    assert_eq!(
        code_of(&server, grant("repository_read", GrantScope::Repository(repository))).await,
        ResultCode::Conflict
    );
    assert_eq!(
        code_of(&server, grant("system_all", GrantScope::Repository(repository))).await,
        ResultCode::BadRequest
    );
    assert_eq!(
        code_of(&server, grant("no_such_permission", GrantScope::Global)).await,
        ResultCode::NotFound
    );

    let verdict = server
        .handle
        .authorize(AuthRequest::repository("alice", "repository_show", repository))
        .await;
    assert_eq!(verdict, Verdict::LIMITED);

    let listed = server
        .handle
        .request(Action::Right(RightAction::List {
            user: "alice".into(),
        }))
        .await
        .unwrap();
    assert_eq!(
        listed.body,
        ReplyBody::Rights(vec![RightInfo {
            permission: "repository_read".into(),
            scope: GrantScope::Repository(repository),
        }])
    );

    let revoke = Action::Right(RightAction::Revoke {
        user: "alice".into(),
        permission: "repository_read".into(),
        scope: GrantScope::Repository(repository),
    });
    assert_eq!(code_of(&server, revoke.clone()).await, ResultCode::Accepted);
    assert_eq!(code_of(&server, revoke).await, ResultCode::NotFound);

    let verdict = server
        .handle
        .authorize(AuthRequest::repository("alice", "repository_show", repository))
        .await;
    assert_eq!(verdict, Verdict::DENIED);

    let unknown_user = Action::Right(RightAction::List {
        user: "mallory".into(),
    });
    assert_eq!(code_of(&server, unknown_user).await, ResultCode::NotFound);
}

// ─────────────────────────────────────────────────────────────────────────────
// Restart
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.db");

    let store = SqliteStore::open(&path).unwrap();
    store
        .commit(vec![StoreOp::SetRootPassword(
            hash_password(ROOT_BOOTSTRAP_TOKEN).unwrap(),
        )])
        .await
        .unwrap();

    let handle = Supervisor::new(test_config(), Arc::new(store))
        .start()
        .await
        .unwrap();
    let token = TestClient::loopback()
        .bootstrap_root(&handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap();
    drop(handle);

    let reopened = SqliteStore::open(&path).unwrap();
    let handle = Supervisor::new(test_config(), Arc::new(reopened))
        .start()
        .await
        .unwrap();

    handle
        .validate_token("root", token.value.clone(), loopback())
        .await
        .unwrap();
    TestClient::loopback()
        .issue_token(&handle, "root", ROOT_PASSWORD)
        .await
        .unwrap();

    let again = TestClient::loopback()
        .bootstrap_root(&handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap_err();
    assert_eq!(again.code(), Some(ResultCode::Conflict));
}

#[tokio::test]
async fn test_tokens_under_another_key_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.db");

    let store = SqliteStore::open(&path).unwrap();
    store
        .commit(vec![StoreOp::SetRootPassword(
            hash_password(ROOT_BOOTSTRAP_TOKEN).unwrap(),
        )])
        .await
        .unwrap();
    let handle = Supervisor::new(test_config(), Arc::new(store))
        .start()
        .await
        .unwrap();
    let token = TestClient::loopback()
        .bootstrap_root(&handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
        .await
        .unwrap();
    drop(handle);

    let rotated = WardenConfig {
        token_key: "rotated key".into(),
        ..test_config()
    };
    let handle = Supervisor::new(rotated, Arc::new(SqliteStore::open(&path).unwrap()))
        .start()
        .await
        .unwrap();

    assert_eq!(
        handle.validate_token("root", token.value, loopback()).await,
        Err(ResultCode::Unauthorized)
    );
}
