//! 实时权限同步集成测试

use crm_admin::{
    api::Method,
    models::auth::LoginRequest,
    realtime::{PermissionSync, SyncState},
    storage::SharedMemoryStorage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{create_test_app, create_test_app_with_store, login_response, settle, TestApp};

const CHANNEL: &str = "user-permissions-changed.42";

fn prepare(app: &TestApp) {
    app.transport
        .respond(Method::Post, "auth/login", login_response("tok", 42));
    app.transport
        .respond(Method::Post, "auth/logout", json!(null));
    app.transport.respond(
        Method::Get,
        "auth/my-permissions",
        json!({"permissions": [{"name": "Libraries", "entities": []}]}),
    );
}

async fn login(app: &TestApp) {
    app.context
        .auth
        .login(LoginRequest {
            email: "ann@example.com".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();
}

async fn wait_for_refreshes(app: &TestApp, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.transport.count(Method::Get, "auth/my-permissions") < expected {
            settle().await;
        }
    })
    .await
    .expect("permission refresh did not happen");
}

#[tokio::test]
async fn test_sync_connects_after_login_and_refetches_on_connect() {
    let app = create_test_app();
    prepare(&app);
    let sync = PermissionSync::spawn(
        app.context.auth.clone(),
        app.bus.clone(),
        "user-permissions-changed",
    );
    settle().await;
    assert_eq!(sync.state(), SyncState::Disconnected);

    login(&app).await;
    let mut state = sync.subscribe();
    state
        .wait_for(|s| *s == SyncState::Listening)
        .await
        .unwrap();
    wait_for_refreshes(&app, 1).await;

    assert_eq!(app.bus.channel_count(CHANNEL).await, 1);
    let session = app.context.session.snapshot();
    assert_eq!(session.token(), Some("tok"));
    assert!(session.has_permission("libraries"));

    sync.shutdown().await;
    assert_eq!(app.bus.active_count().await, 0);
}

#[tokio::test]
async fn test_only_permission_change_events_trigger_refetch() {
    let app = create_test_app();
    prepare(&app);
    login(&app).await;
    let sync = PermissionSync::spawn(
        app.context.auth.clone(),
        app.bus.clone(),
        "user-permissions-changed",
    );
    sync.subscribe()
        .wait_for(|s| *s == SyncState::Listening)
        .await
        .unwrap();
    wait_for_refreshes(&app, 1).await;

    app.bus
        .publish(CHANNEL, "ChangePermission", json!({"key": "team-permissions"}))
        .unwrap();
    app.bus
        .publish(CHANNEL, "AccountUpdated", json!({"key": "my-permissions"}))
        .unwrap();
    settle().await;
    assert_eq!(app.transport.count(Method::Get, "auth/my-permissions"), 1);

    app.bus
        .publish(CHANNEL, "ChangePermission", json!({"key": "my-permissions"}))
        .unwrap();
    wait_for_refreshes(&app, 2).await;

    // 令牌不变
    assert_eq!(app.context.session.snapshot().token(), Some("tok"));
    sync.shutdown().await;
}

#[tokio::test]
async fn test_logout_tears_down_subscription() {
    let app = create_test_app();
    prepare(&app);
    login(&app).await;
    let sync = PermissionSync::spawn(
        app.context.auth.clone(),
        app.bus.clone(),
        "user-permissions-changed",
    );
    let mut state = sync.subscribe();
    state
        .wait_for(|s| *s == SyncState::Listening)
        .await
        .unwrap();

    app.context.auth.logout().await.unwrap();
    state
        .wait_for(|s| *s == SyncState::Disconnected)
        .await
        .unwrap();
    settle().await;

    assert_eq!(app.bus.active_count().await, 0);
    sync.shutdown().await;
}

#[tokio::test]
async fn test_context_starts_and_stops_background_sync() {
    let app = create_test_app();
    prepare(&app);

    app.context.start();
    settle().await;
    assert_eq!(
        app.context.permission_sync_state(),
        Some(SyncState::Disconnected)
    );

    login(&app).await;
    wait_for_refreshes(&app, 1).await;
    assert_eq!(app.bus.channel_count(CHANNEL).await, 1);

    app.context.shutdown().await;
    assert_eq!(app.context.permission_sync_state(), None);
    assert_eq!(app.bus.active_count().await, 0);
}

#[tokio::test]
async fn test_tab_adopting_session_starts_listening() {
    let shared = SharedMemoryStorage::new(16);
    let tab_a = create_test_app_with_store(Arc::new(shared.handle()));
    let tab_b = create_test_app_with_store(Arc::new(shared.handle()));
    prepare(&tab_a);
    prepare(&tab_b);
    tab_b.context.start();
    settle().await;

    login(&tab_a).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while tab_b.context.permission_sync_state() != Some(SyncState::Listening) {
            settle().await;
        }
    })
    .await
    .expect("second tab never started listening");

    assert_eq!(tab_b.context.profile.profile_id(), Some(42));
    assert_eq!(tab_b.bus.channel_count(CHANNEL).await, 1);
    wait_for_refreshes(&tab_b, 1).await;
    let refreshes = tab_b.transport.requests_to(Method::Get, "auth/my-permissions");
    assert_eq!(refreshes[0].token.as_deref(), Some("tok"));

    tab_b.context.shutdown().await;
    assert_eq!(tab_b.bus.active_count().await, 0);
}
