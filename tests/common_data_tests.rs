//! 公共数据获取集成测试

use crm_admin::{api::Method, error::AppError, models::common_data::OptionId};
use serde_json::json;

mod common;
use common::create_test_app;

const BLOCKS: [(&str, &str); 3] = [
    ("statuses", "settings/statuses?type=account"),
    ("users", "users/options"),
    ("industries", "settings/industries"),
];

fn respond_blocks(app: &common::TestApp) {
    app.transport.respond(
        Method::Get,
        "settings/statuses",
        json!([{"id": 1, "name": "Active", "color": "green"}, {"id": 2, "name": "Lost"}]),
    );
    app.transport.respond(
        Method::Get,
        "users/options",
        json!([{"id": 10, "name": "Ann"}]),
    );
    app.transport.respond(
        Method::Get,
        "settings/industries",
        json!([{"id": "media", "name": "Media"}]),
    );
}

#[tokio::test]
async fn test_failed_block_does_not_block_others() {
    let app = create_test_app();
    respond_blocks(&app);
    app.transport.fail(
        Method::Get,
        "users/options",
        AppError::Http {
            status: 500,
            message: "boom".to_string(),
        },
    );

    let bundle = app.context.common_data().fetch(BLOCKS).await;

    assert_eq!(bundle.options("statuses").unwrap().len(), 2);
    assert_eq!(
        bundle.options("industries").unwrap()[0].id,
        OptionId::Text("media".to_string())
    );
    assert!(bundle.contains_block("users"));
    assert!(bundle.options("users").is_none());
    assert_eq!(bundle.failed_blocks(), vec!["users"]);
    assert!(!bundle.is_complete());
}

#[tokio::test]
async fn test_block_query_string_is_forwarded() {
    let app = create_test_app();
    respond_blocks(&app);

    app.context.common_data().fetch(BLOCKS).await;

    let request = &app.transport.requests_to(Method::Get, "settings/statuses")[0];
    assert_eq!(request.query.as_deref(), Some("type=account"));
}

#[tokio::test]
async fn test_complete_bundle_is_reused_within_stale_window() {
    let app = create_test_app();
    respond_blocks(&app);
    let fetcher = app.context.common_data();

    let first = fetcher.fetch(BLOCKS).await;
    // 块顺序不影响缓存键
    let mut reversed = BLOCKS;
    reversed.reverse();
    let second = fetcher.fetch(reversed).await;

    assert!(first.is_complete());
    assert_eq!(first, second);
    assert_eq!(app.transport.count(Method::Get, "users/options"), 1);
}

#[tokio::test]
async fn test_bundle_with_failures_is_retried_on_next_mount() {
    let app = create_test_app();
    respond_blocks(&app);
    app.transport.respond_once(
        Method::Get,
        "users/options",
        Err(AppError::Transport("reset".to_string())),
    );
    let fetcher = app.context.common_data();

    let first = fetcher.fetch(BLOCKS).await;
    assert_eq!(first.failed_blocks(), vec!["users"]);

    let second = fetcher.fetch(BLOCKS).await;
    assert!(second.is_complete());
    assert_eq!(app.transport.count(Method::Get, "users/options"), 2);
}

#[tokio::test]
async fn test_settings_update_invalidates_common_data() {
    let app = create_test_app();
    respond_blocks(&app);
    app.transport.respond(
        Method::Put,
        "settings/statuses/1",
        json!({"id": 1, "name": "Enabled"}),
    );
    let fetcher = app.context.common_data();

    fetcher.fetch(BLOCKS).await;
    app.context
        .mutations()
        .update(
            &crm_admin::api::Resource::settings("statuses"),
            1,
            &json!({"name": "Enabled"}),
        )
        .await
        .unwrap();
    fetcher.fetch(BLOCKS).await;

    assert_eq!(app.transport.count(Method::Get, "settings/statuses"), 2);
}
