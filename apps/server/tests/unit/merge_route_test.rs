//! Unit tests for the merge trigger endpoint
//!
//! Runs the HTTP layer against in-memory collaborators.

use actix_web::{http::StatusCode, test, web, App};
use rustrak_merge::config::SecurityConfig;
use rustrak_merge::routes;
use serde_json::{json, Value};

use crate::common::{GroupBuilder, Harness};

const TOKEN: &str = "0123456789abcdef0123456789abcdef";

macro_rules! merge_app {
    ($harness:expr, $token:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($harness.ctx.clone()))
                .app_data(web::Data::new(SecurityConfig {
                    api_token: $token.map(str::to_string),
                }))
                .configure(routes::merge::configure),
        )
        .await
    };
}

fn seeded() -> Harness {
    let h = Harness::new();
    h.store.insert_group(GroupBuilder::new(5).times_seen(3).build());
    h.store.insert_group(GroupBuilder::new(6).times_seen(9).build());
    h
}

// =============================================================================
// Authentication
// =============================================================================

#[actix_web::test]
async fn test_merge_requires_token() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "Unauthorized");
    assert!(h.queue.history().is_empty());
}

#[actix_web::test]
async fn test_merge_rejects_wrong_token() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .insert_header(("Authorization", "Bearer not-the-token"))
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_merge_rejects_non_bearer_scheme() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .insert_header(("Authorization", format!("Basic {}", TOKEN)))
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_merge_disabled_without_configured_token() {
    let h = seeded();
    let app = merge_app!(h, None::<&str>);

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .insert_header(("Authorization", format!("Bearer {}", TOKEN)))
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Unauthorized: Merge API is disabled");
}

// =============================================================================
// Merge Requests
// =============================================================================

#[actix_web::test]
async fn test_merge_is_accepted() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .insert_header(("Authorization", format!("Bearer {}", TOKEN)))
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["merge"]["parent"], 6);
    assert_eq!(body["merge"]["children"], json!([5]));
    assert_eq!(body["transaction_id"].as_str().map(str::len), Some(32));
    assert_eq!(h.queue.history().len(), 1);
}

#[actix_web::test]
async fn test_merge_of_single_group_is_bad_request() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/1/issues/merge")
        .insert_header(("Authorization", format!("Bearer {}", TOKEN)))
        .set_json(json!({ "group_ids": [5] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "ValidationError");
}

#[actix_web::test]
async fn test_merge_across_projects_is_not_found() {
    let h = seeded();
    let app = merge_app!(h, Some(TOKEN));

    let req = test::TestRequest::post()
        .uri("/api/projects/2/issues/merge")
        .insert_header(("Authorization", format!("Bearer {}", TOKEN)))
        .set_json(json!({ "group_ids": [5, 6] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
