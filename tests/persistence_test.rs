//! The same flows against the SeaORM stores on an in-memory SQLite database.

use axum::http::StatusCode;
use promptforge::credits::Plan;
use promptforge::testing::{TestApp, get, post};
use serde_json::json;

#[tokio::test]
async fn test_generation_round_trip_on_sqlite() {
    let app = TestApp::with_database().await;
    let token = app.tokens.user("maya");

    let image_id = post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "a lighthouse in fog, oil painting" }))
        .execute()
        .await
        .assert_created()
        .json_path("data.id")
        .await;
    let image_uri = format!("/api/images/{}", image_id.as_str().unwrap());

    let prompt = get(app.router(), &image_uri)
        .bearer(&token)
        .execute()
        .await
        .assert_ok()
        .json_path("data.prompt")
        .await;
    assert_eq!(prompt, "a lighthouse in fog, oil painting");

    let credits = get(app.router(), "/api/account")
        .bearer(&token)
        .execute()
        .await
        .json_path("data.credits")
        .await;
    assert_eq!(credits, 9);

    let kinds: Vec<String> = get(app.router(), "/api/account/ledger")
        .bearer(&token)
        .execute()
        .await
        .json_path("data")
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["deduction", "trial_grant"]);
}

#[tokio::test]
async fn test_license_key_is_single_use_on_sqlite() {
    let app = TestApp::with_database().await;
    let key = app.licenses.mint(Plan::Booster).await;

    post(app.router(), "/api/licenses/activate")
        .bearer(&app.tokens.user("maya"))
        .json(&json!({ "key": key.as_str() }))
        .execute()
        .await
        .assert_ok();

    post(app.router(), "/api/licenses/activate")
        .bearer(&app.tokens.user("maya"))
        .json(&json!({ "key": key.as_str() }))
        .execute()
        .await
        .assert_status(StatusCode::CONFLICT);

    let account = get(app.router(), "/api/account")
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .json_path("data")
        .await;
    assert_eq!(account["credits"], 110);
    assert_eq!(account["plan"], "Booster");
    assert_eq!(account["can_generate"], true);
}

#[tokio::test]
async fn test_health_reports_database_store() {
    let app = TestApp::with_database().await;

    let status = get(app.router(), "/health")
        .execute()
        .await
        .assert_ok()
        .json_path("status")
        .await;
    assert_eq!(status, "healthy");
}
