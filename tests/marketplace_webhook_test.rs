//! Admin bundle creation, signed payment webhooks, and bundle downloads.

use axum::http::StatusCode;
use promptforge::payments::{SIGNATURE_HEADER, sign_payload};
use promptforge::testing::{TEST_WEBHOOK_SECRET, TestApp, get, post};
use serde_json::json;

fn signed(payload: &serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(payload).unwrap();
    let header = sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body).unwrap();
    (body, header)
}

async fn deliver(app: &TestApp, payload: &serde_json::Value) -> serde_json::Value {
    let (body, header) = signed(payload);
    post(app.router(), "/api/webhooks/payments")
        .header(SIGNATURE_HEADER, &header)
        .header("content-type", "application/json")
        .raw_body(body)
        .execute()
        .await
        .assert_ok()
        .json_path("data")
        .await
}

fn plan_order(event_id: &str, order_id: &str, user_id: &str, plan: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "order.paid",
        "created": 1_760_000_000,
        "data": { "object": { "id": order_id, "notes": { "user_id": user_id, "plan": plan } } }
    })
}

async fn create_bundle(app: &TestApp) -> String {
    post(app.router(), "/api/admin/bundles")
        .bearer(&app.tokens.admin("ada"))
        .json(&json!({
            "slug": "neon-cities",
            "title": "Neon Cities",
            "description": "Twelve rain-soaked skylines",
            "price_cents": 1200,
            "preview_urls": ["https://cdn.example.com/neon/preview.png"],
            "asset_urls": ["https://cdn.example.com/neon/1.png", "https://cdn.example.com/neon/2.png"]
        }))
        .execute()
        .await
        .assert_created()
        .json_path("data.id")
        .await
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new().await;

    post(app.router(), "/api/admin/sweep")
        .execute()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    post(app.router(), "/api/admin/sweep")
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let report = post(app.router(), "/api/admin/sweep")
        .bearer(&app.tokens.admin("ada"))
        .execute()
        .await
        .assert_ok()
        .json_path("data")
        .await;
    assert_eq!(report["scanned"], 0);
}

#[tokio::test]
async fn test_public_listing_hides_assets_until_purchase() {
    let app = TestApp::new().await;
    let bundle_id = create_bundle(&app).await;

    let listing = get(app.router(), "/api/bundles")
        .execute()
        .await
        .assert_ok()
        .json_path("data")
        .await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert!(listing[0].get("asset_urls").is_none());
    assert_eq!(listing[0]["image_count"], 2);

    let by_slug = get(app.router(), "/api/bundles/neon-cities")
        .execute()
        .await
        .assert_ok()
        .json_path("data.id")
        .await;
    assert_eq!(by_slug, bundle_id.as_str());

    let download = format!("/api/bundles/{}/download", bundle_id);
    get(app.router(), &download)
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let ack = deliver(
        &app,
        &json!({
            "id": "evt_bundle_1",
            "type": "order.paid",
            "created": 1_760_000_000,
            "data": { "object": { "id": "ord_b1", "notes": { "user_id": "maya", "bundle_id": bundle_id } } }
        }),
    )
    .await;
    assert_eq!(ack["outcome"], "processed");

    let assets = get(app.router(), &download)
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .assert_ok()
        .json_path("data.asset_urls")
        .await;
    assert_eq!(assets.as_array().unwrap().len(), 2);

    let purchases = get(app.router(), "/api/account/purchases")
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .assert_ok()
        .json_path("data")
        .await;
    assert_eq!(purchases[0]["order_id"], "ord_b1");
}

#[tokio::test]
async fn test_duplicate_slug_is_a_conflict() {
    let app = TestApp::new().await;
    create_bundle(&app).await;

    post(app.router(), "/api/admin/bundles")
        .bearer(&app.tokens.admin("ada"))
        .json(&json!({
            "slug": "neon-cities",
            "title": "Again",
            "price_cents": 100,
            "asset_urls": ["https://cdn.example.com/x.png"]
        }))
        .execute()
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_paid_order_tops_up_exactly_once() {
    let app = TestApp::new().await;

    let ack = deliver(&app, &plan_order("evt_1", "ord_1", "maya", "booster")).await;
    assert_eq!(ack["outcome"], "processed");

    // Redelivery of the same event.
    let ack = deliver(&app, &plan_order("evt_1", "ord_1", "maya", "booster")).await;
    assert_eq!(ack["outcome"], "already_processed");

    // A different event for the same order.
    let ack = deliver(&app, &plan_order("evt_2", "ord_1", "maya", "booster")).await;
    assert_eq!(ack["outcome"], "already_processed");

    let account = get(app.router(), "/api/account")
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .json_path("data")
        .await;
    assert_eq!(account["plan"], "Booster");
    assert_eq!(account["credits"], 110);
    assert_eq!(account["subscription_status"], "active");
}

#[tokio::test]
async fn test_unrelated_events_are_ignored() {
    let app = TestApp::new().await;

    let ack = deliver(
        &app,
        &json!({ "id": "evt_r", "type": "order.refunded", "created": 1, "data": { "object": {} } }),
    )
    .await;
    assert_eq!(ack["outcome"], "ignored");
}

#[tokio::test]
async fn test_bad_signatures_are_rejected() {
    let app = TestApp::new().await;
    let payload = plan_order("evt_x", "ord_x", "maya", "premium");
    let (body, header) = signed(&payload);

    post(app.router(), "/api/webhooks/payments")
        .raw_body(body.clone())
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let tampered = String::from_utf8(body.clone()).unwrap().replace("premium", "professional");
    post(app.router(), "/api/webhooks/payments")
        .header(SIGNATURE_HEADER, &header)
        .raw_body(tampered)
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let stale = sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp() - 3600, &body).unwrap();
    post(app.router(), "/api/webhooks/payments")
        .header(SIGNATURE_HEADER, &stale)
        .raw_body(body)
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Nothing was credited.
    let credits = get(app.router(), "/api/account")
        .bearer(&app.tokens.user("maya"))
        .execute()
        .await
        .json_path("data.credits")
        .await;
    assert_eq!(credits, 10);
}
