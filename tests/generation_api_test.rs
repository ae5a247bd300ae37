//! Image generation routes: charging, refunds, bulk runs, and the gallery.

use async_trait::async_trait;
use axum::http::StatusCode;
use promptforge::ForgeError;
use promptforge::config::{ConfigBuilder, GenerationConfig};
use promptforge::credits::EntryKind;
use promptforge::generation::{GeneratedImage, GenerationRequest, ImageGenerator};
use promptforge::testing::{TEST_JWT_SECRET, TestApp, get, post};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Fails every prompt containing "fail".
struct PickyGenerator;

#[async_trait]
impl ImageGenerator for PickyGenerator {
    fn name(&self) -> &str {
        "picky"
    }

    async fn generate(&self, request: &GenerationRequest) -> promptforge::Result<GeneratedImage> {
        if request.prompt.contains("fail") {
            return Err(ForgeError::service_unavailable("provider overloaded"));
        }
        Ok(GeneratedImage {
            url: format!("https://cdn.example.com/{}.png", request.prompt.replace(' ', "-")),
            provider: "picky".to_string(),
            seed: request.seed,
        })
    }
}

/// Outlives a one second request timeout, then fails.
struct StalledGenerator;

#[async_trait]
impl ImageGenerator for StalledGenerator {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> promptforge::Result<GeneratedImage> {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        Err(ForgeError::service_unavailable("provider timed out"))
    }
}

async fn balance(app: &TestApp, token: &str) -> u64 {
    get(app.router(), "/api/account")
        .bearer(token)
        .execute()
        .await
        .assert_ok()
        .json_path("data.credits")
        .await
        .as_u64()
        .unwrap()
}

#[tokio::test]
async fn test_generate_charges_one_credit_and_stores_image() {
    let app = TestApp::new().await;
    let token = app.tokens.user("maya");

    let response = post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "a lighthouse at dusk", "width": 512, "height": 512 }))
        .execute()
        .await
        .assert_created();
    let location = response.header("location").unwrap();
    let body = response.json_path("data").await;

    assert_eq!(body["credits_spent"], 1);
    assert_eq!(body["balance"], 9);
    assert_eq!(body["image"]["prompt"], "a lighthouse at dusk");
    assert_eq!(location, format!("/api/images/{}", body["image"]["id"].as_str().unwrap()));

    let image = get(app.router(), &location)
        .bearer(&token)
        .execute()
        .await
        .assert_ok()
        .json_path("data.url")
        .await;
    assert_eq!(image, body["image"]["url"]);

    // Another user cannot see it.
    get(app.router(), &location)
        .bearer(&app.tokens.user("omar"))
        .execute()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_validates_the_request() {
    let app = TestApp::new().await;
    let token = app.tokens.user("maya");

    post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "" }))
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "tiny", "width": 64 }))
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Nothing was charged.
    assert_eq!(balance(&app, &token).await, 10);
}

#[tokio::test]
async fn test_failed_generation_is_refunded() {
    let app = TestApp::with_generator(Arc::new(PickyGenerator)).await;
    let token = app.tokens.user("maya");

    post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "please fail" }))
        .execute()
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(balance(&app, &token).await, 10);

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
    assert_eq!(kinds, ["refund", "deduction", "trial_grant"]);
}

#[tokio::test]
async fn test_out_of_credits_is_payment_required() {
    let app = TestApp::new().await;
    let token = app.tokens.user("maya");

    for i in 0..10 {
        post(app.router(), "/api/images")
            .bearer(&token)
            .json(&json!({ "prompt": format!("frame {}", i) }))
            .execute()
            .await
            .assert_created();
    }

    post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "one too many" }))
        .execute()
        .await
        .assert_status(StatusCode::PAYMENT_REQUIRED);

    let pagination = get(app.router(), "/api/images")
        .bearer(&token)
        .query(&[("per_page", "4"), ("page", "3")])
        .execute()
        .await
        .assert_ok()
        .json_path("data.pagination")
        .await;
    assert_eq!(pagination["total"], 10);
    assert_eq!(pagination["total_pages"], 3);
}

#[tokio::test]
async fn test_bulk_refunds_failed_prompts_and_keeps_order() {
    let app = TestApp::with_generator(Arc::new(PickyGenerator)).await;
    let token = app.tokens.user("maya");

    let result = post(app.router(), "/api/images/bulk")
        .bearer(&token)
        .json(&json!({
            "prompts": [
                { "prompt": "red fox" },
                { "prompt": "fail here" },
                { "prompt": "blue whale" },
                { "prompt": "fail again" }
            ]
        }))
        .execute()
        .await
        .assert_ok()
        .json_path("data")
        .await;

    assert_eq!(result["succeeded"], 2);
    assert_eq!(result["failed"], 2);
    assert_eq!(result["credits_spent"], 2);
    assert_eq!(result["credits_refunded"], 2);
    assert_eq!(result["balance"], 8);

    let results = result["results"].as_array().unwrap();
    let indexes: Vec<u64> = results.iter().map(|r| r["index"].as_u64().unwrap()).collect();
    assert_eq!(indexes, [0, 1, 2, 3]);
    assert_eq!(results[0]["image"]["prompt"], "red fox");
    assert!(results[1]["error"].is_string());
    assert_eq!(results[2]["image"]["prompt"], "blue whale");

    assert_eq!(balance(&app, &token).await, 8);
}

#[tokio::test]
async fn test_bulk_limits() {
    let app = TestApp::new().await;
    let token = app.tokens.user("maya");

    post(app.router(), "/api/images/bulk")
        .bearer(&token)
        .json(&json!({ "prompts": [] }))
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let too_many: Vec<_> = (0..11).map(|i| json!({ "prompt": format!("p{}", i) })).collect();
    post(app.router(), "/api/images/bulk")
        .bearer(&token)
        .json(&json!({ "prompts": too_many }))
        .execute()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // A bulk run the balance cannot cover is refused as a whole.
    let ten_prompts: Vec<_> = (0..10).map(|i| json!({ "prompt": format!("p{}", i) })).collect();
    post(app.router(), "/api/images")
        .bearer(&token)
        .json(&json!({ "prompt": "spend one" }))
        .execute()
        .await
        .assert_created();
    post(app.router(), "/api/images/bulk")
        .bearer(&token)
        .json(&json!({ "prompts": ten_prompts }))
        .execute()
        .await
        .assert_status(StatusCode::PAYMENT_REQUIRED);

    assert_eq!(balance(&app, &token).await, 9);
}

#[tokio::test]
async fn test_refund_survives_request_timeout() {
    let config = ConfigBuilder::new()
        .with_jwt_secret(TEST_JWT_SECRET)
        .with_request_timeout(1)
        .with_generation(GenerationConfig {
            timeout_seconds: 1,
            max_parallel: 1,
            max_bulk: 1,
            ..Default::default()
        })
        .build()
        .unwrap();
    let app = TestApp::build(config, None, Some(Arc::new(StalledGenerator))).await;

    post(app.router(), "/api/images")
        .bearer(&app.tokens.user("maya"))
        .json(&json!({ "prompt": "a lighthouse in a storm" }))
        .execute()
        .await
        .assert_status(StatusCode::REQUEST_TIMEOUT);

    // The provider call keeps running after the response; wait for its refund.
    let mut kinds = Vec::new();
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        kinds = app
            .context
            .ledger
            .ledger("maya", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.kind)
            .collect();
        if kinds.first() == Some(&EntryKind::Refund) {
            break;
        }
    }

    assert_eq!(
        kinds,
        vec![EntryKind::Refund, EntryKind::Deduction, EntryKind::TrialGrant]
    );
    assert_eq!(app.context.ledger.account("maya").await.unwrap().credits, 10);
}
