//! Payment provider webhook: signature check, idempotency, and routing.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::credits::{
    CreditError, KeySource, LedgerAuditEvent, LedgerManager, Plan, TopUpOutcome,
};
use crate::error::{ForgeError, Result};
use crate::marketplace::Marketplace;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "forge-signature";

/// Default allowed clock skew between the provider and us.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub object: serde_json::Value,
}

/// Outcome of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Not an event we act on.
    Ignored,
    /// Redelivery of an event we already handled.
    AlreadyProcessed,
}

impl WebhookOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored => "ignored",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

/// Handles `order.paid` events for plans and bundles.
///
/// The signing secret is kept in a [`SecretString`] so it never shows up in
/// debug output.
pub struct PaymentWebhookHandler {
    ledger: LedgerManager,
    marketplace: Marketplace,
    secret: SecretString,
    tolerance_seconds: i64,
}

impl PaymentWebhookHandler {
    #[must_use]
    pub fn new(
        ledger: LedgerManager,
        marketplace: Marketplace,
        secret: impl Into<SecretString>,
    ) -> Self {
        Self {
            ledger,
            marketplace,
            secret: secret.into(),
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, seconds: i64) -> Self {
        self.tolerance_seconds = seconds;
        self
    }

    /// Verify the signature header and parse the event.
    pub fn verify_signature(&self, payload: &[u8], header: &str) -> Result<PaymentEvent> {
        self.verify_signature_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_signature_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> Result<PaymentEvent> {
        let parts = parse_signature_header(header)?;

        let age_seconds = now.abs_diff(parts.timestamp);
        if age_seconds > self.tolerance_seconds.unsigned_abs() {
            return Err(CreditError::WebhookTimestampExpired { age_seconds }.into());
        }

        let expected = compute_signature(self.secret.expose_secret(), parts.timestamp, payload)?;
        let provided =
            hex::decode(&parts.signature).map_err(|_| CreditError::InvalidWebhookSignature)?;

        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(CreditError::InvalidWebhookSignature.into());
        }

        serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "failed to parse webhook payload");
            CreditError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
            .into()
        })
    }

    /// Process a verified event at most once.
    pub async fn handle_event(&self, event: PaymentEvent) -> Result<WebhookOutcome> {
        let store = self.ledger.store();
        if store.is_event_processed(&event.id).await? {
            tracing::debug!(event_id = %event.id, "webhook event already processed");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event_type.as_str() {
            "order.paid" => self.handle_order_paid(&event).await?,
            _ => WebhookOutcome::Ignored,
        };

        if outcome != WebhookOutcome::Ignored {
            store.mark_event_processed(&event.id).await?;
        }

        self.ledger
            .audit_logger()
            .log(LedgerAuditEvent::WebhookProcessed {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                outcome: outcome.as_str().to_string(),
            })
            .await;

        Ok(outcome)
    }

    async fn handle_order_paid(&self, event: &PaymentEvent) -> Result<WebhookOutcome> {
        let order = &event.data.object;
        let order_id = required_str(order, &["id"])?;
        let user_id = required_str(order, &["notes", "user_id"])?;

        if let Some(raw_plan) = optional_str(order, &["notes", "plan"]) {
            let plan = Plan::parse(raw_plan).ok_or_else(|| CreditError::InvalidWebhookPayload {
                message: format!("unknown plan '{}'", raw_plan),
            })?;

            return match self
                .ledger
                .top_up(user_id, plan, order_id, KeySource::PaymentOrder)
                .await?
            {
                TopUpOutcome::Applied(receipt) => {
                    tracing::info!(
                        order_id = %order_id,
                        user_id = %user_id,
                        plan = %plan,
                        balance = receipt.balance,
                        "order credited"
                    );
                    Ok(WebhookOutcome::Processed)
                }
                TopUpOutcome::AlreadyConsumed => Ok(WebhookOutcome::AlreadyProcessed),
            };
        }

        if let Some(bundle_id) = optional_str(order, &["notes", "bundle_id"]) {
            let recorded = self
                .marketplace
                .record_purchase(order_id, user_id, bundle_id)
                .await?;
            return Ok(if recorded {
                WebhookOutcome::Processed
            } else {
                WebhookOutcome::AlreadyProcessed
            });
        }

        tracing::warn!(order_id = %order_id, "paid order carries neither a plan nor a bundle");
        Ok(WebhookOutcome::Ignored)
    }
}

fn optional_str<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_str<'a>(value: &'a serde_json::Value, path: &[&str]) -> Result<&'a str> {
    optional_str(value, path).ok_or_else(|| {
        ForgeError::from(CreditError::InvalidWebhookPayload {
            message: format!("missing {}", path.join(".")),
        })
    })
}

struct SignatureParts {
    timestamp: i64,
    signature: String,
}

fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(CreditError::InvalidWebhookSignature.into());
        };
        match key.trim() {
            "t" => timestamp = value.trim().parse().ok(),
            "v1" => signature = Some(value.trim().to_string()),
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok(SignatureParts {
            timestamp,
            signature,
        }),
        _ => Err(CreditError::InvalidWebhookSignature.into()),
    }
}

/// HMAC-SHA256 over `"<timestamp>.<payload>"`.
fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ForgeError::internal("HMAC error"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a signature header for `payload`, as the provider would.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use crate::credits::{InMemoryLedgerStore, PlanCatalog};
    use crate::marketplace::{InMemoryBundleStore, NewBundle};
    use std::sync::Arc;

    const SECRET: &str = "whsec_test_secret";

    fn handler() -> (PaymentWebhookHandler, LedgerManager, Marketplace) {
        let ledger = LedgerManager::new(Arc::new(InMemoryLedgerStore::new()), PlanCatalog::default());
        let marketplace = Marketplace::new(Arc::new(InMemoryBundleStore::new()));
        let handler = PaymentWebhookHandler::new(ledger.clone(), marketplace.clone(), SECRET);
        (handler, ledger, marketplace)
    }

    fn order_event(event_id: &str, order_id: &str, notes: serde_json::Value) -> PaymentEvent {
        PaymentEvent {
            id: event_id.into(),
            event_type: "order.paid".into(),
            created: 1_760_000_000,
            data: PaymentEventData {
                object: serde_json::json!({ "id": order_id, "notes": notes }),
            },
        }
    }

    #[test]
    fn test_parse_signature_header() {
        let parts = parse_signature_header("t=1234567890,v1=abc123").unwrap();
        assert_eq!(parts.timestamp, 1234567890);
        assert_eq!(parts.signature, "abc123");

        assert!(parse_signature_header("garbage").is_err());
        assert!(parse_signature_header("t=123").is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_stale_not_fatal() {
        let (handler, _, _) = handler();
        let now = 1_760_000_000;

        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            let err = handler.verify_signature_at(b"{}", header, now).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(err.to_string().contains("timestamp expired"));
        }

        let err = handler
            .verify_signature_at(b"{}", "t=0,v1=00", i64::MIN)
            .unwrap_err();
        assert!(err.to_string().contains("timestamp expired"));
    }

    #[test]
    fn test_verify_signature_accepts_valid_header() {
        let (handler, _, _) = handler();
        let payload = br#"{"id":"evt_1","type":"order.paid","data":{"object":{}}}"#;
        let now = 1_760_000_000;
        let header = sign_payload(SECRET, now, payload).unwrap();

        let event = handler.verify_signature_at(payload, &header, now + 10).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn test_verify_signature_rejects_tampering_and_wrong_secret() {
        let (handler, _, _) = handler();
        let payload = br#"{"id":"evt_1","type":"order.paid","data":{"object":{}}}"#;
        let now = 1_760_000_000;

        let header = sign_payload(SECRET, now, payload).unwrap();
        let tampered = br#"{"id":"evt_2","type":"order.paid","data":{"object":{}}}"#;
        assert!(handler.verify_signature_at(tampered, &header, now).is_err());

        let forged = sign_payload("whsec_other", now, payload).unwrap();
        assert!(handler.verify_signature_at(payload, &forged, now).is_err());

        let not_hex = format!("t={},v1=zz", now);
        assert!(handler.verify_signature_at(payload, &not_hex, now).is_err());
    }

    #[test]
    fn test_verify_signature_rejects_stale_timestamp() {
        let (handler, _, _) = handler();
        let payload = br#"{"id":"evt_1","type":"order.paid","data":{"object":{}}}"#;
        let now = 1_760_000_000;
        let header = sign_payload(SECRET, now - 301, payload).unwrap();

        let err = handler.verify_signature_at(payload, &header, now).unwrap_err();
        assert!(err.to_string().contains("timestamp expired"));
    }

    #[tokio::test]
    async fn test_order_paid_activates_plan_once() {
        let (handler, ledger, _) = handler();
        let notes = serde_json::json!({ "user_id": "user_1", "plan": "premium" });

        let outcome = handler
            .handle_event(order_event("evt_1", "order_1", notes.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(ledger.account("user_1").await.unwrap().credits, 510);

        // Same event redelivered.
        let outcome = handler
            .handle_event(order_event("evt_1", "order_1", notes.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);

        // Same order under a new event id.
        let outcome = handler
            .handle_event(order_event("evt_2", "order_1", notes))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);
        assert_eq!(ledger.account("user_1").await.unwrap().credits, 510);
    }

    #[tokio::test]
    async fn test_order_paid_records_bundle_purchase() {
        let (handler, _, marketplace) = handler();
        let bundle = marketplace
            .create(NewBundle {
                slug: "ink-dragons".into(),
                title: "Ink Dragons".into(),
                description: String::new(),
                price_cents: 500,
                currency: "USD".into(),
                preview_urls: vec![],
                asset_urls: vec!["https://cdn.example.com/d.png".into()],
                active: true,
            })
            .await
            .unwrap();

        let notes = serde_json::json!({ "user_id": "user_1", "bundle_id": bundle.id });
        let outcome = handler
            .handle_event(order_event("evt_1", "order_7", notes))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        assert!(marketplace.download("user_1", "ink-dragons").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_events_are_ignored() {
        let (handler, ledger, _) = handler();
        let event = PaymentEvent {
            id: "evt_9".into(),
            event_type: "refund.created".into(),
            created: 0,
            data: PaymentEventData {
                object: serde_json::json!({}),
            },
        };

        assert_eq!(handler.handle_event(event).await.unwrap(), WebhookOutcome::Ignored);
        assert!(!ledger.store().is_event_processed("evt_9").await.unwrap());
    }

    #[tokio::test]
    async fn test_order_with_unknown_plan_is_rejected() {
        let (handler, _, _) = handler();
        let notes = serde_json::json!({ "user_id": "user_1", "plan": "platinum" });

        let err = handler
            .handle_event(order_event("evt_1", "order_1", notes))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_order_without_user_is_rejected() {
        let (handler, _, _) = handler();
        let notes = serde_json::json!({ "plan": "booster" });

        assert!(handler
            .handle_event(order_event("evt_1", "order_1", notes))
            .await
            .is_err());
    }
}
