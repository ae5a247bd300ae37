//! Payment provider integration.
//!
//! Paid orders arrive as signed webhooks. An order for a plan tops up the
//! buyer's credits using the order id as the idempotency key; an order for a
//! bundle records a marketplace purchase.

mod webhook;

pub use webhook::{
    DEFAULT_TOLERANCE_SECONDS, PaymentEvent, PaymentEventData, PaymentWebhookHandler,
    SIGNATURE_HEADER, WebhookOutcome, sign_payload,
};
