//! Audit trail for ledger operations.
//!
//! Every balance change and plan transition is reported to a
//! [`LedgerAuditLogger`]. The default logger writes structured `tracing`
//! events under the `ledger::audit` target.

use async_trait::async_trait;
use std::fmt;

use super::plans::Plan;

/// Audit events emitted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAuditEvent {
    AccountOpened {
        user_id: String,
        credits: u64,
    },
    CreditsDeducted {
        user_id: String,
        amount: u64,
        balance: u64,
    },
    CreditsRefunded {
        user_id: String,
        amount: u64,
        balance: u64,
    },
    PlanActivated {
        user_id: String,
        plan: Plan,
        credits_added: u64,
        source: String,
    },
    /// A redemption was refused because its key was already consumed.
    KeyRejected {
        user_id: String,
        source: String,
    },
    SubscriptionExpired {
        user_id: String,
        plan: Plan,
    },
    WebhookProcessed {
        event_id: String,
        event_type: String,
        outcome: String,
    },
}

impl LedgerAuditEvent {
    /// Stable name for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountOpened { .. } => "account_opened",
            Self::CreditsDeducted { .. } => "credits_deducted",
            Self::CreditsRefunded { .. } => "credits_refunded",
            Self::PlanActivated { .. } => "plan_activated",
            Self::KeyRejected { .. } => "key_rejected",
            Self::SubscriptionExpired { .. } => "subscription_expired",
            Self::WebhookProcessed { .. } => "webhook_processed",
        }
    }
}

impl fmt::Display for LedgerAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountOpened { user_id, credits } => {
                write!(f, "Account opened: user={}, credits={}", user_id, credits)
            }
            Self::CreditsDeducted { user_id, amount, balance } => {
                write!(f, "Credits deducted: user={}, amount={}, balance={}", user_id, amount, balance)
            }
            Self::CreditsRefunded { user_id, amount, balance } => {
                write!(f, "Credits refunded: user={}, amount={}, balance={}", user_id, amount, balance)
            }
            Self::PlanActivated { user_id, plan, credits_added, source } => {
                write!(
                    f,
                    "Plan activated: user={}, plan={}, credits_added={}, source={}",
                    user_id, plan, credits_added, source
                )
            }
            Self::KeyRejected { user_id, source } => {
                write!(f, "Key rejected as already consumed: user={}, source={}", user_id, source)
            }
            Self::SubscriptionExpired { user_id, plan } => {
                write!(f, "Subscription expired: user={}, plan={}", user_id, plan)
            }
            Self::WebhookProcessed { event_id, event_type, outcome } => {
                write!(f, "Webhook processed: event={}, type={}, outcome={}", event_id, event_type, outcome)
            }
        }
    }
}

/// Sink for ledger audit events.
///
/// Implementations must not fail the surrounding ledger operation.
#[async_trait]
pub trait LedgerAuditLogger: Send + Sync {
    async fn log(&self, event: LedgerAuditEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl LedgerAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: LedgerAuditEvent) {}
}

/// Logs events through `tracing` at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl LedgerAuditLogger for TracingAuditLogger {
    async fn log(&self, event: LedgerAuditEvent) {
        tracing::info!(
            target: "ledger::audit",
            event_type = %event.kind(),
            "{}", event
        );
    }
}
