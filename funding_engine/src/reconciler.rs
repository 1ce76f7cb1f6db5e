//! Inbound webhook reconciliation.
//!
//! Order of operations is fixed: verify the signature first (no side effects on failure), check
//! the dedup ledger, apply the ledger transition, and claim the event id last. A failure before
//! the claim leaves the id unclaimed, so the gateway's redelivery gets a full retry instead of
//! bouncing off dedup; the ledger's idempotent confirm keeps the re-run from double-applying.
//! The gateway redelivers on anything but a 2xx, so business-level no-ops are acknowledged
//! rather than errored.
use std::time::Duration;

use log::*;
use thiserror::Error;

use crate::{
    api::{aggregator_api::FundingAggregatorApi, ledger_api::InvestmentLedgerApi},
    db_types::Investment,
    jobs::{Job, JobScheduler},
    traits::{FundingRead, PaymentGateway, SettlementDatabase, SettlementError, SignatureError, WebhookEvent, WebhookEventType},
};

/// How a webhook delivery was disposed of. All three variants are acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// The event was applied (or enqueued for processing).
    Accepted,
    /// The event id was seen before. No state was touched.
    Duplicate,
    /// Verified but not actionable: unknown type, unresolvable pledge, or a transition the state
    /// machine rejects.
    Ignored,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("Webhook event is missing required fields: {0}")]
    Malformed(String),
    /// The store was unavailable. Surfaced as a 5xx so the gateway redelivers.
    #[error(transparent)]
    Engine(#[from] SettlementError),
}

pub struct WebhookReconciler<B, G, S> {
    db: B,
    gateway: G,
    ledger: InvestmentLedgerApi<B>,
    aggregator: FundingAggregatorApi<B>,
    scheduler: S,
    dispute_window: Duration,
}

impl<B: Clone, G: Clone, S: Clone> Clone for WebhookReconciler<B, G, S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            ledger: self.ledger.clone(),
            aggregator: self.aggregator.clone(),
            scheduler: self.scheduler.clone(),
            dispute_window: self.dispute_window,
        }
    }
}

impl<B, G, S> WebhookReconciler<B, G, S>
where
    B: SettlementDatabase + Send + Sync + 'static,
    G: PaymentGateway,
    S: JobScheduler,
{
    pub fn new(
        db: B,
        gateway: G,
        ledger: InvestmentLedgerApi<B>,
        aggregator: FundingAggregatorApi<B>,
        scheduler: S,
        dispute_window: Duration,
    ) -> Self {
        Self { db, gateway, ledger, aggregator, scheduler, dispute_window }
    }

    /// Verifies, dedups and routes one raw webhook delivery.
    pub async fn process(&self, raw_payload: &[u8], signature_header: &str) -> Result<WebhookAck, WebhookError> {
        let event = self.gateway.verify_webhook(raw_payload, signature_header)?;
        trace!("🪝️ Verified webhook event {} ({})", event.id, event.event_type);
        if self.db.webhook_event_seen(&event.id).await? {
            debug!("🪝️ Event {} has been processed before. Acknowledging without effect", event.id);
            return Ok(WebhookAck::Duplicate);
        }
        let event_id = event.id.clone();
        let event_type = event.event_type.to_string();
        let ack = self.route(event).await?;
        if !self.db.record_webhook_event(&event_id, &event_type).await? {
            // A concurrent delivery routed the same event first. The ledger's idempotence has
            // already made the second application a no-op.
            debug!("🪝️ Event {event_id} was claimed by a concurrent delivery");
            return Ok(WebhookAck::Duplicate);
        }
        Ok(ack)
    }

    async fn route(&self, event: WebhookEvent) -> Result<WebhookAck, WebhookError> {
        match event.event_type {
            WebhookEventType::CheckoutCompleted => self.on_checkout_completed(event).await,
            WebhookEventType::PaymentSucceeded => self.on_payment_succeeded(event).await,
            WebhookEventType::PaymentFailed => self.on_payment_failed(event).await,
            WebhookEventType::Unknown => {
                info!("🪝️ Ignoring webhook event {} of unhandled type", event.id);
                Ok(WebhookAck::Ignored)
            },
        }
    }

    /// The investor finished checkout. Confirmation runs on the job queue so the webhook response
    /// stays fast and a transient store failure gets the retry policy rather than a gateway 5xx.
    async fn on_checkout_completed(&self, event: WebhookEvent) -> Result<WebhookAck, WebhookError> {
        let external_ref = event
            .external_ref
            .clone()
            .ok_or_else(|| WebhookError::Malformed(format!("event {} has no session reference", event.id)))?;
        let Some(investment) = self.resolve_investment(&event).await? else {
            warn!("🪝️ Event {} refers to an unknown pledge (session {external_ref}). Ignoring", event.id);
            return Ok(WebhookAck::Ignored);
        };
        self.scheduler.enqueue(Job::ProcessInvestment { investment_id: investment.id, external_ref, attempt: 1 });
        Ok(WebhookAck::Accepted)
    }

    /// The charge settled. Applied inline; the confirm is a single guarded write.
    async fn on_payment_succeeded(&self, event: WebhookEvent) -> Result<WebhookAck, WebhookError> {
        let external_ref = event
            .external_ref
            .clone()
            .ok_or_else(|| WebhookError::Malformed(format!("event {} has no session reference", event.id)))?;
        let Some(investment) = self.resolve_investment(&event).await? else {
            warn!("🪝️ Event {} refers to an unknown pledge (session {external_ref}). Ignoring", event.id);
            return Ok(WebhookAck::Ignored);
        };
        match self.ledger.confirm(investment.id, &external_ref).await {
            Ok((investment, applied)) => {
                if applied {
                    if let Some(project) = self.aggregator.advance_status_if_funded(investment.project_id).await? {
                        self.scheduler.enqueue_after(
                            Job::SettleEscrow { project_id: project.id, attempt: 1 },
                            self.dispute_window,
                        );
                    }
                }
                Ok(WebhookAck::Accepted)
            },
            Err(SettlementError::InvalidStateTransition(msg)) => {
                warn!("🪝️ Event {} rejected by the investment state machine: {msg}", event.id);
                Ok(WebhookAck::Ignored)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn on_payment_failed(&self, event: WebhookEvent) -> Result<WebhookAck, WebhookError> {
        let Some(investment) = self.resolve_investment(&event).await? else {
            warn!("🪝️ Failure event {} refers to an unknown pledge. Ignoring", event.id);
            return Ok(WebhookAck::Ignored);
        };
        let reason = event.failure_reason.as_deref().unwrap_or("Payment failed");
        match self.ledger.fail(investment.id, reason).await {
            Ok(_) => Ok(WebhookAck::Accepted),
            Err(SettlementError::InvalidStateTransition(msg)) => {
                warn!("🪝️ Event {} rejected by the investment state machine: {msg}", event.id);
                Ok(WebhookAck::Ignored)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_investment(&self, event: &WebhookEvent) -> Result<Option<Investment>, SettlementError> {
        if let Some(id) = event.investment_id {
            if let Some(investment) = self.db.fetch_investment(id).await? {
                return Ok(Some(investment));
            }
        }
        match &event.external_ref {
            Some(external_ref) => self.db.fetch_investment_by_external_ref(external_ref).await,
            None => Ok(None),
        }
    }
}
