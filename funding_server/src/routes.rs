//! Request handlers for the funding settlement server.
//!
//! Handlers are generic over the backend and gateway; the server instantiates them against
//! `SqliteDatabase` and `HostedCheckout` when it registers the routes.
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use funding_engine::{
    api::objects::FundingSnapshot,
    db_types::InvestmentStatus,
    jobs::JobScheduler,
    reconciler::{WebhookAck, WebhookError, WebhookReconciler},
    FundingAggregatorApi,
    FundingRead,
    InvestmentLedgerApi,
    PaymentGateway,
    ProjectApi,
    SettlementDatabase,
};
use log::*;

use crate::{
    data_objects::{FundingResponse, JsonResponse, NewPledgeRequest, NewProjectRequest, PledgeResponse},
    errors::ServerError,
};

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

pub async fn create_project<B: SettlementDatabase>(
    api: web::Data<ProjectApi<B>>,
    body: web::Json<NewProjectRequest>,
) -> Result<HttpResponse, ServerError> {
    let project = api.create_project(body.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(project))
}

pub async fn publish_project<B: SettlementDatabase>(
    api: web::Data<ProjectApi<B>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let project = api.publish_project(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// The recomputed funding snapshot for a project. Always derived from confirmed investments at
/// request time.
pub async fn project_funding<B: SettlementDatabase>(
    aggregator: web::Data<FundingAggregatorApi<B>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let project_id = path.into_inner();
    let project = aggregator
        .fetch_project(project_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Project {project_id} does not exist")))?;
    let snapshot: FundingSnapshot = aggregator.funding_snapshot(project_id).await?;
    Ok(HttpResponse::Ok().json(FundingResponse {
        snapshot,
        project_status: project.status.to_string(),
        currency: fsp_common::SETTLEMENT_CURRENCY_CODE.to_string(),
    }))
}

/// Creates a pledge and opens a payment session for it. The gateway's session reference is
/// attached to the pledge before the response goes out, so a webhook racing the response can
/// still resolve the pledge.
pub async fn create_pledge<B: SettlementDatabase, G: PaymentGateway>(
    ledger: web::Data<InvestmentLedgerApi<B>>,
    gateway: web::Data<G>,
    body: web::Json<NewPledgeRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let project = ledger
        .db()
        .fetch_project(request.project_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Project {} does not exist", request.project_id)))?;
    let investment = ledger.create_pledge(request.into()).await?;
    let payment = gateway.open_payment_session(&investment, &project).await?;
    let investment = ledger.db().attach_external_ref(investment.id, &payment.external_ref).await?;
    debug!("💻️💰️ Pledge #{} created with session {}", investment.id, payment.external_ref);
    Ok(HttpResponse::Ok().json(PledgeResponse { investment, payment }))
}

/// Refunds a confirmed pledge in full and re-evaluates the project's funding status.
///
/// The gateway refund goes out before the ledger records `Refunded`: a gateway failure must
/// never leave the books claiming the investor was made whole when no refund was issued.
pub async fn refund_investment<B: SettlementDatabase, G: PaymentGateway>(
    ledger: web::Data<InvestmentLedgerApi<B>>,
    aggregator: web::Data<FundingAggregatorApi<B>>,
    gateway: web::Data<G>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let investment_id = path.into_inner();
    let investment = ledger
        .fetch_investment(investment_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Investment {investment_id} does not exist")))?;
    if investment.status != InvestmentStatus::Confirmed {
        return Err(ServerError::StateConflict(format!(
            "Investment {investment_id} is {} and cannot be refunded",
            investment.status
        )));
    }
    if let Some(external_ref) = &investment.external_ref {
        gateway.refund(external_ref).await?;
    }
    let investment = match ledger.refund(investment_id).await {
        Ok(investment) => investment,
        Err(e) => {
            error!("💻️🚨️ Gateway refund for investment #{investment_id} was issued but the ledger write failed: {e}");
            return Err(e.into());
        },
    };
    aggregator.recompute_after_refund(investment.project_id).await?;
    Ok(HttpResponse::Ok().json(investment))
}

/// The gateway webhook endpoint. Signature failures and unreadable payloads get a 400 with no
/// side effects; verified events are always acknowledged with a 200, even when they turn out to
/// be replays or no-ops, so the gateway stops redelivering them.
pub async fn payment_webhook<B, G, S>(
    reconciler: web::Data<WebhookReconciler<B, G, S>>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + Send + Sync + 'static,
    G: PaymentGateway + 'static,
    S: JobScheduler,
{
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::WebhookRejected(format!("Missing {SIGNATURE_HEADER} header")))?;
    match reconciler.process(&body, signature).await {
        Ok(ack) => {
            let message = match ack {
                WebhookAck::Accepted => "Event accepted",
                WebhookAck::Duplicate => "Event already processed",
                WebhookAck::Ignored => "Event acknowledged without effect",
            };
            Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
        },
        Err(e @ (WebhookError::Signature(_) | WebhookError::Malformed(_))) => {
            warn!("🪝️ Rejecting webhook delivery: {e}");
            Err(e.into())
        },
        Err(e) => {
            error!("🪝️ Webhook processing failed on the backend: {e}");
            Err(e.into())
        },
    }
}
