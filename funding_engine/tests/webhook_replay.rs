mod support;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use funding_engine::{
    api::objects::FundingSnapshot,
    db_types::{Investment, InvestmentStatus, NewInvestment, NewProject, Project, ProjectStatus},
    events::EventProducers,
    helpers::webhook_signature::sign_payload,
    jobs::{Job, JobScheduler},
    reconciler::{WebhookAck, WebhookError, WebhookReconciler},
    traits::{GatewayError, PaymentSession, RefundResult, SettlementOutcome, SignatureError, WebhookEvent},
    FundingAggregatorApi,
    FundingRead,
    InvestmentLedgerApi,
    PaymentGateway,
    SettlementDatabase,
    SettlementError,
    SqliteDatabase,
};
use serde_json::json;
use support::{card_pledge, prepare_env::prepare_test_env, published_project};

const SECRET: &str = "whsec_test";
const DISPUTE_WINDOW: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone)]
struct TestGateway;

impl PaymentGateway for TestGateway {
    async fn open_payment_session(&self, investment: &Investment, _: &Project) -> Result<PaymentSession, GatewayError> {
        Ok(PaymentSession { external_ref: format!("cs_{}", investment.id), redirect_url: None })
    }

    fn verify_webhook(&self, raw_payload: &[u8], signature_header: &str) -> Result<WebhookEvent, SignatureError> {
        funding_engine::helpers::webhook_signature::verify_payload(raw_payload, signature_header, SECRET)?;
        serde_json::from_slice(raw_payload).map_err(|e| SignatureError::MalformedPayload(e.to_string()))
    }

    async fn refund(&self, external_ref: &str) -> Result<RefundResult, GatewayError> {
        Ok(RefundResult { refund_ref: format!("re_{external_ref}") })
    }
}

/// Scheduler double that records enqueued jobs instead of running them.
#[derive(Clone, Default)]
struct RecordingScheduler {
    jobs: Arc<Mutex<Vec<(Job, Option<Duration>)>>>,
}

impl RecordingScheduler {
    fn recorded(&self) -> Vec<(Job, Option<Duration>)> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobScheduler for RecordingScheduler {
    fn enqueue(&self, job: Job) {
        self.jobs.lock().unwrap().push((job, None));
    }

    fn enqueue_after(&self, job: Job, delay: Duration) {
        self.jobs.lock().unwrap().push((job, Some(delay)));
    }
}

/// Backend double that fails the first N confirms with a transient error, then delegates to the
/// real store.
#[derive(Clone)]
struct FlakyDb {
    inner: SqliteDatabase,
    confirm_failures: Arc<AtomicUsize>,
}

impl FlakyDb {
    fn failing_confirms(inner: SqliteDatabase, failures: usize) -> Self {
        Self { inner, confirm_failures: Arc::new(AtomicUsize::new(failures)) }
    }
}

impl FundingRead for FlakyDb {
    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        self.inner.fetch_project(project_id).await
    }

    async fn fetch_investment(&self, investment_id: i64) -> Result<Option<Investment>, SettlementError> {
        self.inner.fetch_investment(investment_id).await
    }

    async fn fetch_investment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Investment>, SettlementError> {
        self.inner.fetch_investment_by_external_ref(external_ref).await
    }

    async fn confirmed_investments(&self, project_id: i64) -> Result<Vec<Investment>, SettlementError> {
        self.inner.confirmed_investments(project_id).await
    }

    async fn funding_snapshot(&self, project_id: i64) -> Result<FundingSnapshot, SettlementError> {
        self.inner.funding_snapshot(project_id).await
    }
}

impl SettlementDatabase for FlakyDb {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, SettlementError> {
        self.inner.insert_project(project).await
    }

    async fn publish_project(&self, project_id: i64) -> Result<Project, SettlementError> {
        self.inner.publish_project(project_id).await
    }

    async fn insert_investment(
        &self,
        pledge: NewInvestment,
        external_ref: Option<&str>,
    ) -> Result<Investment, SettlementError> {
        self.inner.insert_investment(pledge, external_ref).await
    }

    async fn attach_external_ref(&self, investment_id: i64, external_ref: &str) -> Result<Investment, SettlementError> {
        self.inner.attach_external_ref(investment_id, external_ref).await
    }

    async fn confirm_investment(
        &self,
        investment_id: i64,
        external_ref: &str,
    ) -> Result<(Investment, bool), SettlementError> {
        let remaining = self.confirm_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.confirm_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SettlementError::DatabaseError("connection reset by peer".into()));
        }
        self.inner.confirm_investment(investment_id, external_ref).await
    }

    async fn cancel_investment(&self, investment_id: i64, reason: &str) -> Result<(Investment, bool), SettlementError> {
        self.inner.cancel_investment(investment_id, reason).await
    }

    async fn refund_investment(&self, investment_id: i64) -> Result<Investment, SettlementError> {
        self.inner.refund_investment(investment_id).await
    }

    async fn advance_project_if_funded(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        self.inner.advance_project_if_funded(project_id).await
    }

    async fn revert_funding_if_unreleased(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        self.inner.revert_funding_if_unreleased(project_id).await
    }

    async fn settle_escrow(&self, project_id: i64, fee_bps: i64) -> Result<SettlementOutcome, SettlementError> {
        self.inner.settle_escrow(project_id, fee_bps).await
    }

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, SettlementError> {
        self.inner.webhook_event_seen(event_id).await
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, SettlementError> {
        self.inner.record_webhook_event(event_id, event_type).await
    }
}

fn reconciler(
    db: &SqliteDatabase,
) -> (WebhookReconciler<SqliteDatabase, TestGateway, RecordingScheduler>, RecordingScheduler) {
    let scheduler = RecordingScheduler::default();
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let aggregator = FundingAggregatorApi::new(db.clone());
    let r = WebhookReconciler::new(db.clone(), TestGateway, ledger, aggregator, scheduler.clone(), DISPUTE_WINDOW);
    (r, scheduler)
}

fn signed(payload: &serde_json::Value) -> (Vec<u8>, String) {
    let raw = serde_json::to_vec(payload).unwrap();
    let sig = sign_payload(&raw, SECRET);
    (raw, sig)
}

#[tokio::test]
async fn replayed_event_id_is_acknowledged_without_effect() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, _) = reconciler(&db);
    let payload = json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"});
    let (raw, sig) = signed(&payload);

    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Accepted);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Confirmed);
    let confirmed_at = investment.confirmed_at;

    // Redelivery of the exact same event.
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Duplicate);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.confirmed_at, confirmed_at);
}

#[tokio::test]
async fn redelivery_after_transient_store_failure_still_confirms() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let flaky = FlakyDb::failing_confirms(db.clone(), 1);
    let r = WebhookReconciler::new(
        flaky.clone(),
        TestGateway,
        InvestmentLedgerApi::new(flaky.clone(), EventProducers::default()),
        FundingAggregatorApi::new(flaky.clone()),
        RecordingScheduler::default(),
        DISPUTE_WINDOW,
    );
    let (raw, sig) =
        signed(&json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"}));

    // The first delivery dies on a transient store error. 5xx, so the gateway redelivers.
    let err = r.process(&raw, &sig).await.unwrap_err();
    assert!(matches!(err, WebhookError::Engine(SettlementError::DatabaseError(_))));
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Pending);

    // The failed delivery must not have claimed the event id; the redelivery applies in full.
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Accepted);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Confirmed);

    // And only now does dedup treat further deliveries as replays.
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Duplicate);
}

#[tokio::test]
async fn distinct_event_for_confirmed_pledge_is_a_no_op() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, _) = reconciler(&db);
    let (raw, sig) =
        signed(&json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"}));
    r.process(&raw, &sig).await.unwrap();

    // A different event id, so dedup does not catch it. The ledger's idempotence does.
    let (raw, sig) =
        signed(&json!({"id": "evt_2", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"}));
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Accepted);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Confirmed);
}

#[tokio::test]
async fn failure_after_confirmation_is_ignored() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, _) = reconciler(&db);
    let (raw, sig) =
        signed(&json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"}));
    r.process(&raw, &sig).await.unwrap();

    let (raw, sig) = signed(&json!({
        "id": "evt_2", "type": "payment-failed", "investment_id": pledge.id,
        "external_ref": "cs_100", "failure_reason": "card declined"
    }));
    r.process(&raw, &sig).await.unwrap();
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Confirmed);
    assert!(investment.failure_reason.is_none());
}

#[tokio::test]
async fn bad_signature_has_no_side_effects() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, scheduler) = reconciler(&db);
    let payload = json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"});
    let raw = serde_json::to_vec(&payload).unwrap();

    let err = r.process(&raw, "deadbeef").await.unwrap_err();
    assert!(matches!(err, WebhookError::Signature(_)));
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Pending);
    assert!(scheduler.recorded().is_empty());

    // The event id was never claimed, so a later legitimate delivery still applies.
    let sig = sign_payload(&raw, SECRET);
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Accepted);
}

#[tokio::test]
async fn full_funding_schedules_settlement_after_dispute_window() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 1000)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, scheduler) = reconciler(&db);
    let (raw, sig) =
        signed(&json!({"id": "evt_1", "type": "payment-succeeded", "investment_id": pledge.id, "external_ref": "cs_100"}));
    r.process(&raw, &sig).await.unwrap();

    let project = db.fetch_project(project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Funded);
    let jobs = scheduler.recorded();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, Job::SettleEscrow { project_id: project.id, attempt: 1 });
    assert_eq!(jobs[0].1, Some(DISPUTE_WINDOW));
}

#[tokio::test]
async fn checkout_completed_enqueues_processing_job() {
    let db = prepare_test_env().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger.create_pledge(card_pledge(1, project.id, 100)).await.unwrap();
    db.attach_external_ref(pledge.id, "cs_100").await.unwrap();

    let (r, scheduler) = reconciler(&db);
    let (raw, sig) = signed(&json!({"id": "evt_1", "type": "checkout-completed", "external_ref": "cs_100"}));
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Accepted);

    // Confirmation happens on the job queue, not inline.
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Pending);
    let jobs = scheduler.recorded();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, Job::ProcessInvestment {
        investment_id: pledge.id,
        external_ref: "cs_100".into(),
        attempt: 1
    });
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let db = prepare_test_env().await;
    let (r, scheduler) = reconciler(&db);
    let (raw, sig) = signed(&json!({"id": "evt_1", "type": "customer-updated"}));
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Ignored);
    assert!(scheduler.recorded().is_empty());
}

#[tokio::test]
async fn events_for_unknown_pledges_are_acknowledged() {
    let db = prepare_test_env().await;
    let (r, _) = reconciler(&db);
    let (raw, sig) = signed(&json!({"id": "evt_1", "type": "payment-succeeded", "external_ref": "cs_missing"}));
    assert_eq!(r.process(&raw, &sig).await.unwrap(), WebhookAck::Ignored);
}
