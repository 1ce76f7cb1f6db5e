use std::{net::SocketAddr, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use funding_engine::{
    events::{
        EscrowReleasedEvent,
        EventHandlers,
        EventHooks,
        EventProducers,
        InvestmentConfirmedEvent,
        InvestmentProcessingFailedEvent,
        SettlementDeadLetterEvent,
    },
    jobs::{DelayedJobQueue, Job, JobRunner},
    reconciler::WebhookReconciler,
    EscrowSettlementApi,
    FundingAggregatorApi,
    InvestmentLedgerApi,
    ProjectApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::HostedCheckout,
    routes::{
        create_pledge,
        create_project,
        health,
        payment_webhook,
        project_funding,
        publish_project,
        refund_investment,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = HostedCheckout::new(config.checkout_base_url.clone(), config.webhook_secret.clone());

    let handlers = EventHandlers::new(50, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let (scheduler, job_rx) = DelayedJobQueue::new(100);
    start_job_runner(db.clone(), scheduler.clone(), job_rx, producers.clone(), &config);

    let srv = create_server_instance(config, db, gateway, scheduler, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Registers the API surface and its shared state. Kept separate from [`create_server_instance`]
/// so tests can mount the exact same routes on an in-process service.
pub fn configure_app(
    cfg: &mut web::ServiceConfig,
    db: SqliteDatabase,
    gateway: HostedCheckout,
    scheduler: DelayedJobQueue,
    producers: EventProducers,
    dispute_window: Duration,
) {
    let ledger = InvestmentLedgerApi::new(db.clone(), producers.clone());
    let aggregator = FundingAggregatorApi::new(db.clone());
    let projects = ProjectApi::new(db.clone());
    let reconciler = WebhookReconciler::new(
        db,
        gateway.clone(),
        ledger.clone(),
        aggregator.clone(),
        scheduler,
        dispute_window,
    );
    cfg.app_data(web::Data::new(ledger))
        .app_data(web::Data::new(aggregator))
        .app_data(web::Data::new(projects))
        .app_data(web::Data::new(reconciler))
        .app_data(web::Data::new(gateway))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::scope("/api")
                .service(web::resource("/projects").route(web::post().to(create_project::<SqliteDatabase>)))
                .service(
                    web::resource("/projects/{id}/publish").route(web::post().to(publish_project::<SqliteDatabase>)),
                )
                .service(
                    web::resource("/projects/{id}/funding").route(web::get().to(project_funding::<SqliteDatabase>)),
                )
                .service(
                    web::resource("/pledges").route(web::post().to(create_pledge::<SqliteDatabase, HostedCheckout>)),
                )
                .service(
                    web::resource("/investments/{id}/refund")
                        .route(web::post().to(refund_investment::<SqliteDatabase, HostedCheckout>)),
                ),
        )
        .service(
            web::resource("/webhook/payments")
                .route(web::post().to(payment_webhook::<SqliteDatabase, HostedCheckout, DelayedJobQueue>)),
        );
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: HostedCheckout,
    scheduler: DelayedJobQueue,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let dispute_window = config.retry_policy.dispute_window;
    let srv = HttpServer::new(move || {
        let db = db.clone();
        let gateway = gateway.clone();
        let scheduler = scheduler.clone();
        let producers = producers.clone();
        App::new().wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("fsp::access_log")).configure(
            move |cfg| configure_app(cfg, db, gateway, scheduler, producers, dispute_window),
        )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(
        format!("{}:{}", config.host, config.port)
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))?,
    )?
    .run();
    Ok(srv)
}

/// Starts the background job runner. Do not await the returned handle, it runs for the life of
/// the process.
pub fn start_job_runner(
    db: SqliteDatabase,
    scheduler: DelayedJobQueue,
    jobs: tokio::sync::mpsc::Receiver<Job>,
    producers: EventProducers,
    config: &ServerConfig,
) -> tokio::task::JoinHandle<()> {
    let ledger = InvestmentLedgerApi::new(db.clone(), producers.clone());
    let aggregator = FundingAggregatorApi::new(db.clone());
    let settlement = EscrowSettlementApi::new(db, producers.clone(), config.platform_fee_bps);
    let runner = JobRunner::new(ledger, aggregator, settlement, scheduler, config.retry_policy.clone(), producers);
    tokio::spawn(runner.run(jobs))
}

/// The default notification side effects: structured log lines standing in for the mailer and
/// the operations alert channel.
fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_investment_confirmed(|ev: InvestmentConfirmedEvent| {
        Box::pin(async move {
            info!(
                "📬️ Investment #{} confirmed: {} toward project #{}",
                ev.investment.id, ev.investment.amount, ev.investment.project_id
            );
        })
    });
    hooks.on_investment_failed(|ev: InvestmentProcessingFailedEvent| {
        Box::pin(async move {
            warn!("📬️ Investment #{} failed permanently: {}", ev.investment.id, ev.reason);
        })
    });
    hooks.on_escrow_released(|ev: EscrowReleasedEvent| {
        Box::pin(async move {
            info!(
                "📬️ Escrow released for project #{} \"{}\": {} total, {} fee, {} paid out",
                ev.project.id, ev.project.title, ev.total, ev.platform_fee, ev.net
            );
        })
    });
    hooks.on_settlement_dead_letter(|ev: SettlementDeadLetterEvent| {
        Box::pin(async move {
            error!(
                "🚨️ Settlement for project #{} gave up after {} attempts: {}. Manual intervention required.",
                ev.project_id, ev.attempts, ev.error
            );
        })
    });
    hooks
}
