use actix_web::{http::StatusCode, test::TestRequest};
use funding_engine::{events::EventProducers, FundingAggregatorApi, FundingRead, InvestmentLedgerApi, SettlementDatabase};
use serde_json::{json, Value};

use super::helpers::{published_project, send, test_db};
use crate::data_objects::PledgeResponse;

#[actix_web::test]
async fn health_check() {
    let db = test_db().await;
    let (status, body) = send(&db, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn create_pledge_opens_a_payment_session() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let req = TestRequest::post().uri("/api/pledges").set_json(json!({
        "user_id": 1, "project_id": project.id, "amount": 50_00, "payment_method": "CardGateway"
    }));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK);
    let response: PledgeResponse = serde_json::from_str(&body).expect("Response should deserialize");
    assert!(response.payment.external_ref.starts_with("cs_"));
    assert!(response.payment.redirect_url.is_some());
    // The session reference is already on the ledger record.
    assert_eq!(response.investment.external_ref.as_deref(), Some(response.payment.external_ref.as_str()));
}

#[actix_web::test]
async fn bank_transfer_pledges_have_no_redirect() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let req = TestRequest::post().uri("/api/pledges").set_json(json!({
        "user_id": 1, "project_id": project.id, "amount": 50_00, "payment_method": "BankTransfer"
    }));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK);
    let response: PledgeResponse = serde_json::from_str(&body).unwrap();
    assert!(response.payment.external_ref.starts_with("bank_"));
    assert!(response.payment.redirect_url.is_none());
}

#[actix_web::test]
async fn zero_amount_pledges_are_rejected() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let req = TestRequest::post().uri("/api/pledges").set_json(json!({
        "user_id": 1, "project_id": project.id, "amount": 0, "payment_method": "CardGateway"
    }));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn pledges_to_unknown_projects_are_404() {
    let db = test_db().await;
    let req = TestRequest::post().uri("/api/pledges").set_json(json!({
        "user_id": 1, "project_id": 999, "amount": 10_00, "payment_method": "CardGateway"
    }));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn funding_snapshot_reflects_confirmed_pledges() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let p1 = ledger
        .create_pledge(funding_engine::db_types::NewInvestment::new(
            1,
            project.id,
            fsp_common::Cents::from_dollars(600),
            funding_engine::db_types::PaymentMethod::CardGateway,
        ))
        .await
        .unwrap();
    ledger.confirm(p1.id, "cs_1").await.unwrap();

    let (status, body) = send(&db, TestRequest::get().uri(&format!("/api/projects/{}/funding", project.id))).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["snapshot"]["total_raised"], 60_000);
    assert_eq!(response["snapshot"]["percentage"], 60.0);
    assert_eq!(response["snapshot"]["fully_funded"], false);
    assert_eq!(response["project_status"], "Published");
}

#[actix_web::test]
async fn refunding_a_pending_pledge_conflicts() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger
        .create_pledge(funding_engine::db_types::NewInvestment::new(
            1,
            project.id,
            fsp_common::Cents::from_dollars(100),
            funding_engine::db_types::PaymentMethod::CardGateway,
        ))
        .await
        .unwrap();

    let (status, _) = send(&db, TestRequest::post().uri(&format!("/api/investments/{}/refund", pledge.id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, funding_engine::db_types::InvestmentStatus::Pending);
}

#[actix_web::test]
async fn refund_reverts_funding_and_marks_refunded() {
    let db = test_db().await;
    let project = published_project(&db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let aggregator = FundingAggregatorApi::new(db.clone());
    let pledge = ledger
        .create_pledge(funding_engine::db_types::NewInvestment::new(
            1,
            project.id,
            fsp_common::Cents::from_dollars(1000),
            funding_engine::db_types::PaymentMethod::CardGateway,
        ))
        .await
        .unwrap();
    db.attach_external_ref(pledge.id, "cs_refund").await.unwrap();
    ledger.confirm(pledge.id, "cs_refund").await.unwrap();
    aggregator.advance_status_if_funded(project.id).await.unwrap().expect("Project should be Funded");

    let (status, _) = send(&db, TestRequest::post().uri(&format!("/api/investments/{}/refund", pledge.id))).await;
    assert_eq!(status, StatusCode::OK);
    let investment = db.fetch_investment(pledge.id).await.unwrap().unwrap();
    assert_eq!(investment.status, funding_engine::db_types::InvestmentStatus::Refunded);
    // The funding status was recomputed: the project dropped back below goal.
    let project = db.fetch_project(project.id).await.unwrap().unwrap();
    assert_eq!(project.status, funding_engine::db_types::ProjectStatus::Published);
}

#[actix_web::test]
async fn draft_projects_cannot_take_pledges() {
    let db = test_db().await;
    let api = funding_engine::ProjectApi::new(db.clone());
    let draft = api
        .create_project(funding_engine::db_types::NewProject::new(
            "Unpublished",
            fsp_common::Cents::from_dollars(500),
            chrono::Utc::now() + chrono::Duration::days(10),
        ))
        .await
        .unwrap();
    let req = TestRequest::post().uri("/api/pledges").set_json(json!({
        "user_id": 1, "project_id": draft.id, "amount": 10_00, "payment_method": "CardGateway"
    }));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
