use actix_web::{http::StatusCode, test::TestRequest};
use funding_engine::{
    db_types::InvestmentStatus,
    events::EventProducers,
    helpers::sign_payload,
    FundingRead,
    InvestmentLedgerApi,
    SettlementDatabase,
    SqliteDatabase,
};
use serde_json::json;

use super::helpers::{published_project, send, test_db, TEST_SECRET};
use crate::routes::SIGNATURE_HEADER;

async fn seeded_pledge(db: &SqliteDatabase) -> i64 {
    let project = published_project(db, 1000).await;
    let ledger = InvestmentLedgerApi::new(db.clone(), EventProducers::default());
    let pledge = ledger
        .create_pledge(funding_engine::db_types::NewInvestment::new(
            1,
            project.id,
            fsp_common::Cents::from_dollars(100),
            funding_engine::db_types::PaymentMethod::CardGateway,
        ))
        .await
        .expect("Error creating pledge");
    db.attach_external_ref(pledge.id, "cs_hook").await.expect("Error attaching reference");
    pledge.id
}

fn webhook_request(raw: &[u8], signature: &str) -> TestRequest {
    TestRequest::post()
        .uri("/webhook/payments")
        .insert_header((SIGNATURE_HEADER, signature))
        .set_payload(raw.to_vec())
}

#[actix_web::test]
async fn missing_signature_header_is_rejected() {
    let db = test_db().await;
    let req = TestRequest::post().uri("/webhook/payments").set_payload("{}");
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("x-payment-signature"));
}

#[actix_web::test]
async fn invalid_signature_is_rejected_without_side_effects() {
    let db = test_db().await;
    let pledge_id = seeded_pledge(&db).await;
    let raw =
        serde_json::to_vec(&json!({"id": "evt_1", "type": "payment-succeeded", "external_ref": "cs_hook"})).unwrap();
    let (status, _) = send(&db, webhook_request(&raw, "deadbeef")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let investment = db.fetch_investment(pledge_id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Pending);
}

#[actix_web::test]
async fn verified_event_confirms_the_pledge() {
    let db = test_db().await;
    let pledge_id = seeded_pledge(&db).await;
    let raw = serde_json::to_vec(&json!({
        "id": "evt_1", "type": "payment-succeeded", "investment_id": pledge_id, "external_ref": "cs_hook"
    }))
    .unwrap();
    let sig = sign_payload(&raw, TEST_SECRET);

    let (status, body) = send(&db, webhook_request(&raw, &sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("accepted"));
    let investment = db.fetch_investment(pledge_id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Confirmed);

    // Redelivery is acknowledged but changes nothing.
    let (status, body) = send(&db, webhook_request(&raw, &sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("already processed"));
}

#[actix_web::test]
async fn unknown_event_types_get_a_200() {
    let db = test_db().await;
    let raw = serde_json::to_vec(&json!({"id": "evt_1", "type": "customer-updated"})).unwrap();
    let sig = sign_payload(&raw, TEST_SECRET);
    let (status, _) = send(&db, webhook_request(&raw, &sig)).await;
    assert_eq!(status, StatusCode::OK);
}
