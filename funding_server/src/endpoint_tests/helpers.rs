use actix_web::{http::StatusCode, test, test::TestRequest, App};
use chrono::{Duration, Utc};
use fsp_common::{Cents, Secret};
use funding_engine::{
    db_types::{NewProject, Project},
    events::EventProducers,
    jobs::DelayedJobQueue,
    ProjectApi,
    SqliteDatabase,
};

use crate::{integrations::HostedCheckout, server::configure_app};

pub const TEST_SECRET: &str = "whsec_endpoint_test";

pub async fn test_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let path = std::env::temp_dir().join(format!("fsp_server_test_{}.db", rand::random::<u64>()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to test database");
    db.migrate().await.expect("Error running DB migrations");
    db
}

/// Mounts the full route table against the given database and executes one request.
pub async fn send(db: &SqliteDatabase, req: TestRequest) -> (StatusCode, String) {
    let db = db.clone();
    let gateway = HostedCheckout::new("https://pay.test", Secret::new(TEST_SECRET.to_string()));
    let (scheduler, _job_rx) = DelayedJobQueue::new(8);
    let app = App::new().configure(move |cfg| {
        configure_app(cfg, db, gateway, scheduler, EventProducers::default(), std::time::Duration::from_secs(3600))
    });
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub async fn published_project(db: &SqliteDatabase, goal_dollars: i64) -> Project {
    let api = ProjectApi::new(db.clone());
    let project = api
        .create_project(NewProject::new(
            "Endpoint test project",
            Cents::from_dollars(goal_dollars),
            Utc::now() + Duration::days(30),
        ))
        .await
        .expect("Error creating project");
    api.publish_project(project.id).await.expect("Error publishing project")
}
