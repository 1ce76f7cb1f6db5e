pub mod prepare_env;

use chrono::{Duration, Utc};
use fsp_common::Cents;
use funding_engine::{
    db_types::{NewInvestment, NewProject, PaymentMethod, Project},
    ProjectApi,
    SqliteDatabase,
};

/// Creates and publishes a project with the given goal, deadline 30 days out.
pub async fn published_project(db: &SqliteDatabase, goal_dollars: i64) -> Project {
    let api = ProjectApi::new(db.clone());
    let project = api
        .create_project(NewProject::new("Test project", Cents::from_dollars(goal_dollars), Utc::now() + Duration::days(30)))
        .await
        .expect("Error creating project");
    api.publish_project(project.id).await.expect("Error publishing project")
}

pub fn card_pledge(user_id: i64, project_id: i64, dollars: i64) -> NewInvestment {
    NewInvestment::new(user_id, project_id, Cents::from_dollars(dollars), PaymentMethod::CardGateway)
}
