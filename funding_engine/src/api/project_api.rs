use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewProject, Project},
    traits::{SettlementDatabase, SettlementError},
};

/// Thin project lifecycle API: create drafts and publish them. Everything past `Published` is
/// driven by the aggregator and the settlement engine, not by callers.
pub struct ProjectApi<B> {
    db: B,
}

impl<B> Debug for ProjectApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectApi")
    }
}

impl<B: Clone> Clone for ProjectApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> ProjectApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ProjectApi<B>
where B: SettlementDatabase
{
    pub async fn create_project(&self, project: NewProject) -> Result<Project, SettlementError> {
        if !project.funding_goal.is_positive() {
            return Err(SettlementError::Validation(format!(
                "Funding goal must be positive, got {}",
                project.funding_goal
            )));
        }
        let project = self.db.insert_project(project).await?;
        debug!("🗃️ Project #{} \"{}\" created as {}", project.id, project.title, project.status);
        Ok(project)
    }

    pub async fn publish_project(&self, project_id: i64) -> Result<Project, SettlementError> {
        let project = self.db.publish_project(project_id).await?;
        info!("🗃️ Project #{} \"{}\" is now open for pledges until {}", project.id, project.title, project.funding_deadline);
        Ok(project)
    }
}
