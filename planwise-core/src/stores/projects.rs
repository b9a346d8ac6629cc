//! Project collection

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{NewProject, Priority, Project, ProjectPatch, ProjectStatus};

use super::entity::{Entity, EntityStore};

impl Entity for Project {
    type Status = ProjectStatus;
    type Draft = NewProject;
    type Patch = ProjectPatch;

    const RESOURCE: &'static str = "projects";
    const KIND: &'static str = "project";

    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.name
    }
    fn status(&self) -> ProjectStatus {
        self.status
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn priority(&self) -> Option<Priority> {
        Some(self.priority)
    }
    fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }
    fn order(&self) -> i64 {
        self.order
    }
    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

pub type ProjectStore = EntityStore<Project>;

impl EntityStore<Project> {
    pub async fn archive(&self, id: &str) -> Result<Project> {
        self.transition(id, "archive").await
    }

    pub async fn unarchive(&self, id: &str) -> Result<Project> {
        self.transition(id, "unarchive").await
    }

    pub async fn complete(&self, id: &str) -> Result<Project> {
        self.transition(id, "complete").await
    }

    /// Projects not completed or archived
    pub fn active(&self) -> Vec<Project> {
        self.items()
            .into_iter()
            .filter(|p| matches!(p.status, ProjectStatus::Active | ProjectStatus::OnHold))
            .collect()
    }
}
