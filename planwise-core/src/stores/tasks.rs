//! Task collection

use chrono::{DateTime, NaiveDate, Utc};

use crate::api::ApiRequest;
use crate::error::Result;
use crate::types::{NewTask, Priority, Task, TaskPatch, TaskStatus};

use super::entity::{Entity, EntityStore};

impl Entity for Task {
    type Status = TaskStatus;
    type Draft = NewTask;
    type Patch = TaskPatch;

    const RESOURCE: &'static str = "tasks";
    const KIND: &'static str = "task";

    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> TaskStatus {
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

pub type TaskStore = EntityStore<Task>;

impl EntityStore<Task> {
    pub async fn complete(&self, id: &str) -> Result<Task> {
        self.transition(id, "complete").await
    }

    pub async fn uncomplete(&self, id: &str) -> Result<Task> {
        self.transition(id, "uncomplete").await
    }

    /// Complete an open task, or reopen a done one
    pub async fn toggle_complete(&self, id: &str) -> Result<Task> {
        self.require(id, "update")?;
        let done = self.get(id).is_some_and(|t| t.status == TaskStatus::Done);
        if done {
            self.uncomplete(id).await
        } else {
            self.complete(id).await
        }
    }

    /// Load the tasks of one project, replacing the collection on page 1
    pub async fn fetch_for_project(
        &self,
        project_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Task>> {
        let request = ApiRequest::get("/tasks")
            .query("projectId", project_id)
            .query("page", page)
            .query("limit", limit);
        self.fetch_page(request, page).await
    }

    pub fn due_on(&self, date: NaiveDate) -> Vec<Task> {
        self.items()
            .into_iter()
            .filter(|t| t.due_date == Some(date))
            .collect()
    }

    pub fn overdue(&self, today: NaiveDate) -> Vec<Task> {
        self.items()
            .into_iter()
            .filter(|t| t.is_overdue(today))
            .collect()
    }
}
