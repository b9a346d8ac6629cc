//! Goal collection and milestone operations
//!
//! Milestones live inside their goal. Every confirmed milestone change
//! recomputes the goal's progress locally, so the view is current without a
//! refetch.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use crate::api::entity_path;
use crate::api::ApiRequest;
use crate::error::{Error, Result};
use crate::types::{Goal, GoalPatch, GoalStatus, Milestone, NewGoal, NewMilestone, Priority, Validate};

use super::entity::{Entity, EntityStore};

impl Entity for Goal {
    type Status = GoalStatus;
    type Draft = NewGoal;
    type Patch = GoalPatch;

    const RESOURCE: &'static str = "goals";
    const KIND: &'static str = "goal";

    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> GoalStatus {
        self.status
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn priority(&self) -> Option<Priority> {
        Some(self.priority)
    }
    fn due_date(&self) -> Option<NaiveDate> {
        self.target_date
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

pub type GoalStore = EntityStore<Goal>;

impl EntityStore<Goal> {
    pub async fn complete(&self, id: &str) -> Result<Goal> {
        self.transition(id, "complete").await
    }

    pub async fn pause(&self, id: &str) -> Result<Goal> {
        self.transition(id, "pause").await
    }

    pub async fn resume(&self, id: &str) -> Result<Goal> {
        self.transition(id, "resume").await
    }

    pub async fn cancel(&self, id: &str) -> Result<Goal> {
        self.transition(id, "cancel").await
    }

    /// Set progress directly (0-100)
    pub async fn set_progress(&self, id: &str, progress: u8) -> Result<Goal> {
        if progress > 100 {
            let subject = self.require(id, "update progress of")?;
            return Err(self.record(
                format!("Failed to update progress of {}", subject),
                Error::validation(format!("progress must be 0-100, got {}", progress)),
            ));
        }
        self.transition_with(id, "progress", "update progress of", &json!({ "progress": progress }))
            .await
    }

    pub async fn add_milestone(&self, goal_id: &str, draft: &NewMilestone) -> Result<Milestone> {
        let subject = self.require(goal_id, "add a milestone to")?;
        let notice = format!("Failed to add a milestone to {}", subject);
        if let Err(e) = draft.validate() {
            return Err(self.record(notice, e));
        }

        let request = match ApiRequest::post(entity_path("goals", goal_id, Some("milestones"))).json(draft) {
            Ok(request) => request,
            Err(e) => return Err(self.record(notice, e)),
        };

        match self.gateway().fetch::<Milestone>(&request).await {
            Ok(milestone) => {
                self.modify(goal_id, |goal| {
                    goal.milestones.push(milestone.clone());
                    goal.recompute_progress();
                });
                Ok(milestone)
            }
            Err(e) => Err(self.record(notice, e)),
        }
    }

    pub async fn complete_milestone(&self, goal_id: &str, milestone_id: &str) -> Result<Milestone> {
        self.milestone_transition(goal_id, milestone_id, "complete").await
    }

    pub async fn uncomplete_milestone(&self, goal_id: &str, milestone_id: &str) -> Result<Milestone> {
        self.milestone_transition(goal_id, milestone_id, "uncomplete").await
    }

    pub async fn remove_milestone(&self, goal_id: &str, milestone_id: &str) -> Result<()> {
        let title = self.require_milestone(goal_id, milestone_id, "delete")?;
        let request = ApiRequest::delete(entity_path("milestones", milestone_id, None));

        match self.gateway().execute(&request).await {
            Ok(()) => {
                self.modify(goal_id, |goal| {
                    goal.milestones.retain(|m| m.id != milestone_id);
                    goal.recompute_progress();
                });
                Ok(())
            }
            Err(e) => Err(self.record(format!("Failed to delete {}", title), e)),
        }
    }

    async fn milestone_transition(
        &self,
        goal_id: &str,
        milestone_id: &str,
        action: &str,
    ) -> Result<Milestone> {
        let title = self.require_milestone(goal_id, milestone_id, action)?;
        let request = ApiRequest::patch(entity_path("milestones", milestone_id, Some(action)));

        match self.gateway().fetch::<Milestone>(&request).await {
            Ok(milestone) => {
                self.modify(goal_id, |goal| {
                    if let Some(slot) = goal.milestones.iter_mut().find(|m| m.id == milestone.id) {
                        *slot = milestone.clone();
                    }
                    goal.recompute_progress();
                });
                Ok(milestone)
            }
            Err(e) => Err(self.record(format!("Failed to {} {}", action, title), e)),
        }
    }

    /// Title of a milestone known locally under `goal_id`
    fn require_milestone(&self, goal_id: &str, milestone_id: &str, verb: &str) -> Result<String> {
        self.require(goal_id, verb)?;
        let title = self
            .get(goal_id)
            .and_then(|goal| goal.milestone(milestone_id).map(|m| m.title.clone()));
        title.ok_or_else(|| {
            self.record(
                format!("Failed to {} milestone {}", verb, milestone_id),
                Error::not_found("milestone", milestone_id),
            )
        })
    }
}
