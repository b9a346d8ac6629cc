//! Dashboard summary for the home view.
//!
//! Computed from already-loaded tasks and goals; nothing here talks to the
//! backend.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{Goal, GoalStatus, Task, TaskStatus};

/// Days covered by the completion histogram
pub const HISTORY_DAYS: usize = 7;

/// Aggregate statistics for the home view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    // Tasks
    pub total_tasks: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub archived: usize,
    /// Open tasks due before today
    pub overdue: usize,
    /// Open tasks due today
    pub due_today: usize,
    /// Done over non-archived tasks, 0.0-1.0
    pub completion_rate: f64,

    // Goals
    pub active_goals: usize,
    /// Mean progress of active goals (0-100), 0 when there are none
    pub average_goal_progress: u8,

    // Completions per day (index 0 = oldest, 6 = today)
    pub daily_completions: [usize; HISTORY_DAYS],
    /// Consecutive days up to today with at least one completion
    pub current_streak: usize,
}

impl DashboardSummary {
    pub fn compute(tasks: &[Task], goals: &[Goal], today: NaiveDate) -> Self {
        let mut summary = Self {
            total_tasks: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            match task.status {
                TaskStatus::Todo => summary.todo += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Archived => summary.archived += 1,
            }
            if task.is_overdue(today) {
                summary.overdue += 1;
            }
            if task.status.is_open() && task.due_date == Some(today) {
                summary.due_today += 1;
            }
            if let Some(completed) = task.completed_at {
                let days_ago = (today - completed.date_naive()).num_days();
                if (0..HISTORY_DAYS as i64).contains(&days_ago) {
                    summary.daily_completions[HISTORY_DAYS - 1 - days_ago as usize] += 1;
                }
            }
        }

        let considered = summary.total_tasks - summary.archived;
        if considered > 0 {
            summary.completion_rate = summary.done as f64 / considered as f64;
        }

        let active: Vec<u32> = goals
            .iter()
            .filter(|g| g.status == GoalStatus::Active)
            .map(|g| u32::from(g.progress))
            .collect();
        summary.active_goals = active.len();
        if !active.is_empty() {
            let mean = active.iter().sum::<u32>() as f64 / active.len() as f64;
            summary.average_goal_progress = mean.round() as u8;
        }

        summary.current_streak = summary
            .daily_completions
            .iter()
            .rev()
            .take_while(|&&count| count > 0)
            .count();

        summary
    }

    /// Completion rate as a whole percentage
    pub fn completion_percent(&self) -> u8 {
        (self.completion_rate * 100.0).round() as u8
    }
}
