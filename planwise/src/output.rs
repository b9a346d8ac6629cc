//! Terminal formatting for tasks, goals, projects and timers.

use chrono::{DateTime, NaiveDate, Utc};
use planwise_core::{Goal, Project, Task, TaskStatus, Timer, TimerPhase};
use serde::Serialize;

/// Print `value` as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Due date relative to `today` ("today", "in 3d", "2d late")
pub fn format_due(due: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(due) = due else {
        return "-".to_string();
    };
    match (due - today).num_days() {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        -1 => "yesterday".to_string(),
        days @ 2..=13 => format!("in {}d", days),
        days @ -13..=-2 => format!("{}d late", -days),
        _ => due.format("%Y-%m-%d").to_string(),
    }
}

fn status_mark(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Done => "[x]",
        TaskStatus::Archived => "[-]",
    }
}

pub fn task_line(task: &Task, today: NaiveDate) -> String {
    let late = if task.is_overdue(today) { " !" } else { "" };
    format!(
        "{} {:<10} {:<7} {:<10} {}{}",
        status_mark(task.status),
        task.id,
        task.priority.as_str().to_lowercase(),
        format_due(task.due_date, today),
        task.title,
        late
    )
}

/// Ten-character progress bar for 0-100
pub fn progress_bar(progress: u8) -> String {
    let filled = usize::from(progress.min(100)) / 10;
    format!("[{}{}] {:>3}%", "#".repeat(filled), ".".repeat(10 - filled), progress)
}

pub fn goal_line(goal: &Goal) -> String {
    let done = goal
        .milestones
        .iter()
        .filter(|m| m.status == planwise_core::MilestoneStatus::Done)
        .count();
    format!(
        "{:<10} {} {:?} {} ({}/{} milestones)",
        goal.id,
        progress_bar(goal.progress),
        goal.status,
        goal.title,
        done,
        goal.milestones.len()
    )
}

pub fn project_line(project: &Project, now: DateTime<Utc>) -> String {
    format!(
        "{:<10} {:<10} {} (updated {})",
        project.id,
        format!("{:?}", project.status).to_lowercase(),
        project.name,
        format_relative_time(project.updated_at, now)
    )
}

pub fn timer_line(timer: &Timer) -> String {
    let phase = match timer.phase() {
        TimerPhase::Idle => "idle",
        TimerPhase::Running => "running",
        TimerPhase::Paused => "paused",
        TimerPhase::Completed => "done",
    };
    let sync = if timer.is_local() { " (not synced)" } else { "" };
    format!(
        "{:<10} {:>8} {:<8} {}{}",
        timer.id,
        timer.remaining_display(),
        phase,
        timer.title,
        sync
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let at = |secs: i64| now - chrono::Duration::seconds(secs);

        assert_eq!(format_relative_time(at(-5), now), "just now");
        assert_eq!(format_relative_time(at(42), now), "42s ago");
        assert_eq!(format_relative_time(at(5 * 60), now), "5m ago");
        assert_eq!(format_relative_time(at(3 * 3600), now), "3h ago");
        assert_eq!(format_relative_time(at(2 * 86400), now), "2d ago");
        assert_eq!(format_relative_time(at(30 * 86400), now), "Sep 18");
    }

    #[test]
    fn test_due_dates() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let day = |d: u32| NaiveDate::from_ymd_opt(2026, 10, d);

        assert_eq!(format_due(None, today), "-");
        assert_eq!(format_due(day(18), today), "today");
        assert_eq!(format_due(day(19), today), "tomorrow");
        assert_eq!(format_due(day(17), today), "yesterday");
        assert_eq!(format_due(day(21), today), "in 3d");
        assert_eq!(format_due(day(14), today), "4d late");
        assert_eq!(format_due(day(31), today), "in 13d");
        assert_eq!(format_due(NaiveDate::from_ymd_opt(2026, 11, 1), today), "2026-11-01");
        assert_eq!(format_due(day(4), today), "2026-10-04");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "[..........]   0%");
        assert_eq!(progress_bar(55), "[#####.....]  55%");
        assert_eq!(progress_bar(100), "[##########] 100%");
    }
}
