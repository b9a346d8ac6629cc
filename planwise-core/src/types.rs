//! Core domain types for planwise
//!
//! These types mirror the JSON documents exchanged with the backend. Field
//! names are camelCase on the wire and enum values SCREAMING_SNAKE_CASE.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Task** | A unit of work with a status, priority and optional due date |
//! | **Goal** | A longer-running objective tracked through Milestones |
//! | **Milestone** | A checkpoint owned by exactly one Goal |
//! | **Project** | A grouping of Tasks |
//! | **Routine** | A recurring habit with a check-in streak |
//! | **Alarm** | A wall-clock reminder with optional recurrence and snooze |
//! | **Timer** | A local countdown; at most one runs at a time |
//!
//! Types prefixed `New` are creation payloads and types suffixed `Patch`
//! are partial updates; both validate themselves before any network call.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Payloads that can be checked locally before they are sent.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn optional_text(field: &str, value: Option<&String>) -> Result<()> {
    match value {
        Some(v) => require_text(field, v),
        None => Ok(()),
    }
}

// ============================================
// Shared enums
// ============================================

/// Priority shared by tasks, goals and projects (ordered low to urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// User
// ============================================

/// The authenticated account as returned by `GET /me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial profile update for `PUT /me`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Validate for ProfilePatch {
    fn validate(&self) -> Result<()> {
        optional_text("name", self.name.as_ref())
    }
}

// ============================================
// Task
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
            TaskStatus::Archived => "ARCHIVED",
        }
    }

    /// Whether the task still needs attention
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Wall-clock time of day, `HH:MM`
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Manual sort position
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Open task whose due date lies before `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.due_date.is_some_and(|due| due < today)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

fn validate_due_time(value: Option<&String>) -> Result<()> {
    let Some(time) = value else {
        return Ok(());
    };
    chrono::NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| Error::validation(format!("dueTime must be HH:MM, got {:?}", time)))
}

impl Validate for NewTask {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        validate_due_time(self.due_time.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl Validate for TaskPatch {
    fn validate(&self) -> Result<()> {
        optional_text("title", self.title.as_ref())?;
        validate_due_time(self.due_time.as_ref())
    }
}

// ============================================
// Goal & Milestone
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    Draft,
    Active,
    Paused,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    pub status: MilestoneStatus,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: GoalStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// 0-100
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    /// Linked task ids
    #[serde(default)]
    pub tasks: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Recompute `progress` from milestone completion.
    ///
    /// Leaves `progress` untouched when the goal has no milestones, since it
    /// may then have been set directly.
    pub fn recompute_progress(&mut self) {
        let total = self.milestones.len();
        if total == 0 {
            return;
        }
        let done = self
            .milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Done)
            .count();
        self.progress = ((done as f64 / total as f64) * 100.0).round() as u8;
    }

    pub fn milestone(&self, milestone_id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == milestone_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl Validate for NewGoal {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("category", &self.category)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl Validate for GoalPatch {
    fn validate(&self) -> Result<()> {
        optional_text("title", self.title.as_ref())?;
        optional_text("category", self.category.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl Validate for NewMilestone {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)
    }
}

// ============================================
// Project
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Hex colour used by clients to tag the project
    #[serde(default)]
    pub color: Option<String>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

fn validate_color(value: Option<&String>) -> Result<()> {
    let Some(color) = value else {
        return Ok(());
    };
    let hex = color.strip_prefix('#').unwrap_or("");
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(format!(
            "color must be a hex value like #3366ff, got {:?}",
            color
        )));
    }
    Ok(())
}

impl Validate for NewProject {
    fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        validate_color(self.color.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Validate for ProjectPatch {
    fn validate(&self) -> Result<()> {
        optional_text("name", self.name.as_ref())?;
        validate_color(self.color.as_ref())
    }
}

// ============================================
// Routine
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekdays,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutineStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday; used by `WEEKLY`
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    /// Wall-clock time of day, `HH:MM`
    #[serde(default)]
    pub time: Option<String>,
    pub status: RoutineStatus,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoutine {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

fn validate_days(frequency: Frequency, days: &[u8]) -> Result<()> {
    if let Some(day) = days.iter().find(|d| **d > 6) {
        return Err(Error::validation(format!(
            "daysOfWeek entries must be 0-6, got {}",
            day
        )));
    }
    if frequency == Frequency::Weekly && days.is_empty() {
        return Err(Error::validation(
            "a weekly routine needs at least one day of the week",
        ));
    }
    Ok(())
}

impl Validate for NewRoutine {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        validate_days(self.frequency, &self.days_of_week)?;
        validate_due_time(self.time.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutinePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl Validate for RoutinePatch {
    fn validate(&self) -> Result<()> {
        optional_text("title", self.title.as_ref())?;
        if let Some(days) = &self.days_of_week {
            validate_days(self.frequency.unwrap_or(Frequency::Daily), days)?;
        }
        validate_due_time(self.time.as_ref())
    }
}

// ============================================
// Alarm
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeConfig {
    pub duration_minutes: u32,
    pub max_snoozes: u32,
}

/// Derived alarm state used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Enabled,
    Snoozed,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub title: String,
    /// Next ring instant
    pub time: DateTime<Utc>,
    /// IANA timezone the alarm was set in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// iCalendar RRULE
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub snooze_config: Option<SnoozeConfig>,
    #[serde(default)]
    pub snooze_count: u32,
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Alarm {
    pub fn state(&self) -> AlarmState {
        if !self.enabled {
            AlarmState::Disabled
        } else if self.snoozed_until.is_some() {
            AlarmState::Snoozed
        } else {
            AlarmState::Enabled
        }
    }

    /// Whether another snooze is allowed
    pub fn can_snooze(&self) -> bool {
        self.enabled
            && self
                .snooze_config
                .is_some_and(|cfg| self.snooze_count < cfg.max_snoozes)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlarm {
    pub title: String,
    pub time: DateTime<Utc>,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_config: Option<SnoozeConfig>,
}

fn validate_snooze(config: Option<&SnoozeConfig>) -> Result<()> {
    if let Some(cfg) = config {
        if cfg.duration_minutes == 0 {
            return Err(Error::validation("snooze duration must be at least 1 minute"));
        }
    }
    Ok(())
}

impl Validate for NewAlarm {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("timezone", &self.timezone)?;
        validate_snooze(self.snooze_config.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_config: Option<SnoozeConfig>,
}

impl Validate for AlarmPatch {
    fn validate(&self) -> Result<()> {
        optional_text("title", self.title.as_ref())?;
        optional_text("timezone", self.timezone.as_ref())?;
        validate_snooze(self.snooze_config.as_ref())
    }
}

// ============================================
// Timer
// ============================================

/// Prefix marking a timer id that has not been assigned by the server yet
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Longest accepted timer, in minutes
pub const MAX_TIMER_MINUTES: u32 = 24 * 60;

/// Countdown state, derived from the timer's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    pub title: String,
    /// Original length in minutes
    pub duration: u32,
    /// Seconds left on the countdown
    pub remaining_time: u32,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Timer {
    /// A fresh, idle timer with a client-generated id
    pub fn new_local(title: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
            title: title.into(),
            duration: duration_minutes,
            remaining_time: duration_minutes.saturating_mul(60),
            is_running: false,
            is_paused: false,
            is_completed: false,
            task_id: None,
            updated_at: Some(Utc::now()),
        }
    }

    /// True while the id is client-generated
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    /// Saturates for server-sent durations that do not fit in seconds
    pub fn duration_secs(&self) -> u32 {
        self.duration.saturating_mul(60)
    }

    pub fn phase(&self) -> TimerPhase {
        if self.is_completed {
            TimerPhase::Completed
        } else if self.is_running {
            TimerPhase::Running
        } else if self.is_paused {
            TimerPhase::Paused
        } else {
            TimerPhase::Idle
        }
    }

    /// `MM:SS`, or `H:MM:SS` past the hour
    pub fn remaining_display(&self) -> String {
        let secs = self.remaining_time;
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            format!("{}:{:02}:{:02}", h, m, s)
        } else {
            format!("{:02}:{:02}", m, s)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTimer {
    pub title: String,
    pub duration_minutes: u32,
    pub task_id: Option<String>,
}

fn validate_duration(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes > MAX_TIMER_MINUTES {
        return Err(Error::validation(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_TIMER_MINUTES, minutes
        )));
    }
    Ok(())
}

impl Validate for NewTimer {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        validate_duration(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimerPatch {
    pub title: Option<String>,
    pub duration_minutes: Option<u32>,
}

impl Validate for TimerPatch {
    fn validate(&self) -> Result<()> {
        optional_text("title", self.title.as_ref())?;
        match self.duration_minutes {
            Some(minutes) => validate_duration(minutes),
            None => Ok(()),
        }
    }
}
