//! Alarm collection

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use crate::error::{Error, Result};
use crate::types::{Alarm, AlarmPatch, AlarmState, NewAlarm};

use super::entity::{Entity, EntityStore};

impl Entity for Alarm {
    type Status = AlarmState;
    type Draft = NewAlarm;
    type Patch = AlarmPatch;

    const RESOURCE: &'static str = "alarms";
    const KIND: &'static str = "alarm";

    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> AlarmState {
        self.state()
    }
    fn due_date(&self) -> Option<NaiveDate> {
        Some(self.time.date_naive())
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

pub type AlarmStore = EntityStore<Alarm>;

impl EntityStore<Alarm> {
    pub async fn toggle(&self, id: &str, enabled: bool) -> Result<Alarm> {
        let verb = if enabled { "enable" } else { "disable" };
        self.transition_with(id, "toggle", verb, &json!({ "enabled": enabled }))
            .await
    }

    /// Snooze a ringing alarm, refusing locally when no snooze is left
    pub async fn snooze(&self, id: &str) -> Result<Alarm> {
        let subject = self.require(id, "snooze")?;
        if let Some(alarm) = self.get(id) {
            if !alarm.can_snooze() {
                let reason = match alarm.snooze_config {
                    _ if !alarm.enabled => "alarm is disabled".to_string(),
                    None => "alarm has no snooze configured".to_string(),
                    Some(cfg) => format!("snooze limit of {} reached", cfg.max_snoozes),
                };
                return Err(self.record(
                    format!("Failed to snooze {}", subject),
                    Error::validation(reason),
                ));
            }
        }
        self.transition(id, "snooze").await
    }

    /// Enabled alarms ordered by next ring time
    pub fn upcoming(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self
            .items()
            .into_iter()
            .filter(|a| a.enabled)
            .collect();
        alarms.sort_by_key(|a| a.snoozed_until.unwrap_or(a.time));
        alarms
    }
}
