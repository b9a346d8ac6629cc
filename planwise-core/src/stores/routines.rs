//! Routine collection

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{NewRoutine, Routine, RoutinePatch, RoutineStatus};

use super::entity::{Entity, EntityStore};

impl Entity for Routine {
    type Status = RoutineStatus;
    type Draft = NewRoutine;
    type Patch = RoutinePatch;

    const RESOURCE: &'static str = "routines";
    const KIND: &'static str = "routine";

    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> RoutineStatus {
        self.status
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
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

pub type RoutineStore = EntityStore<Routine>;

impl EntityStore<Routine> {
    /// Check in for today; the server answers with the updated streak
    pub async fn complete(&self, id: &str) -> Result<Routine> {
        self.transition(id, "complete").await
    }

    pub async fn pause(&self, id: &str) -> Result<Routine> {
        self.transition(id, "pause").await
    }

    pub async fn resume(&self, id: &str) -> Result<Routine> {
        self.transition(id, "resume").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::test_support::{gateway, ok};
    use crate::types::Frequency;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer};

    fn routine_json(status: &str, streak: u32) -> Value {
        json!({
            "id": "r1",
            "title": "Stretch",
            "frequency": "DAILY",
            "status": status,
            "streak": streak,
            "createdAt": "2026-09-01T00:00:00Z",
            "updatedAt": "2026-09-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_check_in_and_pause() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/routines"))
            .respond_with(ok(json!([routine_json("ACTIVE", 3)])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/routines/r1/complete"))
            .respond_with(ok(routine_json("ACTIVE", 4)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/routines/r1/pause"))
            .respond_with(ok(routine_json("PAUSED", 4)))
            .expect(1)
            .mount(&server)
            .await;

        let store = RoutineStore::new(gateway(&server));
        store.fetch_all(1, 20).await.unwrap();
        assert_eq!(store.get("r1").unwrap().frequency, Frequency::Daily);

        assert_eq!(store.complete("r1").await.unwrap().streak, 4);
        store.pause("r1").await.unwrap();

        store.set_status_filter([RoutineStatus::Active]);
        assert!(store.view().is_empty());
    }
}
