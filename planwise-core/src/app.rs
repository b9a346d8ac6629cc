//! Application context
//!
//! Builds the transport, credential store, gateway and every store once.
//! UIs hold one [`AppContext`] for the life of the process.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::{Gateway, HttpTransport};
use crate::auth::{CredentialStore, Session};
use crate::config::Config;
use crate::dashboard::DashboardSummary;
use crate::error::Result;
use crate::storage::{FileCache, FileSecretStore, KeyValueCache, SecretStore};
use crate::stores::{
    AlarmStore, GoalStore, ProfileStore, ProjectStore, RoutineStore, TaskStore, TimerStore,
};

pub struct AppContext {
    config: Config,
    credentials: Arc<CredentialStore>,
    gateway: Arc<Gateway>,
    tasks: TaskStore,
    goals: GoalStore,
    projects: ProjectStore,
    routines: RoutineStore,
    alarms: AlarmStore,
    timers: TimerStore,
    profile: ProfileStore,
}

impl AppContext {
    pub fn new(
        config: Config,
        secrets: Arc<dyn SecretStore>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(&config.api)?;
        let credentials = Arc::new(CredentialStore::new(transport.clone(), secrets));
        let gateway = Arc::new(Gateway::new(transport, credentials.clone()));

        tracing::debug!(base_url = %config.api.base_url, "Application context ready");

        Ok(Self {
            tasks: TaskStore::with_cache(gateway.clone(), cache.clone()),
            goals: GoalStore::with_cache(gateway.clone(), cache.clone()),
            projects: ProjectStore::with_cache(gateway.clone(), cache.clone()),
            routines: RoutineStore::with_cache(gateway.clone(), cache.clone()),
            alarms: AlarmStore::with_cache(gateway.clone(), cache.clone()),
            timers: TimerStore::new(gateway.clone(), cache, config.timers.clone()),
            profile: ProfileStore::new(gateway.clone()),
            credentials,
            gateway,
            config,
        })
    }

    /// Context backed by the credentials file and cache directory named in
    /// `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let secrets = Arc::new(FileSecretStore::new(config.secrets_path()));
        let cache = Arc::new(FileCache::new(config.cache_dir()));
        Self::new(config, secrets, cache)
    }

    /// Resolve the stored session and bring back persisted timers
    pub async fn initialize(&self) -> Session {
        if let Err(e) = self.timers.restore() {
            tracing::warn!(error = %e, "Failed to restore timers");
        }
        self.credentials.initialize_auth().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn goals(&self) -> &GoalStore {
        &self.goals
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn routines(&self) -> &RoutineStore {
        &self.routines
    }

    pub fn alarms(&self) -> &AlarmStore {
        &self.alarms
    }

    pub fn timers(&self) -> &TimerStore {
        &self.timers
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    /// Summary over whatever tasks and goals are loaded
    pub fn dashboard(&self, today: NaiveDate) -> DashboardSummary {
        DashboardSummary::compute(&self.tasks.items(), &self.goals.items(), today)
    }

    /// Page size for list requests
    pub fn page_size(&self) -> u32 {
        self.config.api.page_size
    }
}
