//! Application state shared across the web surface and the scheduler.

use crate::alert::AlertController;
use crate::holiday::HolidayResolver;
use crate::scheduler::service::SchedulerHandle;
use crate::scheduler::{ConfigSnapshot, DEFAULT_LOOKAHEAD_LIMIT_DAYS};
use crate::status::ServiceStatusRegistry;
use crate::store::ConfigStore;
use crate::web::session_cache::SessionCache;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config_store: Arc<ConfigStore>,
    /// Read-only after load; a holiday/vacation refresh replaces the whole
    /// resolver atomically rather than mutating it in place.
    pub holiday_resolver: Arc<tokio::sync::RwLock<HolidayResolver>>,
    pub alert_controller: Arc<AlertController>,
    pub scheduler: SchedulerHandle,
    pub session_cache: SessionCache,
    pub service_statuses: ServiceStatusRegistry,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        config_store: Arc<ConfigStore>,
        holiday_resolver: HolidayResolver,
        alert_controller: Arc<AlertController>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            config_store,
            holiday_resolver: Arc::new(tokio::sync::RwLock::new(holiday_resolver)),
            alert_controller,
            scheduler,
            session_cache: SessionCache::new(),
            service_statuses: ServiceStatusRegistry::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Build a fresh [`ConfigSnapshot`] from the current Config Store and
    /// Holiday Resolver state, for handing to the Scheduler after a reload.
    pub async fn build_scheduler_snapshot(&self) -> ConfigSnapshot {
        let data = self.config_store.snapshot().await;
        ConfigSnapshot {
            day_types: data.day_types,
            weekly_plan: data.weekly_plan,
            exceptions: data.exceptions,
            holiday_resolver: self.holiday_resolver.read().await.clone(),
            lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
        }
    }
}
