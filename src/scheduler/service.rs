//! Scheduler service: wraps [`super::ConfigSnapshot`] and the next-event
//! search in a long-running `Service`, exposing the observables and control
//! operations the HTTP surface needs.

use crate::audio;
use crate::schedule::ScheduledEvent;
use crate::scheduler::{ConfigSnapshot, next_event_from, schedule_for_date};
use crate::services::Service;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

const BACKOFF_ON_ERROR: Duration = Duration::from_secs(15);
const INACTIVE_POLL: Duration = Duration::from_secs(5);
const MIN_SLEEP: Duration = Duration::from_millis(50);
const MAX_SLEEP: Duration = Duration::from_secs(1);
const DISPATCH_LEAD: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Observables {
    next_ring: Option<ScheduledEvent>,
    last_error: Option<(String, DateTime<Utc>)>,
}

/// Shared handle the HTTP surface holds to control and observe the
/// scheduler. Cloneable; all state lives behind the inner `Arc`.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    active: AtomicBool,
    wake: Notify,
    config: RwLock<ConfigSnapshot>,
    observables: RwLock<Observables>,
    player_command: String,
    mp3_dir: PathBuf,
    audio_device: Option<String>,
}

impl SchedulerHandle {
    pub fn new(
        initial_config: ConfigSnapshot,
        player_command: String,
        mp3_dir: PathBuf,
        audio_device: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                active: AtomicBool::new(false),
                wake: Notify::new(),
                config: RwLock::new(initial_config),
                observables: RwLock::new(Observables::default()),
                player_command,
                mp3_dir,
                audio_device,
            }),
        }
    }

    pub fn start(&self) {
        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn stop(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn force_recheck(&self) {
        self.inner.wake.notify_one();
    }

    pub async fn reload_config(&self, snapshot: ConfigSnapshot) {
        *self.inner.config.write().await = snapshot;
        self.force_recheck();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub async fn next_ring_instant_iso(&self) -> Option<String> {
        self.inner
            .observables
            .read()
            .await
            .next_ring
            .as_ref()
            .map(|e| e.instant.and_utc().to_rfc3339())
    }

    pub async fn next_ring_label(&self) -> Option<String> {
        self.inner.observables.read().await.next_ring.as_ref().map(|e| e.label.clone())
    }

    pub async fn last_error(&self) -> Option<(String, DateTime<Utc>)> {
        self.inner.observables.read().await.last_error.clone()
    }

    pub async fn schedule_for_date(&self, date: NaiveDate) -> Vec<ScheduledEvent> {
        let config = self.inner.config.read().await;
        schedule_for_date(date, &config)
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let config = self.inner.config.read().await.clone();
        let now = Local::now().naive_local();

        let mut next = next_event_from(now, &config);

        if let Some(event) = &next
            && now >= event.instant
        {
            self.dispatch(event).await;
            next = next_event_from(now + chrono::Duration::seconds(1), &config);
        }

        self.inner.observables.write().await.next_ring = next;
        Ok(())
    }

    async fn dispatch(&self, event: &ScheduledEvent) {
        let Some(sound) = &event.sound else {
            info!(label = event.label, "silent event, nothing to play");
            return;
        };

        let path = self.inner.mp3_dir.join(sound);
        match audio::play(&self.inner.player_command, &path, self.inner.audio_device.as_deref(), false) {
            Ok(_child) => info!(label = event.label, sound, "dispatched bell event"),
            Err(e) => warn!(label = event.label, sound, error = %e, "failed to dispatch audio for event"),
        }
    }

    fn next_sleep(&self, next_ring: Option<&ScheduledEvent>) -> Duration {
        let Some(event) = next_ring else {
            return MAX_SLEEP;
        };

        let now = Local::now().naive_local();
        let remaining = event.instant - now;
        let Ok(remaining_std) = remaining.to_std() else {
            return MIN_SLEEP;
        };
        remaining_std
            .saturating_sub(DISPATCH_LEAD)
            .clamp(MIN_SLEEP, MAX_SLEEP)
    }
}

/// The long-running scheduler service, wrapping a [`SchedulerHandle`].
pub struct SchedulerService {
    handle: SchedulerHandle,
}

impl SchedulerService {
    pub fn new(handle: SchedulerHandle) -> Self {
        Self { handle }
    }
}

#[async_trait::async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        loop {
            if !self.handle.is_active() {
                tokio::select! {
                    _ = self.handle.inner.wake.notified() => {}
                    _ = tokio::time::sleep(INACTIVE_POLL) => {}
                }
                continue;
            }

            if let Err(e) = self.handle.tick().await {
                error!(error = %e, "scheduler tick failed, backing off");
                self.handle.inner.observables.write().await.last_error = Some((e.to_string(), Utc::now()));
                tokio::select! {
                    _ = tokio::time::sleep(BACKOFF_ON_ERROR) => {}
                    _ = self.handle.inner.wake.notified() => {}
                }
                continue;
            }

            let next_ring = self.handle.inner.observables.read().await.next_ring.clone();
            let sleep_duration = self.handle.next_sleep(next_ring.as_ref());

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.handle.inner.wake.notified() => {}
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.handle.stop();
        Ok(())
    }
}
