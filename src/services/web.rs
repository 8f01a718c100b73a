use super::Service;
use crate::holiday::{api as holiday_api, ics as holiday_ics};
use crate::model::{academic_year_start, Zone};
use crate::state::AppState;
use crate::status::ServiceStatus;
use crate::web::auth::AuthConfig;
use crate::web::create_router;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Directory holding the holiday-cache and vacation-ICS files, separate from
/// the Config Store's JSON files.
const HOLIDAY_CACHE_SUBDIR: &str = "holiday_cache";

/// Web server service implementation
pub struct WebService {
    port: u16,
    app_state: AppState,
    auth_config: AuthConfig,
    cache_dir: PathBuf,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState, auth_config: AuthConfig, config_dir: PathBuf) -> Self {
        Self {
            port,
            app_state,
            auth_config,
            cache_dir: config_dir.join(HOLIDAY_CACHE_SUBDIR),
            shutdown_tx: None,
        }
    }

    /// Periodically refreshes the holiday API cache and vacation ICS feeds,
    /// swapping in a new Holiday Resolver instance atomically on success.
    async fn holiday_refresh_loop(state: AppState, cache_dir: PathBuf, mut shutdown_rx: broadcast::Receiver<()>) {
        use std::time::Duration;
        let mut interval = tokio::time::interval(Duration::from_secs(6 * 3600));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    Self::refresh_holidays_once(&state, &cache_dir).await;
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    }

    async fn refresh_holidays_once(state: &AppState, cache_dir: &std::path::Path) {
        let general = {
            let data = state.config_store.snapshot().await;
            data.general
        };
        let Some(general) = general else {
            warn!("skipping holiday refresh: general parameters not configured");
            return;
        };

        let existing_holidays: Vec<crate::model::Holiday> = state
            .holiday_resolver
            .read()
            .await
            .holidays()
            .map(|(date, description)| crate::model::Holiday {
                date: *date,
                description: description.clone(),
            })
            .collect();
        let holidays = holiday_api::load_holidays(
            &state.http_client,
            cache_dir,
            &general.api_holidays_url,
            &general.country_code_holidays,
            false,
            holiday_api::DEFAULT_FRESHNESS,
            existing_holidays,
        )
        .await;

        let Some(zone) = Zone::parse(&general.zone) else {
            warn!(zone = general.zone, "unknown vacation zone, skipping ICS refresh");
            let mut resolver = state.holiday_resolver.write().await;
            *resolver = crate::holiday::HolidayResolver::new(holidays, resolver.vacation_periods().to_vec());
            state.service_statuses.set("holiday_resolver", ServiceStatus::Active);
            return;
        };

        let today = chrono::Local::now().date_naive();
        let current_year = academic_year_start(today);
        let mut vacations = Vec::new();
        for year in [current_year, current_year + 1] {
            vacations.extend(
                holiday_ics::load_academic_year(
                    &state.http_client,
                    cache_dir,
                    zone,
                    year,
                    None,
                    general.vacances_ics_base_url_manuel.as_deref(),
                )
                .await,
            );
        }

        let mut resolver = state.holiday_resolver.write().await;
        *resolver = crate::holiday::HolidayResolver::new(holidays, vacations);
        state.service_statuses.set("holiday_resolver", ServiceStatus::Active);
        info!("holiday resolver refreshed");
    }

    /// Periodically cleans up expired sessions from the in-memory cache.
    async fn session_cleanup_loop(state: AppState, mut shutdown_rx: broadcast::Receiver<()>) {
        use std::time::Duration;
        let mut interval = tokio::time::interval(Duration::from_secs(3600));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = state.session_cache.cleanup_expired();
                    if evicted > 0 {
                        info!(evicted, "cleaned up expired sessions");
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for WebService {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        let app = create_router(self.app_state.clone(), self.auth_config.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));

        let listener = TcpListener::bind(addr).await?;
        self.app_state
            .service_statuses
            .set("web", ServiceStatus::Active);
        info!(
            service = "web",
            address = %addr,
            link = format!("http://localhost:{}", addr.port()),
            "web server listening"
        );

        // Create internal shutdown channel for axum graceful shutdown
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        // Perform an initial refresh inline so the resolver isn't empty for
        // the first 6 hours of uptime.
        Self::refresh_holidays_once(&self.app_state, &self.cache_dir).await;

        let holiday_state = self.app_state.clone();
        let holiday_cache_dir = self.cache_dir.clone();
        let holiday_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            Self::holiday_refresh_loop(holiday_state, holiday_cache_dir, holiday_shutdown_rx).await;
        });

        let cleanup_state = self.app_state.clone();
        let cleanup_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            Self::session_cleanup_loop(cleanup_state, cleanup_shutdown_rx).await;
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                trace!(
                    service = "web",
                    "received shutdown signal, starting graceful shutdown"
                );
            })
            .await?;

        trace!(service = "web", "graceful shutdown completed");
        info!(service = "web", "web server stopped");

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
            trace!(service = "web", "sent shutdown signal to axum");
        } else {
            warn!(
                service = "web",
                "no shutdown channel found, cannot trigger graceful shutdown"
            );
        }
        Ok(())
    }
}
