use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use figment::{Figment, providers::Env};
use tracing::{error, info};

use campanile::alert::AlertController;
use campanile::audio;
use campanile::cli::Args;
use campanile::config::Config;
use campanile::holiday::HolidayResolver;
use campanile::logging::setup_logging;
use campanile::scheduler::service::{SchedulerHandle, SchedulerService};
use campanile::scheduler::DEFAULT_LOOKAHEAD_LIMIT_DAYS;
use campanile::services::manager::ServiceManager;
use campanile::services::web::WebService;
use campanile::signals::handle_shutdown_signals;
use campanile::state::AppState;
use campanile::store::ConfigStore;
use campanile::web::auth::AuthConfig;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // `--play-sound` bypasses the scheduler entirely: play one file and exit.
    if let Some(path) = &args.play_sound {
        let result = audio::play(audio::DEFAULT_PLAYER_COMMAND, path, args.device.as_deref(), args.r#loop);
        return match result {
            Ok(mut child) => match child.wait() {
                Ok(status) if status.success() => ExitCode::SUCCESS,
                Ok(status) => {
                    eprintln!("audio player exited with {status}");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    eprintln!("failed to wait on audio player: {e}");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("failed to play {}: {e}", path.display());
                ExitCode::FAILURE
            }
        };
    }

    let config: Config = Figment::new()
        .merge(Env::prefixed("CAMPANILE_"))
        .extract()
        .expect("Failed to load config");

    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) { "development" } else { "production" },
        "starting campanile"
    );

    if let Err(e) = ConfigStore::ensure_writable(&config.config_dir) {
        error!(error = %e, path = %config.config_dir.display(), "config directory is not writable");
        return ExitCode::FAILURE;
    }

    if !config.mp3_dir.is_dir() {
        error!(path = %config.mp3_dir.display(), "mp3 directory does not exist");
        return ExitCode::FAILURE;
    }

    let config_store = match ConfigStore::load(config.config_dir.clone()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to load config store");
            return ExitCode::FAILURE;
        }
    };

    // The holiday resolver starts empty; the web service's background loop
    // refreshes it from the API/ICS feeds shortly after startup.
    let holiday_resolver = HolidayResolver::default();

    let alert_controller = Arc::new(AlertController::new(
        audio::DEFAULT_PLAYER_COMMAND.to_string(),
        config.mp3_dir.clone(),
    ));

    let data = config_store.snapshot().await;
    let initial_snapshot = campanile::scheduler::ConfigSnapshot {
        day_types: data.day_types,
        weekly_plan: data.weekly_plan,
        exceptions: data.exceptions,
        holiday_resolver: holiday_resolver.clone(),
        lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
    };

    let scheduler = SchedulerHandle::new(
        initial_snapshot,
        audio::DEFAULT_PLAYER_COMMAND.to_string(),
        config.mp3_dir.clone(),
        config.audio_device.clone(),
    );
    scheduler.start();

    let app_state = AppState::new(config_store, holiday_resolver, alert_controller, scheduler.clone());

    let auth_config = AuthConfig::default();

    let mut service_manager = ServiceManager::new();
    service_manager.register_service("scheduler", Box::new(SchedulerService::new(scheduler)));
    service_manager.register_service(
        "web",
        Box::new(WebService::new(config.port, app_state, auth_config, config.config_dir.clone())),
    );

    service_manager.spawn_all();

    handle_shutdown_signals(service_manager, config.shutdown_timeout).await
}
