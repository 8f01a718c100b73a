use clap::Parser;
use std::path::PathBuf;

/// Campanile bell-scheduling server.
///
/// Runs the scheduler and web services. Pass `--play-sound` to instead run
/// as a one-shot Audio Player and exit, bypassing the scheduler entirely.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Play a single sound file through the Audio Player and exit.
    #[arg(long, value_name = "PATH")]
    pub play_sound: Option<PathBuf>,

    /// Output device name, used only with `--play-sound`.
    #[arg(long, value_name = "NAME", requires = "play_sound")]
    pub device: Option<String>,

    /// Loop playback, used only with `--play-sound`.
    #[arg(long, requires = "play_sound")]
    pub r#loop: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}
