use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use keeper_config::{LogConfig, LogFormat};
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. `RUST_LOG`, when set, replaces the
/// configured level.
pub fn setup_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .or_raise(|| ErrorKind::Logging)?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Pretty => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).or_raise(|| ErrorKind::Logging)
}
