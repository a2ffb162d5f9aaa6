use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the non-blocking writers flushing. Drop only at process exit.
pub struct LogGuards {
    _stdout: WorkerGuard,
    _file: WorkerGuard,
}

/// Installs the global subscriber: stdout plus a daily-rotated file under `cfg.dir`.
///
/// `RUST_LOG` takes precedence over `cfg.level`.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<LogGuards> {
    std::fs::create_dir_all(&cfg.dir)?;
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily(&cfg.dir, &cfg.file_name);
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cfg.level))?;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .try_init()?;

    Ok(LogGuards { _stdout: stdout_guard, _file: file_guard })
}
