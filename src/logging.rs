use crate::cli::Args;
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Installs the global subscriber. Stdout carries the protocol, so console
/// output goes to stderr. `log` records from library code are bridged in.
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init(args: &Args) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = if args.log_file_enable {
        let appender = match args.log_rotate.to_ascii_lowercase().as_str() {
            "hourly" => rolling::hourly(&args.log_dir, &args.log_filename),
            "never" => rolling::never(&args.log_dir, &args.log_filename),
            _ => rolling::daily(&args.log_dir, &args.log_filename),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(guard)
}
