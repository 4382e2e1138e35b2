use lossctl::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Console logging plus a daily file under LOSSCTL_LOG_DIR when it is set
///
/// The returned guard flushes the file writer on drop and must live until
/// the process exits.
pub fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info,lossctl=debug"));

    let log_dir = std::env::var("LOSSCTL_LOG_DIR").ok();

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so writability is checked first
    let mut guard = None;
    let file_layer = match log_dir.as_deref() {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let test_path = std::path::Path::new(dir).join(".lossctl_write_test");
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&test_path);

                    let file_appender = tracing_appender::rolling::daily(dir, "lossctl.log");
                    let (non_blocking, worker_guard) =
                        tracing_appender::non_blocking(file_appender);
                    guard = Some(worker_guard);

                    Some(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_target(true),
                    )
                }
                Err(e) => {
                    eprintln!(
                        "Warning: Could not write to log directory {} ({}), file logging disabled",
                        dir, e
                    );
                    None
                }
            }
        }
        Some(dir) => {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                dir
            );
            None
        }
        None => None,
    };

    let console_layer = if logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(filter)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/lossctl.log", dir);
    }

    guard
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
