use serde::{Deserialize, Serialize};
use slog::{o, Drain, Logger};

pub use slog;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingSettings {
    pub stdout: bool,
    pub level: String,
    pub log_path: Option<String>,
    pub name: String,
}

pub fn init_log(config: &LoggingSettings) -> Logger {
    let LoggingSettings {
        stdout,
        level,
        log_path,
        name,
    } = config;

    let level = match level.as_str() {
        "trace" => slog::Level::Trace,
        "debug" => slog::Level::Debug,
        "info" => slog::Level::Info,
        "warning" => slog::Level::Warning,
        "error" => slog::Level::Error,
        "critical" => slog::Level::Critical,
        st => panic!("Unknown logging level {:?}", st),
    };

    let stdout_drain = if *stdout {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        Some(slog_async::Async::new(drain).build().fuse())
    } else {
        None
    };

    let file_drain = log_path.as_deref().map(|path| {
        build_file_drain(path).unwrap_or_else(|err| panic!("Could not open {}: {}", path, err))
    });

    match (stdout_drain, file_drain) {
        (Some(stdout), Some(file)) => {
            let drain = slog::Duplicate::new(stdout, file).fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            Logger::root(drain, o!("name" => name.to_string()))
        }
        (Some(stdout), None) => {
            let drain = slog::LevelFilter::new(stdout, level).fuse();
            Logger::root(drain, o!("name" => name.to_string()))
        }
        (None, Some(file)) => {
            let drain = slog::LevelFilter::new(file, level).fuse();
            Logger::root(drain, o!("name" => name.to_string()))
        }
        (None, None) => Logger::root(slog::Discard.fuse(), o!("name" => name.to_string())),
    }
}

fn build_file_drain(log_path: &str) -> Result<slog::Fuse<slog_async::Async>, std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let decorator = slog_term::PlainSyncDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Ok(drain)
}
