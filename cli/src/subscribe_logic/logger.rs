use super::config::LogConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LOG_PREFIX: &str = "bgpvalidator_";

/// Installs the global logger and returns the path of the new log file.
pub fn setup_logging(config: &LogConfig) -> Result<PathBuf> {
    if !config.dir.exists() {
        fs::create_dir_all(&config.dir)
            .with_context(|| format!("failed to create log directory {}", config.dir.display()))?;
    }

    // Rotate before opening the new file so it is never counted.
    cleanup_old_logs(&config.dir, config.keep)?;

    let log_file_name = format!("{}{}.log", LOG_PREFIX, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = config.dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(&config.level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Deletes all but the `keep` most recent `bgpvalidator_*.log` files.
///
/// File names carry a sortable timestamp, so the newest sort last.
fn cleanup_old_logs(log_dir: &Path, keep: usize) -> Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .filter(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(LOG_PREFIX))
        })
        .collect();

    logs.sort();
    let excess = logs.len().saturating_sub(keep);

    for path in logs.iter().take(excess) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
