//! File logging for a CLI run. Every run writes to its own directory at
//! ~/.prompt-canvas/logs/{timestamp}_{uuid}/log.

use anyhow::{Context, Result};
use chrono::Local;
use dirs::home_dir;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

pub struct CanvasLogger {
    level: LevelFilter,
    file: Mutex<File>,
    run_id: String,
    log_path: PathBuf,
}

impl CanvasLogger {
    /// Create the run directory and open its log file.
    pub fn new(level: LevelFilter) -> Result<Self> {
        let run_id = run_id();

        let log_dir = Self::log_dir(&run_id)?;
        create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        let log_path = log_dir.join("log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

        Ok(Self {
            level,
            file: Mutex::new(file),
            run_id,
            log_path,
        })
    }

    pub fn log_dir(run_id: &str) -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".prompt-canvas").join("logs").join(run_id))
    }

    /// Install the logger. Returns the path of the log file.
    pub fn init(level: LevelFilter) -> Result<PathBuf> {
        let logger = Self::new(level)?;
        let run_id = logger.run_id.clone();
        let log_path = logger.log_path.clone();

        log::set_boxed_logger(Box::new(logger))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;

        log::info!("prompt-canvas logger initialized. Run ID: {}", run_id);
        log::info!("Log file: {}", log_path.display());
        Ok(log_path)
    }
}

impl Log for CanvasLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(
            &Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );

        if let Ok(mut file) = self.file.lock() {
            // A failed log write must not take the run down with it.
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }

        // stdout carries JSON results, so only problems go to the terminal.
        if record.level() <= Level::Warn {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

fn run_id() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let uuid = Uuid::new_v4().to_string();
    let short = uuid.split('-').next().unwrap_or("unknown");
    format!("{timestamp}_{short}")
}

fn format_record(timestamp: &str, level: Level, target: &str, message: &str) -> String {
    format!("{} {} [{}] {}", timestamp, level, target, message)
}

/// Separate phases of a run in the log file.
pub fn log_section(name: &str) {
    let separator = "=".repeat(50);
    log::info!("{}", separator);
    log::info!("SECTION: {}", name);
    log::info!("{}", separator);
}
