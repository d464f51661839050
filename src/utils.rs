use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use chatfeed::models::Message;
use log::{LevelFilter, Record};
use std::fs::OpenOptions;
use std::io::Write;

// Logging setup and small formatting helpers for the terminal driver

pub struct SimpleLogger {
    log_file: Option<std::fs::File>,
}

impl SimpleLogger {
    pub fn new(log_file_path: Option<&str>) -> Result<Self> {
        let log_file = if let Some(path) = log_file_path {
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        } else {
            None
        };

        Ok(SimpleLogger { log_file })
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now: DateTime<Local> = Local::now();
        let line = format!(
            "[{}] {} [{}:{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        );

        match &self.log_file {
            Some(file) => {
                let mut writer = file;
                let _ = writer.write_all(line.as_bytes());
            }
            // Stdout belongs to the chat view
            None => eprint!("{}", line),
        }
    }

    fn flush(&self) {
        match &self.log_file {
            Some(file) => {
                let mut writer = file;
                let _ = writer.flush();
            }
            None => {
                let _ = std::io::stderr().flush();
            }
        }
    }
}

pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    log::info!("Logging initialized at level: {}", level);
    log::info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Ok(())
}

/// One line per message: `[HH:MM] sender: content`, own messages marked
pub fn format_message(message: &Message) -> String {
    let time = match Local.timestamp_millis_opt(message.timestamp).single() {
        Some(t) => t.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    };
    let marker = if message.is_own { ">" } else { " " };
    format!("{} [{}] {}: {}", marker, time, message.sender, message.content)
}
