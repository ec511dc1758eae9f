use chrono::{SecondsFormat, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;

/// Minimum level printed, read once from `LOG_LEVEL` (debug|info|warn|error).
static LOG_LEVEL: Lazy<LogLevel> = Lazy::new(|| {
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| LogLevel::parse(&v))
        .unwrap_or(LogLevel::Info)
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Per-component logger. Each service owns one with its own colored prefix.
#[derive(Clone)]
pub struct Logger {
    prefix: String,
}

impl Logger {
    pub fn new(prefix: String) -> Self {
        Logger { prefix }
    }

    pub fn log(&self, message: String) {
        self.emit(LogLevel::Info, message);
    }

    pub fn debug(&self, message: String) {
        self.emit(LogLevel::Debug, message.dimmed().to_string());
    }

    pub fn success(&self, message: String) {
        self.emit(LogLevel::Info, message.green().to_string());
    }

    pub fn warn(&self, message: String) {
        self.emit(LogLevel::Warn, message.yellow().to_string());
    }

    pub fn error(&self, message: String) {
        self.emit(LogLevel::Error, message.red().to_string());
    }

    /// Printed regardless of `LOG_LEVEL`.
    pub fn critical(&self, message: String) {
        self.emit_line(None, message.red().bold().to_string());
    }

    #[inline(always)]
    fn emit(&self, level: LogLevel, message: String) {
        self.emit_line(Some(level), message);
    }

    fn emit_line(&self, level: Option<LogLevel>, message: String) {
        if !passes_filter(level, *LOG_LEVEL) {
            return;
        }
        let label = level.map_or("CRITICAL", LogLevel::label);
        let line = format!("{} {} [{}] {}", timestamp(), self.prefix, label, message);
        if level.map_or(true, |l| l >= LogLevel::Warn) {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// `None` marks a critical line, which no minimum level suppresses.
fn passes_filter(level: Option<LogLevel>, min: LogLevel) -> bool {
    level.map_or(true, |level| level >= min)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
