use std::{collections::BTreeMap, env, fs, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный человекочитаемый вывод.
    Pretty,
    /// Однострочный вывод.
    #[default]
    Compact,
    /// Один JSON-объект на событие.
    Json,
}

/// Настройки консольного вывода.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Формат консоли. Если не задан, используется общий `format`.
    #[serde(default)]
    pub format: Option<LogFormat>,
    #[serde(default = "default_true")]
    pub with_ansi: bool,
    #[serde(default = "default_true")]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_line_numbers: bool,
}

/// Настройки файлового вывода.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Ежедневная ротация файла средствами `tracing-appender`.
    #[serde(default = "default_true")]
    pub daily_rotation: bool,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Базовый уровень для крейта: trace, debug, info, warn, error.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_true")]
    pub console_enabled: bool,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub file_enabled: bool,
    #[serde(default)]
    pub file: FileConfig,
    /// Уровни для отдельных целей, например `castbus::pubsub::ack = "trace"`.
    #[serde(default)]
    pub module_levels: BTreeMap<String, String>,
}

/// Ошибка конфигурации логирования.
#[derive(Debug, Error)]
pub enum LoggingConfigError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("invalid log format: {0}")]
    InvalidFormat(String),

    #[error("log file name must not be empty")]
    EmptyFilename,

    #[error("failed to create log directory: {0}")]
    LogDir(#[source] io::Error),
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    /// Применяет `CASTBUS_LOG_LEVEL`, `CASTBUS_LOG_FORMAT` и
    /// `CASTBUS_LOG_DIR`, если они заданы.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("CASTBUS_LOG_LEVEL") {
            self.level = level.to_lowercase();
        }
        if let Ok(format) = env::var("CASTBUS_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring CASTBUS_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = env::var("CASTBUS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), LoggingConfigError> {
        check_level(&self.level)?;
        for level in self.module_levels.values() {
            check_level(level)?;
        }
        if self.file_enabled && self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(LoggingConfigError::EmptyFilename);
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingConfigError> {
        if self.file_enabled && self.file.enabled {
            fs::create_dir_all(&self.log_dir).map_err(LoggingConfigError::LogDir)?;
        }
        Ok(())
    }

    /// Директива `EnvFilter`: уровень крейта плюс уровни отдельных целей.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = format!("{}={}", env!("CARGO_CRATE_NAME"), self.level);
        for (target, level) in &self.module_levels {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }
}

fn check_level(level: &str) -> Result<(), LoggingConfigError> {
    if LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(LoggingConfigError::InvalidLevel(level.to_string()))
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_filename() -> String {
    "castbus.log".to_string()
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: default_filename(),
            daily_rotation: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            log_dir: default_log_dir(),
            console_enabled: true,
            console: ConsoleConfig::default(),
            file_enabled: false,
            file: FileConfig::default(),
            module_levels: BTreeMap::new(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = LoggingConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingConfigError::InvalidFormat(other.to_string())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
