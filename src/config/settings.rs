use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use crate::pubsub::{AckSettings, BrokerOptions, LocalTransport, DEFAULT_CHANNEL_NAME};

/// Настройки процесса: канал, идентичность контекста, параметры повторов.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub channel_name: String,
    pub sender_name: String,
    pub retry_attempts: u32,
    pub retry_interval_ms: u64,
    pub transport_capacity: usize,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, затем переменные
    /// окружения с префиксом `CASTBUS_`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Environment::with_prefix("CASTBUS").try_parsing(true))
    }

    fn load_from(env: Environment) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("channel_name", DEFAULT_CHANNEL_NAME)?
            .set_default("sender_name", "/")?
            .set_default("retry_attempts", 3)?
            .set_default("retry_interval_ms", 1500)?
            .set_default("transport_capacity", 1024)?
            .add_source(env)
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_name.is_empty() {
            return Err(ConfigError::Message("channel_name must not be empty".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::Message("retry_interval_ms must be positive".into()));
        }
        if self.transport_capacity == 0 {
            return Err(ConfigError::Message("transport_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn broker_options(&self) -> BrokerOptions {
        BrokerOptions::new(self.sender_name.clone()).channel(self.channel_name.clone())
    }

    pub fn ack_settings(&self) -> AckSettings {
        AckSettings::builder()
            .retry_attempts(self.retry_attempts)
            .retry_interval(Duration::from_millis(self.retry_interval_ms))
            .build()
    }

    pub fn transport(&self) -> LocalTransport {
        LocalTransport::with_capacity(self.transport_capacity)
    }
}
