use std::any::Any;

use thiserror::Error;

use crate::{BrokerError, ErrorExt, StatusCode};

/// Ошибки доставки с подтверждением.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    /// Все повторы исчерпаны, подтверждение не пришло.
    #[error("failed to receive acknowledgement for message: {id} (after {attempts} retries)")]
    Exhausted { id: String, attempts: u32 },

    /// Отправка отменена закрытием брокера.
    #[error("delivery of message {id} was cancelled")]
    Cancelled { id: String },

    /// Брокер подтверждений уже закрыт.
    #[error("ack broker on channel '{channel}' is closed")]
    Closed { channel: String },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl AckError {
    /// Идентификатор корреляции, если ошибка относится к конкретной отправке.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Exhausted { id, .. } | Self::Cancelled { id } => Some(id),
            _ => None,
        }
    }
}

impl ErrorExt for AckError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Exhausted { .. } => StatusCode::AckExhausted,
            Self::Cancelled { .. } => StatusCode::AckCancelled,
            Self::Closed { .. } => StatusCode::ChannelClosed,
            Self::Broker(e) => e.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "ack".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::Exhausted { attempts, .. } = self {
            tags.push(("attempts", attempts.to_string()));
        }
        tags
    }
}
