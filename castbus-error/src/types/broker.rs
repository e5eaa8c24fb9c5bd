use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode, TransportError};

/// Ошибки брокера сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Брокер закрыт, публикация и подписка недоступны.
    #[error("broker on channel '{channel}' is closed")]
    Closed { channel: String },

    /// Брокер создан вне Tokio runtime.
    #[error("no tokio runtime available to drive the inbound pump")]
    NoRuntime,

    /// Входящий кадр не соответствует формату события.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Событие не удалось сериализовать в кадр.
    #[error("failed to encode event: {reason}")]
    Encode { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ErrorExt for BrokerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed { .. } => StatusCode::ChannelClosed,
            Self::NoRuntime => StatusCode::RuntimeUnavailable,
            Self::MalformedEvent { .. } => StatusCode::MalformedEvent,
            Self::Encode { .. } => StatusCode::SerializationFailed,
            Self::Transport(e) => e.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
