use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки транспортного уровня (именованный широковещательный канал).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Порт или канал уже закрыт.
    #[error("channel '{channel}' is closed")]
    Closed { channel: String },

    /// Получатель отстал, часть кадров потеряна.
    #[error("receiver on channel '{channel}' lagged behind by {skipped} frames")]
    Lagged { channel: String, skipped: u64 },

    /// Не удалось привязаться к каналу.
    #[error("failed to bind channel '{channel}': {reason}")]
    Bind { channel: String, reason: String },
}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed { .. } => StatusCode::ChannelClosed,
            Self::Lagged { .. } => StatusCode::Lagged,
            Self::Bind { .. } => StatusCode::TransportFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "transport".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::Lagged { skipped, .. } = self {
            tags.push(("skipped", skipped.to_string()));
        }
        tags
    }
}
