use bytes::Bytes;
use castbus_error::BrokerError;

use super::ChannelEvent;

/// Сериализует событие в кадр для транспорта (JSON).
pub fn encode_event(event: &ChannelEvent) -> Result<Bytes, BrokerError> {
    serde_json::to_vec(event)
        .map(Bytes::from)
        .map_err(|e| BrokerError::Encode {
            reason: e.to_string(),
        })
}

/// Разбирает кадр транспорта в событие, проверяя обязательные поля.
pub fn decode_event(frame: &[u8]) -> Result<ChannelEvent, BrokerError> {
    serde_json::from_slice(frame).map_err(|e| BrokerError::MalformedEvent {
        reason: e.to_string(),
    })
}
