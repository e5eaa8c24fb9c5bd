//! События, которыми обмениваются контексты через широковещательный канал.
//!
//! На проводе событие — JSON-объект с ключами `topic`, `sender`, `message` и,
//! для доставки с подтверждением, парой `id` + `needsAck`. Внутри крейта
//! заголовок подтверждения представлен явным `Option<AckHeader>`, а не набором
//! необязательных полей.

use serde::{Deserialize, Serialize};

/// Заголовок доставки с подтверждением.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHeader {
    /// Идентификатор корреляции отправки.
    pub id: String,
    /// `true` для исходного запроса и его эха-подтверждения.
    pub needs_ack: bool,
}

/// Событие канала.
///
/// `sender` — идентичность контекста-отправителя. Используется только для
/// фильтрации собственных сообщений и не является аутентификатором.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct ChannelEvent {
    pub topic: String,
    pub sender: String,
    pub message: String,
    pub ack: Option<AckHeader>,
}

/// Событие с обязательным заголовком подтверждения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckEvent {
    pub topic: String,
    pub sender: String,
    pub message: String,
    pub id: String,
    pub needs_ack: bool,
}

/// Параметры публикации.
///
/// `sender` не задаётся вызывающим: брокер подставляет свою идентичность,
/// если не указан `sender_override`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishParams {
    pub topic: String,
    pub message: String,
    pub sender_override: Option<String>,
    pub ack: Option<AckHeader>,
}

/// Сырое представление события на проводе.
#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    topic: Option<String>,
    sender: Option<String>,
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(
        rename = "needsAck",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    needs_ack: Option<bool>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ChannelEvent {
    pub fn new(
        topic: impl Into<String>,
        sender: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            sender: sender.into(),
            message: message.into(),
            ack: None,
        }
    }

    pub fn with_ack(
        mut self,
        id: impl Into<String>,
        needs_ack: bool,
    ) -> Self {
        self.ack = Some(AckHeader {
            id: id.into(),
            needs_ack,
        });
        self
    }

    /// Событие ожидает подтверждения: есть `id` и `needs_ack == true`.
    pub fn wants_ack(&self) -> bool {
        matches!(&self.ack, Some(h) if h.needs_ack)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.ack.as_ref().map(|h| h.id.as_str())
    }
}

impl AckEvent {
    /// Копия события со снятым флагом `needs_ack`: так выглядит результат
    /// успешной отправки.
    pub fn resolved(mut self) -> Self {
        self.needs_ack = false;
        self
    }
}

impl PublishParams {
    pub fn new(
        topic: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            sender_override: None,
            ack: None,
        }
    }

    pub fn sender_override(
        mut self,
        sender: impl Into<String>,
    ) -> Self {
        self.sender_override = Some(sender.into());
        self
    }

    pub fn ack(
        mut self,
        header: AckHeader,
    ) -> Self {
        self.ack = Some(header);
        self
    }

    /// Собирает итоговое событие, подставляя отправителя.
    pub(crate) fn into_event(
        self,
        own_sender: &str,
    ) -> ChannelEvent {
        ChannelEvent {
            topic: self.topic,
            sender: self
                .sender_override
                .unwrap_or_else(|| own_sender.to_string()),
            message: self.message,
            ack: self.ack,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl TryFrom<WireEvent> for ChannelEvent {
    type Error = String;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let topic = wire.topic.ok_or("missing field `topic`")?;
        let sender = wire.sender.ok_or("missing field `sender`")?;
        let message = wire.message.ok_or("missing field `message`")?;

        let ack = match (wire.id, wire.needs_ack) {
            (Some(id), Some(needs_ack)) => Some(AckHeader { id, needs_ack }),
            (None, None) => None,
            (Some(_), None) => return Err("field `id` present without `needsAck`".into()),
            (None, Some(_)) => return Err("field `needsAck` present without `id`".into()),
        };

        Ok(Self {
            topic,
            sender,
            message,
            ack,
        })
    }
}

impl From<ChannelEvent> for WireEvent {
    fn from(event: ChannelEvent) -> Self {
        let (id, needs_ack) = match event.ack {
            Some(h) => (Some(h.id), Some(h.needs_ack)),
            None => (None, None),
        };
        Self {
            topic: Some(event.topic),
            sender: Some(event.sender),
            message: Some(event.message),
            id,
            needs_ack,
        }
    }
}

impl TryFrom<ChannelEvent> for AckEvent {
    type Error = ChannelEvent;

    /// Возвращает исходное событие, если у него нет заголовка подтверждения.
    fn try_from(event: ChannelEvent) -> Result<Self, Self::Error> {
        match event.ack {
            Some(AckHeader { id, needs_ack }) => Ok(Self {
                topic: event.topic,
                sender: event.sender,
                message: event.message,
                id,
                needs_ack,
            }),
            None => Err(event),
        }
    }
}

impl From<AckEvent> for ChannelEvent {
    fn from(event: AckEvent) -> Self {
        Self {
            topic: event.topic,
            sender: event.sender,
            message: event.message,
            ack: Some(AckHeader {
                id: event.id,
                needs_ack: event.needs_ack,
            }),
        }
    }
}

impl From<&AckEvent> for PublishParams {
    fn from(event: &AckEvent) -> Self {
        Self {
            topic: event.topic.clone(),
            message: event.message.clone(),
            sender_override: None,
            ack: Some(AckHeader {
                id: event.id.clone(),
                needs_ack: event.needs_ack,
            }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
