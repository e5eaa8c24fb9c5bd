//! Подсистема Publish–Subscribe между контекстами исполнения.
//!
//! Контексты (виджеты, вкладки, воркеры) обмениваются событиями через
//! именованный широковещательный канал:
//!
//! - `transport`: абстракция канала и внутрипроцессная реализация.
//! - `event`: событие канала, заголовок подтверждения, параметры публикации.
//! - `codec`: JSON-представление события на проводе.
//! - `registry`: подписки по темам и журнал повторной доставки.
//! - `broker`: [`MessageBroker`] поверх одного порта канала.
//! - `ack`: [`AckBroker`], доставка с подтверждением и повторами.
//! - `correlation`: идентификаторы корреляции отправок.
//! - `intern` (приватный): пул имён каналов.

pub mod ack;
pub mod broker;
pub mod codec;
pub mod correlation;
pub mod event;
mod intern;
pub mod registry;
pub mod transport;

pub use ack::*;
pub use broker::*;
pub use codec::{decode_event, encode_event};
pub use correlation::CorrelationIds;
pub use event::*;
pub(crate) use intern::intern_channel;
pub use registry::{callback, Callback};
pub use transport::*;
