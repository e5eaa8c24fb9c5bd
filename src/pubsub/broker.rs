use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use castbus_error::{BrokerError, TransportError};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use super::{
    codec::{decode_event, encode_event},
    registry::TopicRegistry,
    Callback, ChannelEvent, ChannelPort, PublishParams, Transport,
};

/// Имя канала по умолчанию.
pub const DEFAULT_CHANNEL_NAME: &str = "widget-message-channel";

/// Параметры брокера: имя канала и идентичность контекста.
///
/// Идентичность задаётся явно и должна различаться у независимых
/// контекстов, иначе фильтрация собственных сообщений скроет чужие события.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub channel_name: String,
    pub sender_name: String,
}

/// Счётчики брокера.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Количество успешных вызовов `publish`.
    pub published: AtomicU64,
    /// Корректные входящие события.
    pub received: AtomicU64,
    /// Вызовы обработчиков (включая повторную доставку из журнала).
    pub delivered: AtomicU64,
    /// События, сохранённые в журнал.
    pub stored: AtomicU64,
    /// Входящие события для тем без подписчиков.
    pub dropped_unsubscribed: AtomicU64,
    /// Отброшенные некорректные кадры.
    pub malformed: AtomicU64,
}

/// Брокер Pub/Sub поверх одного порта широковещательного канала.
///
/// Поддерживает:
/// - подписки по точному имени темы с защитой от повторной подписки
/// - журнал темы и повторную доставку поздним подписчикам
/// - фильтрацию событий, отправленных этим же контекстом
///
/// Входящие кадры обрабатывает фоновая задача Tokio. Доступ к реестру
/// сериализован одним reentrant-мьютексом на брокер, поэтому обработчик
/// может вызывать `subscribe`/`publish` этого же брокера.
pub struct MessageBroker {
    inner: Arc<BrokerInner>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

struct BrokerInner {
    channel: Arc<str>,
    sender: Arc<str>,
    port: Arc<dyn ChannelPort>,
    registry: ReentrantMutex<RefCell<TopicRegistry>>,
    closed: AtomicBool,
    stats: BrokerStats,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BrokerOptions {
    /// Параметры с каналом по умолчанию.
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            sender_name: sender_name.into(),
        }
    }

    pub fn channel(
        mut self,
        channel_name: impl Into<String>,
    ) -> Self {
        self.channel_name = channel_name.into();
        self
    }
}

impl BrokerStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn dropped_unsubscribed(&self) -> u64 {
        self.dropped_unsubscribed.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

impl MessageBroker {
    /// Привязывается к каналу и запускает обработку входящих кадров.
    ///
    /// Должен вызываться внутри Tokio runtime.
    pub fn new<T>(
        transport: &T,
        options: BrokerOptions,
    ) -> Result<Self, BrokerError>
    where
        T: Transport + ?Sized,
    {
        let runtime = Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;
        let port = transport.bind(&options.channel_name)?;

        let inner = Arc::new(BrokerInner {
            channel: Arc::from(options.channel_name.as_str()),
            sender: Arc::from(options.sender_name.as_str()),
            port,
            registry: ReentrantMutex::new(RefCell::new(TopicRegistry::default())),
            closed: AtomicBool::new(false),
            stats: BrokerStats::default(),
        });

        let pump = runtime.spawn(run_inbound_pump(inner.clone()));

        info!(
            channel = %inner.channel,
            sender = %inner.sender,
            "Message broker bound"
        );

        Ok(Self {
            inner,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Имя широковещательного канала.
    pub fn channel_name(&self) -> &str {
        &self.inner.channel
    }

    /// Идентичность этого контекста.
    pub fn sender_name(&self) -> &str {
        &self.inner.sender
    }

    pub fn stats(&self) -> &BrokerStats {
        &self.inner.stats
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Подписывает обработчик на тему.
    ///
    /// Возвращает `Ok(false)` без побочных эффектов, если этот обработчик
    /// уже подписан на тему. При первой подписке синхронно передаёт
    /// обработчику сохранённые события темы в порядке поступления, пропуская
    /// события этого же контекста.
    pub fn subscribe(
        &self,
        topic: &str,
        callback: Callback,
    ) -> Result<bool, BrokerError> {
        self.ensure_open()?;

        let guard = self.inner.registry.lock();
        let replay = guard.borrow_mut().register(topic, &callback);
        let Some(replay) = replay else {
            debug!(channel = %self.inner.channel, topic, "Duplicate subscription rejected");
            return Ok(false);
        };

        debug!(
            channel = %self.inner.channel,
            topic,
            replay = replay.len(),
            "Subscribed"
        );

        for event in replay.iter().filter(|e| !self.inner.is_own(e)) {
            self.inner.stats.delivered.fetch_add(1, Ordering::Relaxed);
            callback(event);
        }
        drop(guard);

        Ok(true)
    }

    /// Отписывает обработчик от темы. Возвращает `true`, если он был
    /// подписан.
    pub fn unsubscribe(
        &self,
        topic: &str,
        callback: &Callback,
    ) -> bool {
        let guard = self.inner.registry.lock();
        let removed = guard.borrow_mut().unregister(topic, callback);
        removed
    }

    /// Публикует событие в канал.
    ///
    /// Отправителем становится идентичность брокера, если не задан
    /// `sender_override`. Сам брокер собственное событие не получает.
    pub fn publish(
        &self,
        params: PublishParams,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let event = params.into_event(&self.inner.sender);
        let frame = encode_event(&event)?;
        self.inner.port.post(frame)?;
        self.inner.stats.published.fetch_add(1, Ordering::Relaxed);

        trace!(
            channel = %self.inner.channel,
            topic = %event.topic,
            sender = %event.sender,
            id = event.correlation_id().unwrap_or(""),
            "Published event"
        );
        Ok(())
    }

    /// Количество событий в журнале темы.
    pub fn replay_len(
        &self,
        topic: &str,
    ) -> usize {
        let guard = self.inner.registry.lock();
        let len = guard.borrow().replay_len(topic);
        len
    }

    /// Количество обработчиков темы.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        let guard = self.inner.registry.lock();
        let count = guard.borrow().subscriber_count(topic);
        count
    }

    /// Закрывает привязку к каналу, останавливает обработку входящих
    /// кадров и удаляет подписки вместе с журналом.
    ///
    /// Повторный вызов ничего не делает.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.port.close();

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(channel = %self.inner.channel, error = %e, "Inbound pump ended abnormally");
            }
        }

        {
            let guard = self.inner.registry.lock();
            guard.borrow_mut().clear();
        }

        info!(channel = %self.inner.channel, sender = %self.inner.sender, "Message broker closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed {
                channel: self.inner.channel.to_string(),
            });
        }
        Ok(())
    }
}

impl BrokerInner {
    fn is_own(
        &self,
        event: &ChannelEvent,
    ) -> bool {
        event.sender == *self.sender
    }

    /// Обрабатывает входящее событие: сохраняет в журнал, если у темы есть
    /// подписчики, и передаёт всем обработчикам темы.
    fn handle_inbound(
        &self,
        event: ChannelEvent,
    ) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let guard = self.registry.lock();
        let subscribers = guard.borrow_mut().record(&event);
        let Some(subscribers) = subscribers else {
            self.stats
                .dropped_unsubscribed
                .fetch_add(1, Ordering::Relaxed);
            trace!(channel = %self.channel, topic = %event.topic, "No subscribers, event dropped");
            return;
        };
        self.stats.stored.fetch_add(1, Ordering::Relaxed);

        if self.is_own(&event) {
            trace!(channel = %self.channel, topic = %event.topic, "Own event filtered");
            return;
        }

        for callback in &subscribers {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            callback(&event);
        }
        drop(guard);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Читает кадры порта до его закрытия.
async fn run_inbound_pump(inner: Arc<BrokerInner>) {
    loop {
        match inner.port.next_frame().await {
            Ok(frame) => match decode_event(&frame) {
                Ok(event) => inner.handle_inbound(event),
                Err(e) => {
                    inner.stats.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(channel = %inner.channel, error = %e, "Dropping malformed frame");
                }
            },
            Err(TransportError::Lagged { skipped, .. }) => {
                warn!(channel = %inner.channel, skipped, "Inbound pump lagged, frames lost");
            }
            Err(TransportError::Closed { .. }) => break,
            Err(e) => {
                warn!(channel = %inner.channel, error = %e, "Inbound pump stopped");
                break;
            }
        }
    }
    debug!(channel = %inner.channel, "Inbound pump finished");
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Drop for MessageBroker {
    fn drop(&mut self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.port.close();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
