//! Доставка с подтверждением поверх [`MessageBroker`].
//!
//! Каждая отправка проходит состояния `Pending` → `Acknowledged` или
//! `Pending` → `Exhausted` (а при закрытии брокера `Pending` → `Cancelled`).
//! Из конечного состояния возврата нет.
//!
//! Получатель подтверждает событие вызовом [`AckBroker::received`], который
//! публикует эхо с тем же `id` и `needs_ack == true` в ту же тему. Отправитель
//! ловит эхо своей подпиской на тему и завершает ожидание.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use castbus_error::AckError;
use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use super::{
    callback, AckEvent, BrokerOptions, Callback, ChannelEvent, CorrelationIds, MessageBroker,
    PublishParams, Transport,
};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1500);
/// Нижняя граница периода повторов: нулевой период у `interval` недопустим.
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Параметры повторов.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckSettings {
    /// Сколько раз повторить публикацию до отказа.
    pub retry_attempts: u32,
    /// Период между повторами.
    pub retry_interval: Duration,
}

#[derive(Debug, Default)]
pub struct AckSettingsBuilder {
    retry_attempts: Option<u32>,
    retry_interval: Option<Duration>,
}

/// Сообщение для отправки с подтверждением.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub message: String,
    /// Отправитель в локальной копии события. По умолчанию имя канала.
    /// На провод не попадает.
    pub sender: Option<String>,
    /// Отправитель на проводе вместо идентичности брокера.
    pub sender_override: Option<String>,
}

/// Состояние одной отправки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Acknowledged,
    Exhausted,
    Cancelled,
}

/// Брокер доставки «хотя бы один раз» с ограниченным числом повторов.
pub struct AckBroker {
    broker: Arc<MessageBroker>,
    owns_broker: bool,
    settings: AckSettings,
    pending: PendingTable,
    ids: CorrelationIds,
    closed: AtomicBool,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingSend>>>;

struct PendingSend {
    state: DeliveryState,
    settle: Option<oneshot::Sender<Settlement>>,
}

enum Settlement {
    Acknowledged(AckEvent),
    Cancelled,
}

/// Освобождает запись ожидания и подписку отправки при любом выходе из
/// `send`, включая отмену future.
struct InFlight {
    pending: PendingTable,
    broker: Arc<MessageBroker>,
    topic: String,
    listener: Callback,
    id: String,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AckSettings {
    pub fn builder() -> AckSettingsBuilder {
        AckSettingsBuilder::default()
    }
}

impl AckSettingsBuilder {
    pub fn retry_attempts(
        mut self,
        attempts: u32,
    ) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn build(self) -> AckSettings {
        let default = AckSettings::default();
        AckSettings {
            retry_attempts: self.retry_attempts.unwrap_or(default.retry_attempts),
            retry_interval: self.retry_interval.unwrap_or(default.retry_interval),
        }
    }
}

impl OutgoingMessage {
    pub fn new(
        topic: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            sender: None,
            sender_override: None,
        }
    }

    pub fn sender(
        mut self,
        sender: impl Into<String>,
    ) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn sender_override(
        mut self,
        sender: impl Into<String>,
    ) -> Self {
        self.sender_override = Some(sender.into());
        self
    }
}

impl PendingSend {
    fn new(settle: oneshot::Sender<Settlement>) -> Self {
        Self {
            state: DeliveryState::Pending,
            settle: Some(settle),
        }
    }
}

impl AckBroker {
    /// Создаёт брокер вместе с собственным [`MessageBroker`], который будет
    /// закрыт в [`AckBroker::close`].
    pub fn new<T>(
        transport: &T,
        options: BrokerOptions,
        settings: AckSettings,
    ) -> Result<Self, AckError>
    where
        T: Transport + ?Sized,
    {
        let broker = MessageBroker::new(transport, options)?;
        Ok(Self::build(Arc::new(broker), true, settings))
    }

    /// Оборачивает внешний брокер. `close` его не закрывает.
    pub fn with_broker(
        broker: Arc<MessageBroker>,
        settings: AckSettings,
    ) -> Self {
        Self::build(broker, false, settings)
    }

    fn build(
        broker: Arc<MessageBroker>,
        owns_broker: bool,
        settings: AckSettings,
    ) -> Self {
        Self {
            broker,
            owns_broker,
            settings,
            pending: Arc::new(Mutex::new(HashMap::new())),
            ids: CorrelationIds::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    pub fn settings(&self) -> &AckSettings {
        &self.settings
    }

    /// Количество незавершённых отправок.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Состояние отправки, пока она не завершилась.
    pub fn state_of(
        &self,
        id: &str,
    ) -> Option<DeliveryState> {
        self.pending.lock().get(id).map(|entry| entry.state)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Отправляет сообщение и ждёт подтверждения.
    ///
    /// Публикует событие с новым `id`, затем каждые `retry_interval`
    /// повторяет публикацию, пока не придёт подтверждение. После
    /// `retry_attempts` повторов следующий тик завершает отправку ошибкой
    /// [`AckError::Exhausted`]. Подтверждение, пришедшее одновременно с
    /// тиком, имеет приоритет.
    pub async fn send(
        &self,
        outgoing: OutgoingMessage,
    ) -> Result<AckEvent, AckError> {
        self.ensure_open()?;

        let id = self.ids.next_id();
        // Локальная копия помечается именем канала; на проводе отправителя
        // ставит брокер (своя идентичность или `sender_override`).
        let event = AckEvent {
            topic: outgoing.topic,
            sender: outgoing
                .sender
                .unwrap_or_else(|| self.broker.channel_name().to_string()),
            message: outgoing.message,
            id: id.clone(),
            needs_ack: true,
        };
        let mut params = PublishParams::from(&event);
        params.sender_override = outgoing.sender_override;

        let (settle_tx, mut settle_rx) = oneshot::channel();
        {
            // `close` выставляет флаг под этой же блокировкой: запись либо
            // попадёт в отмену, либо не будет вставлена.
            let mut table = self.pending.lock();
            self.ensure_open()?;
            table.insert(id.clone(), PendingSend::new(settle_tx));
        }

        let listener = ack_listener(self.pending.clone(), id.clone());
        let _in_flight = InFlight {
            pending: self.pending.clone(),
            broker: self.broker.clone(),
            topic: event.topic.clone(),
            listener: listener.clone(),
            id: id.clone(),
        };

        self.broker.subscribe(&event.topic, listener)?;
        self.broker.publish(params.clone())?;
        debug!(id = %id, topic = %event.topic, "Sent message awaiting acknowledgement");

        let period = self.settings.retry_interval.max(MIN_RETRY_INTERVAL);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retries = 0u32;

        loop {
            tokio::select! {
                biased;
                settled = &mut settle_rx => {
                    return match settled {
                        Ok(Settlement::Acknowledged(ack)) => {
                            debug!(id = %id, retries, "Message acknowledged");
                            Ok(ack.resolved())
                        }
                        Ok(Settlement::Cancelled) | Err(_) => {
                            debug!(id = %id, "Delivery cancelled");
                            Err(AckError::Cancelled { id })
                        }
                    };
                }
                _ = ticker.tick() => {
                    if self.state_of(&id) != Some(DeliveryState::Pending) {
                        continue;
                    }
                    if retries < self.settings.retry_attempts {
                        retries += 1;
                        trace!(id = %id, retry = retries, "Retrying unacknowledged message");
                        self.broker.publish(params.clone())?;
                    } else {
                        self.transition(&id, DeliveryState::Exhausted);
                        warn!(id = %id, attempts = retries, "Failed to receive acknowledgement");
                        return Err(AckError::Exhausted { id, attempts: retries });
                    }
                }
            }
        }
    }

    /// Подтверждает входящее событие: публикует его эхо в ту же тему.
    ///
    /// События без `id` или с `needs_ack == false` игнорируются.
    pub fn received(
        &self,
        event: &ChannelEvent,
    ) -> Result<(), AckError> {
        let Some(header) = event
            .ack
            .as_ref()
            .filter(|h| h.needs_ack && !h.id.is_empty())
        else {
            trace!(topic = %event.topic, "Nothing to acknowledge");
            return Ok(());
        };
        self.ensure_open()?;

        self.broker.publish(
            PublishParams::new(event.topic.clone(), event.message.clone()).ack(header.clone()),
        )?;
        debug!(id = %header.id, topic = %event.topic, "Acknowledgement published");
        Ok(())
    }

    /// Отменяет все незавершённые отправки (`AckError::Cancelled`) и
    /// закрывает собственный брокер.
    ///
    /// Повторный вызов ничего не делает.
    pub async fn close(&self) -> Result<(), AckError> {
        let cancelled = {
            let mut table = self.pending.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            let mut cancelled = 0usize;
            for entry in table.values_mut() {
                if entry.state != DeliveryState::Pending {
                    continue;
                }
                entry.state = DeliveryState::Cancelled;
                if let Some(settle) = entry.settle.take() {
                    let _ = settle.send(Settlement::Cancelled);
                    cancelled += 1;
                }
            }
            cancelled
        };

        info!(
            channel = %self.broker.channel_name(),
            cancelled,
            "Ack broker closing"
        );

        if self.owns_broker {
            self.broker.close().await?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), AckError> {
        if self.is_closed() {
            return Err(AckError::Closed {
                channel: self.broker.channel_name().to_string(),
            });
        }
        Ok(())
    }

    fn transition(
        &self,
        id: &str,
        state: DeliveryState,
    ) {
        if let Some(entry) = self.pending.lock().get_mut(id) {
            entry.state = state;
            entry.settle = None;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Подписка отправки: ловит эхо с тем же `id` и `needs_ack == true`.
fn ack_listener(
    pending: PendingTable,
    id: String,
) -> Callback {
    callback(move |event: &ChannelEvent| {
        let Some(header) = &event.ack else {
            return;
        };
        if header.id != id || !header.needs_ack {
            return;
        }

        let mut table = pending.lock();
        let Some(entry) = table.get_mut(&id) else {
            return;
        };
        if entry.state != DeliveryState::Pending {
            return;
        }
        entry.state = DeliveryState::Acknowledged;

        if let (Some(settle), Ok(ack)) = (entry.settle.take(), AckEvent::try_from(event.clone())) {
            let _ = settle.send(Settlement::Acknowledged(ack));
        }
    })
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for AckSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
        self.broker.unsubscribe(&self.topic, &self.listener);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::pubsub::LocalTransport;

    fn fast_settings() -> AckSettings {
        AckSettings::builder()
            .retry_attempts(3)
            .retry_interval(Duration::from_millis(50))
            .build()
    }

    fn ack_broker(
        transport: &LocalTransport,
        sender: &str,
    ) -> AckBroker {
        AckBroker::new(transport, BrokerOptions::new(sender), fast_settings()).unwrap()
    }

    /// Наблюдатель, собирающий `id` всех событий темы.
    fn spy(
        transport: &LocalTransport,
        topic: &str,
    ) -> (MessageBroker, Arc<Mutex<Vec<String>>>) {
        let broker = MessageBroker::new(transport, BrokerOptions::new("/spy")).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        broker
            .subscribe(
                topic,
                callback(move |ev: &ChannelEvent| {
                    if let Some(id) = ev.correlation_id() {
                        sink.lock().push(id.to_string());
                    }
                }),
            )
            .unwrap();
        (broker, seen)
    }

    #[test]
    fn test_default_settings() {
        let settings = AckSettings::default();
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_interval, Duration::from_millis(1500));

        let partial = AckSettings::builder().retry_attempts(5).build();
        assert_eq!(partial.retry_attempts, 5);
        assert_eq!(partial.retry_interval, Duration::from_millis(1500));
    }

    /// Тест проверяет успешную отправку: получатель подтверждает, `send`
    /// возвращает эхо со снятым `needs_ack` и тем же `id`.
    #[tokio::test(start_paused = true)]
    async fn test_send_resolves_on_acknowledgement() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let receiver = Arc::new(ack_broker(&transport, "/widget-b"));

        let acker = {
            let receiver = receiver.clone();
            callback(move |ev: &ChannelEvent| {
                receiver.received(ev).unwrap();
            })
        };
        receiver.broker().subscribe("orders", acker).unwrap();

        let ack = sender
            .send(OutgoingMessage::new("orders", "42"))
            .await
            .unwrap();

        assert!(!ack.needs_ack);
        assert_eq!(ack.topic, "orders");
        assert_eq!(ack.message, "42");
        assert_eq!(ack.sender, "/widget-b");
        assert!(ack.id.starts_with(sender.ids.token()));
        assert_eq!(sender.pending_count(), 0);
        assert_eq!(sender.broker().subscriber_count("orders"), 0);

        receiver.close().await.unwrap();
        sender.close().await.unwrap();
    }

    /// Тест проверяет исчерпание повторов: 1 публикация + 3 повтора, затем
    /// ошибка с `id` отправки.
    #[tokio::test(start_paused = true)]
    async fn test_send_exhausts_after_retries() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let (_spy, seen) = spy(&transport, "orders");

        let started = Instant::now();
        let err = sender
            .send(OutgoingMessage::new("orders", "42"))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        let AckError::Exhausted { id, attempts } = err else {
            panic!("expected Exhausted, got {err:?}");
        };
        assert_eq!(attempts, 3);
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed <= Duration::from_millis(250));

        time::sleep(Duration::from_millis(10)).await;
        let publishes = seen.lock().iter().filter(|seen_id| **seen_id == id).count();
        assert_eq!(publishes, 4);
        assert_eq!(sender.pending_count(), 0);
    }

    /// Тест проверяет, что после подтверждения повторы прекращаются.
    #[tokio::test(start_paused = true)]
    async fn test_no_retry_after_acknowledgement() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let receiver = Arc::new(ack_broker(&transport, "/widget-b"));
        let (_spy, seen) = spy(&transport, "orders");

        // Подтверждаем только вторую копию (первый повтор).
        let deliveries = Arc::new(AtomicUsize::new(0));
        let acker = {
            let receiver = receiver.clone();
            let deliveries = deliveries.clone();
            callback(move |ev: &ChannelEvent| {
                if !ev.wants_ack() || ev.sender != "/widget-a" {
                    return;
                }
                if deliveries.fetch_add(1, Ordering::SeqCst) == 1 {
                    receiver.received(ev).unwrap();
                }
            })
        };
        receiver.broker().subscribe("orders", acker).unwrap();

        let ack = sender
            .send(OutgoingMessage::new("orders", "42"))
            .await
            .unwrap();

        time::sleep(Duration::from_millis(500)).await;

        let from_sender = seen.lock().iter().filter(|id| **id == ack.id).count();
        // Две публикации отправителя и одно эхо получателя.
        assert_eq!(from_sender, 3);
        assert_eq!(deliveries.load(Ordering::SeqCst), 2);

        receiver.close().await.unwrap();
    }

    /// Тест проверяет, что `received` игнорирует события без заголовка
    /// подтверждения или с `needs_ack == false`.
    #[tokio::test(start_paused = true)]
    async fn test_received_ignores_non_ack_events() {
        let transport = LocalTransport::new();
        let receiver = ack_broker(&transport, "/widget-b");
        let (spy, _seen) = spy(&transport, "orders");

        receiver
            .received(&ChannelEvent::new("orders", "/widget-a", "plain"))
            .unwrap();
        receiver
            .received(&ChannelEvent::new("orders", "/widget-a", "done").with_ack("x-1", false))
            .unwrap();
        receiver
            .received(&ChannelEvent::new("orders", "/widget-a", "empty").with_ack("", true))
            .unwrap();

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(receiver.broker().stats().published(), 0);
        assert_eq!(spy.stats().received(), 0);
    }

    /// Тест проверяет, что close отменяет незавершённые отправки сразу,
    /// не дожидаясь исчерпания повторов.
    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_in_flight_send() {
        let transport = LocalTransport::new();
        let sender = Arc::new(ack_broker(&transport, "/widget-a"));

        let task = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.send(OutgoingMessage::new("orders", "42")).await })
        };
        while sender.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let started = Instant::now();
        sender.close().await.unwrap();
        let res = task.await.unwrap();

        assert!(matches!(res, Err(AckError::Cancelled { .. })));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(sender.broker().is_closed());
        assert!(matches!(
            sender.send(OutgoingMessage::new("orders", "late")).await,
            Err(AckError::Closed { .. })
        ));
    }

    /// Тест проверяет состояние отправки, пока она ждёт подтверждения.
    #[tokio::test(start_paused = true)]
    async fn test_state_of_pending_send() {
        let transport = LocalTransport::new();
        let sender = Arc::new(ack_broker(&transport, "/widget-a"));
        let first_id = format!("{}-0", sender.ids.token());

        let task = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.send(OutgoingMessage::new("orders", "42")).await })
        };
        while sender.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(sender.state_of(&first_id), Some(DeliveryState::Pending));
        assert_eq!(sender.state_of("unknown"), None);

        let res = task.await.unwrap();
        assert!(matches!(res, Err(AckError::Exhausted { ref id, .. }) if *id == first_id));
        assert_eq!(sender.state_of(&first_id), None);
    }

    /// Тест проверяет, что внешний брокер не закрывается вместе с
    /// `AckBroker`.
    #[tokio::test(start_paused = true)]
    async fn test_external_broker_survives_close() {
        let transport = LocalTransport::new();
        let shared = Arc::new(
            MessageBroker::new(&transport, BrokerOptions::new("/widget-a")).unwrap(),
        );
        let ack = AckBroker::with_broker(shared.clone(), fast_settings());

        ack.close().await.unwrap();
        assert!(ack.is_closed());
        assert!(!shared.is_closed());
        shared.publish(PublishParams::new("orders", "still open")).unwrap();
    }

    /// Тест проверяет, что отменённый future освобождает запись ожидания
    /// и подписку.
    #[tokio::test(start_paused = true)]
    async fn test_dropped_send_releases_resources() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");

        let res = time::timeout(
            Duration::from_millis(75),
            sender.send(OutgoingMessage::new("orders", "42")),
        )
        .await;
        assert!(res.is_err());

        assert_eq!(sender.pending_count(), 0);
        assert_eq!(sender.broker().subscriber_count("orders"), 0);
    }

    /// Наблюдатель, собирающий отправителей всех событий темы.
    fn sender_spy(
        transport: &LocalTransport,
        topic: &str,
    ) -> (MessageBroker, Arc<Mutex<Vec<String>>>) {
        let observer = MessageBroker::new(transport, BrokerOptions::new("/observer")).unwrap();
        let senders = Arc::new(Mutex::new(Vec::new()));
        let sink = senders.clone();
        observer
            .subscribe(
                topic,
                callback(move |ev: &ChannelEvent| sink.lock().push(ev.sender.clone())),
            )
            .unwrap();
        (observer, senders)
    }

    /// Тест проверяет, что `sender` помечает только локальную копию: на
    /// проводе остаётся идентичность брокера.
    #[tokio::test(start_paused = true)]
    async fn test_local_sender_label_stays_off_the_wire() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let (_observer, senders) = sender_spy(&transport, "orders");

        let _ = time::timeout(
            Duration::from_millis(10),
            sender.send(OutgoingMessage::new("orders", "42").sender("/checkout")),
        )
        .await;
        time::sleep(Duration::from_millis(5)).await;

        assert_eq!(senders.lock().as_slice(), ["/widget-a".to_string()]);
    }

    /// Тест проверяет, что метка `sender`, совпадающая с идентичностью
    /// получателя, не мешает ему принять и подтвердить событие.
    #[tokio::test(start_paused = true)]
    async fn test_sender_label_matching_peer_is_delivered() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let receiver = Arc::new(ack_broker(&transport, "/widget-b"));

        let acker = {
            let receiver = receiver.clone();
            callback(move |ev: &ChannelEvent| {
                receiver.received(ev).unwrap();
            })
        };
        receiver.broker().subscribe("orders", acker).unwrap();

        let ack = sender
            .send(OutgoingMessage::new("orders", "42").sender("/widget-b"))
            .await
            .unwrap();
        assert_eq!(ack.sender, "/widget-b");
        assert_eq!(ack.message, "42");

        receiver.close().await.unwrap();
        sender.close().await.unwrap();
    }

    /// Тест проверяет `sender_override`: он уходит на провод вместо
    /// идентичности брокера.
    #[tokio::test(start_paused = true)]
    async fn test_sender_override_is_used_on_the_wire() {
        let transport = LocalTransport::new();
        let sender = ack_broker(&transport, "/widget-a");
        let (_observer, senders) = sender_spy(&transport, "orders");

        let _ = time::timeout(
            Duration::from_millis(10),
            sender.send(OutgoingMessage::new("orders", "42").sender_override("/checkout")),
        )
        .await;
        time::sleep(Duration::from_millis(5)).await;

        assert_eq!(senders.lock().as_slice(), ["/checkout".to_string()]);
    }

    /// Тест проверяет, что после закрытия обёртки над внешним брокером
    /// отправка не оставляет записей ожидания и подписок.
    #[tokio::test(start_paused = true)]
    async fn test_send_after_close_on_shared_broker_leaves_nothing() {
        let transport = LocalTransport::new();
        let shared = Arc::new(
            MessageBroker::new(&transport, BrokerOptions::new("/widget-a")).unwrap(),
        );
        let ack = AckBroker::with_broker(shared.clone(), fast_settings());
        ack.close().await.unwrap();

        let res = ack.send(OutgoingMessage::new("orders", "42")).await;

        assert!(matches!(res, Err(AckError::Closed { .. })));
        assert_eq!(ack.pending_count(), 0);
        assert_eq!(shared.subscriber_count("orders"), 0);
        assert_eq!(shared.stats().published(), 0);
    }

    /// Тест проверяет гонку отправок с закрытием на внешнем брокере: каждая
    /// отправка завершается `Cancelled` или `Closed`, таблица пуста.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_send_racing_close_is_always_settled() {
        let transport = LocalTransport::new();
        let shared = Arc::new(
            MessageBroker::new(&transport, BrokerOptions::new("/widget-a")).unwrap(),
        );
        let ack = Arc::new(AckBroker::with_broker(
            shared,
            AckSettings::builder()
                .retry_attempts(1000)
                .retry_interval(Duration::from_secs(1))
                .build(),
        ));

        let tasks: Vec<_> = (0..32)
            .map(|n| {
                let ack = ack.clone();
                tokio::spawn(async move {
                    ack.send(OutgoingMessage::new("orders", n.to_string()))
                        .await
                })
            })
            .collect();
        tokio::task::yield_now().await;
        ack.close().await.unwrap();

        for task in tasks {
            let res = time::timeout(Duration::from_secs(5), task)
                .await
                .expect("send must settle after close")
                .unwrap();
            assert!(
                matches!(res, Err(AckError::Cancelled { .. }) | Err(AckError::Closed { .. })),
                "got {res:?}"
            );
        }
        assert_eq!(ack.pending_count(), 0);
    }
}
