//! Транспорт: именованный широковещательный канал.
//!
//! Контракт: кадр, отправленный через порт, получают все остальные порты,
//! привязанные к тому же имени канала, но никогда не сам отправитель.
//! Доставка ненадёжная: отстающий получатель теряет кадры.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use castbus_error::TransportError;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, trace};

use super::intern_channel;

/// Ёмкость буфера каждого канала по умолчанию.
pub const DEFAULT_TRANSPORT_CAPACITY: usize = 1024;

/// Фабрика портов именованных каналов.
pub trait Transport: Send + Sync {
    /// Привязывает новый порт к каналу `channel`.
    fn bind(
        &self,
        channel: &str,
    ) -> Result<Arc<dyn ChannelPort>, TransportError>;
}

/// Привязка одного контекста к именованному каналу.
#[async_trait]
pub trait ChannelPort: Send + Sync {
    /// Имя канала.
    fn name(&self) -> &str;

    /// Отправляет кадр всем остальным портам канала.
    fn post(
        &self,
        frame: Bytes,
    ) -> Result<(), TransportError>;

    /// Ожидает следующий кадр от других портов.
    ///
    /// После `close()` возвращает `TransportError::Closed`.
    async fn next_frame(&self) -> Result<Bytes, TransportError>;

    /// Закрывает порт. Повторный вызов ничего не делает.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Внутрипроцессный транспорт на `tokio::sync::broadcast`.
///
/// Каждому имени канала соответствует один `broadcast::Sender`, порты
/// подписываются на него. Кадр помечается идентификатором порта-отправителя,
/// чтобы порт не получал собственные кадры.
#[derive(Clone)]
pub struct LocalTransport {
    channels: Arc<DashMap<Arc<str>, broadcast::Sender<Envelope>>>,
    capacity: usize,
    next_port_id: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    frame: Bytes,
}

struct LocalPort {
    id: u64,
    name: Arc<str>,
    tx: broadcast::Sender<Envelope>,
    /// Приёмник канала. Закрытый порт отдаёт его и перестаёт учитываться
    /// в `port_count`.
    rx: Mutex<Option<broadcast::Receiver<Envelope>>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LocalTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRANSPORT_CAPACITY)
    }

    /// Создаёт транспорт с заданной ёмкостью буфера каждого канала.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            next_port_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Количество каналов, к которым когда-либо привязывались порты.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Количество открытых портов канала.
    ///
    /// Закрытый порт выбывает из подсчёта, как только его приёмник
    /// освобождён: сразу в `close()` или при выходе ожидающего
    /// `next_frame`.
    pub fn port_count(
        &self,
        channel: &str,
    ) -> usize {
        self.channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Transport for LocalTransport {
    fn bind(
        &self,
        channel: &str,
    ) -> Result<Arc<dyn ChannelPort>, TransportError> {
        let name = intern_channel(channel);
        let tx = self
            .channels
            .entry(name.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let id = self.next_port_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown, _) = watch::channel(false);

        debug!(channel = %name, port = id, "Bound transport port");

        Ok(Arc::new(LocalPort {
            id,
            name,
            rx: Mutex::new(Some(tx.subscribe())),
            tx,
            closed: AtomicBool::new(false),
            shutdown,
        }))
    }
}

#[async_trait]
impl ChannelPort for LocalPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(
        &self,
        frame: Bytes,
    ) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed {
                channel: self.name.to_string(),
            });
        }
        // Ошибка send означает отсутствие получателей: кадр просто некому
        // доставить.
        let receivers = self
            .tx
            .send(Envelope {
                origin: self.id,
                frame,
            })
            .unwrap_or(0);
        trace!(channel = %self.name, port = self.id, receivers, "Posted frame");
        Ok(())
    }

    async fn next_frame(&self) -> Result<Bytes, TransportError> {
        let mut shutdown = self.shutdown.subscribe();
        let mut slot = self.rx.lock().await;

        loop {
            if self.is_closed() {
                slot.take();
                return Err(self.closed_error());
            }
            let Some(rx) = slot.as_mut() else {
                return Err(self.closed_error());
            };

            tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                received = rx.recv() => match received {
                    Ok(envelope) if envelope.origin == self.id => continue,
                    Ok(envelope) => return Ok(envelope.frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        return Err(TransportError::Lagged {
                            channel: self.name.to_string(),
                            skipped,
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(self.closed_error()),
                },
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.send_replace(true);
            // Если приёмник занят ожидающим `next_frame`, тот освободит его сам.
            if let Ok(mut slot) = self.rx.try_lock() {
                slot.take();
            }
            debug!(channel = %self.name, port = self.id, "Closed transport port");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl LocalPort {
    fn closed_error(&self) -> TransportError {
        TransportError::Closed {
            channel: self.name.to_string(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
