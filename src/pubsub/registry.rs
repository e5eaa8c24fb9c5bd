use std::{collections::HashMap, sync::Arc};

use super::ChannelEvent;

/// Обработчик событий темы.
///
/// Идентичность обработчика — адрес `Arc`: повторная подписка того же
/// `Arc` на ту же тему отклоняется, клон `Arc` считается тем же
/// обработчиком.
pub type Callback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Оборачивает замыкание в [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&ChannelEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Реестр подписок и журнал повторной доставки одного брокера.
///
/// Журнал темы пополняется только пока у темы есть подписчики, растёт
/// без ограничений до закрытия брокера. Имена тем принадлежат реестру и
/// освобождаются вместе с ним.
#[derive(Default)]
pub(crate) struct TopicRegistry {
    subscribers: HashMap<String, Vec<Callback>>,
    replay: HashMap<String, Vec<ChannelEvent>>,
}

impl TopicRegistry {
    /// Регистрирует обработчик.
    ///
    /// Возвращает `None`, если этот обработчик уже подписан на тему, иначе
    /// снимок журнала темы в порядке поступления.
    pub(crate) fn register(
        &mut self,
        topic: &str,
        callback: &Callback,
    ) -> Option<Vec<ChannelEvent>> {
        let subs = self.subscribers.entry(topic.to_string()).or_default();
        if subs.iter().any(|existing| Arc::ptr_eq(existing, callback)) {
            return None;
        }
        subs.push(callback.clone());

        Some(self.replay.get(topic).cloned().unwrap_or_default())
    }

    /// Удаляет обработчик. Возвращает `true`, если он был подписан.
    pub(crate) fn unregister(
        &mut self,
        topic: &str,
        callback: &Callback,
    ) -> bool {
        let Some(subs) = self.subscribers.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|existing| !Arc::ptr_eq(existing, callback));
        before != subs.len()
    }

    pub(crate) fn has_subscribers(
        &self,
        topic: &str,
    ) -> bool {
        self.subscriber_count(topic) > 0
    }

    pub(crate) fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.subscribers.get(topic).map(Vec::len).unwrap_or(0)
    }

    /// Сохраняет входящее событие и возвращает снимок обработчиков темы.
    ///
    /// Если у темы нет подписчиков, событие не сохраняется и возвращается
    /// `None`.
    pub(crate) fn record(
        &mut self,
        event: &ChannelEvent,
    ) -> Option<Vec<Callback>> {
        let subs = self.subscribers.get(event.topic.as_str())?;
        if subs.is_empty() {
            return None;
        }
        let snapshot = subs.clone();

        self.replay
            .entry(event.topic.clone())
            .or_default()
            .push(event.clone());

        Some(snapshot)
    }

    pub(crate) fn replay_len(
        &self,
        topic: &str,
    ) -> usize {
        self.replay.get(topic).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
        self.replay.clear();
    }
}
