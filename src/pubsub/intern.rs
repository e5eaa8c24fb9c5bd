use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул `Arc<str>` для имён каналов транспорта.
/// Одно имя разделяется всеми портами процесса. Имена тем сюда не попадают:
/// их держит реестр брокера.
static NAME_INTERN: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для имени канала.
#[inline(always)]
pub(crate) fn intern_channel<S: AsRef<str>>(name: S) -> Arc<str> {
    let key = name.as_ref();
    if let Some(existing) = NAME_INTERN.get(key) {
        return existing.clone();
    }
    NAME_INTERN
        .entry(key.to_string())
        .or_insert_with(|| Arc::from(key))
        .clone()
}

#[cfg(test)]
pub(crate) fn is_interned(name: &str) -> bool {
    NAME_INTERN.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Проверяет, что повторный вызов возвращает тот же объект.
    #[test]
    fn intern_returns_same_arc() {
        let a1 = intern_channel("widget-message-channel");
        let a2 = intern_channel(String::from("widget-message-channel"));
        assert_eq!(&*a1, "widget-message-channel");
        assert!(Arc::ptr_eq(&a1, &a2));
    }

    #[test]
    fn intern_different_names() {
        let a1 = intern_channel("alpha");
        let a2 = intern_channel("beta");
        assert!(!Arc::ptr_eq(&a1, &a2));
    }

    /// Проверяет, что конкурентные вызовы для одного имени получают
    /// один и тот же `Arc<str>`.
    #[test]
    fn intern_concurrent() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| intern_channel("shared-channel")))
            .collect();
        let arcs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for arc in &arcs[1..] {
            assert!(Arc::ptr_eq(&arcs[0], arc));
        }
    }
}
