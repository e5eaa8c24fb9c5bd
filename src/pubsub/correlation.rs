use std::sync::atomic::{AtomicU64, Ordering};

/// Длина случайного префикса экземпляра.
const TOKEN_LEN: usize = 8;

/// Генератор идентификаторов корреляции.
///
/// Формат `<token>-<counter>`: случайный алфавитно-цифровой префикс
/// экземпляра и монотонный счётчик в hex. В пределах одного генератора
/// идентификаторы не повторяются, префикс разводит разные брокеры.
#[derive(Debug)]
pub struct CorrelationIds {
    token: String,
    next: AtomicU64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        let token: String = (0..TOKEN_LEN).map(|_| fastrand::alphanumeric()).collect();
        Self::with_token(token)
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Следующий идентификатор.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n:x}", self.token)
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}
