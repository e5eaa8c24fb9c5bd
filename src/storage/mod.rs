//! Типизированное key/value хранилище контекста.
//!
//! Значения хранятся как JSON-строки. Ошибки сериализации и разбора не
//! пробрасываются: они логируются, запись пропускается, чтение даёт `None`.

use castbus_error::StorageError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, trace};

/// Общее хранилище процесса для [`StorageKind::Local`].
static LOCAL_STORE: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

/// Область видимости хранилища.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Одно хранилище на весь процесс, общее для всех менеджеров.
    Local,
    /// Собственное хранилище экземпляра менеджера.
    #[default]
    Session,
}

#[derive(Debug, Default)]
pub struct StorageManager {
    kind: StorageKind,
    session: DashMap<String, String>,
}

impl StorageManager {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            session: DashMap::new(),
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    fn store(&self) -> &DashMap<String, String> {
        match self.kind {
            StorageKind::Local => &LOCAL_STORE,
            StorageKind::Session => &self.session,
        }
    }

    /// Читает и разбирает значение. Отсутствующий ключ, пустая строка и
    /// ошибка разбора дают `None`.
    pub fn get_item<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        let raw = self.store().get(key)?.value().clone();
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = StorageError::Deserialize {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                error!(error = %err, "Failed to parse item from storage");
                None
            }
        }
    }

    /// Сериализует и сохраняет значение. При ошибке сериализации прежнее
    /// значение ключа не меняется.
    pub fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) {
        match serde_json::to_string(value) {
            Ok(serialized) => {
                trace!(key, kind = ?self.kind, "Storage item set");
                self.store().insert(key.to_string(), serialized);
            }
            Err(e) => {
                let err = StorageError::Serialize {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                error!(error = %err, "Failed to serialize item for storage");
            }
        }
    }

    pub fn remove_item(
        &self,
        key: &str,
    ) {
        self.store().remove(key);
    }

    pub fn clear(&self) {
        self.store().clear();
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }
}
