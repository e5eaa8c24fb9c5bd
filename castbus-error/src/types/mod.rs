pub mod ack;
pub mod broker;
pub mod storage;
pub mod transport;

// Публичный экспорт всех типов ошибок из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use ack::*;
pub use broker::*;
pub use storage::*;
pub use transport::*;
