/// Process settings loading.
pub mod config;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Pub/Sub between execution contexts: transport, MessageBroker, AckBroker.
pub mod pubsub;
/// Typed key/value storage for context state.
pub mod storage;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Error types shared by all layers.
pub use castbus_error::{AckError, BrokerError, StorageError, TransportError};
/// config
pub use config::Settings;
/// Logging initialization.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    callback, AckBroker, AckEvent, AckSettings, BrokerOptions, Callback, ChannelEvent,
    DeliveryState, LocalTransport, MessageBroker, OutgoingMessage, PublishParams, Transport,
};
/// Storage API.
pub use storage::{StorageKind, StorageManager};
