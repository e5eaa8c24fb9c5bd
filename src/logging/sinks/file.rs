use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Файловый слой с неблокирующей записью.
///
/// Возвращает `WorkerGuard`: пока он жив, фоновый поток сбрасывает буфер
/// в файл.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = if config.file.daily_rotation {
        rolling::daily(&config.log_dir, &config.file.filename)
    } else {
        rolling::never(&config.log_dir, &config.file.filename)
    };
    let (writer, guard) = non_blocking(appender);

    let layer = formatter::build_formatter(&config.console, config.format, false, writer);
    (layer, guard)
}
