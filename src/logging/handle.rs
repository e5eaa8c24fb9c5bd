use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления жизненным циклом логирования.
///
/// Держит guard файлового вывода: при его освобождении фоновый поток
/// дописывает буфер в файл.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    shutdown: AtomicBool,
    flush_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            shutdown: AtomicBool::new(false),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Завершает логирование, сбрасывая файловый буфер.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!("Logging shutdown initiated");
        drop(self.file_guard.take());
    }

    /// Асинхронный вариант `shutdown`: сброс буфера выполняется в
    /// блокирующем потоке и ограничен `flush_timeout`.
    pub async fn shutdown_async(mut self) {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!(
            timeout_ms = self.flush_timeout.as_millis() as u64,
            "Async logging shutdown initiated"
        );

        let guard = self.file_guard.take();
        match tokio::time::timeout(
            self.flush_timeout,
            tokio::task::spawn_blocking(move || drop(guard)),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                self.flush_timeout.as_millis()
            ),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.is_shutdown_in_progress() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            );
        }
    }
}
