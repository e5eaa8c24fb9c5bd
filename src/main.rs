use std::sync::Arc;

use anyhow::Context;
use castbus::{
    callback, init_logging, AckBroker, ChannelEvent, LoggingConfig, OutgoingMessage, Settings,
};
use castbus_error::ErrorExt;
use tracing::{error, info, warn};

/// Два контекста на одном канале: `/dashboard` отправляет, `/widgets/chart`
/// подтверждает.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging = init_logging(LoggingConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let settings = Settings::load().context("failed to load settings")?;
    let transport = settings.transport();

    let sender_opts = {
        let mut opts = settings.broker_options();
        opts.sender_name = "/dashboard".into();
        opts
    };
    let receiver_opts = {
        let mut opts = settings.broker_options();
        opts.sender_name = "/widgets/chart".into();
        opts
    };

    let sender = AckBroker::new(&transport, sender_opts, settings.ack_settings())?;
    let receiver = Arc::new(AckBroker::new(
        &transport,
        receiver_opts,
        settings.ack_settings(),
    )?);

    let acker = {
        let receiver = receiver.clone();
        callback(move |event: &ChannelEvent| {
            info!(topic = %event.topic, sender = %event.sender, message = %event.message, "Received");
            if let Err(e) = receiver.received(event) {
                warn!(error = %e, "Failed to acknowledge");
            }
        })
    };
    receiver.broker().subscribe("refresh", acker)?;

    for n in 1..=3 {
        match sender
            .send(OutgoingMessage::new("refresh", format!("tick {n}")))
            .await
        {
            Ok(ack) => info!(id = %ack.id, by = %ack.sender, "Delivered"),
            Err(e) if e.status_code().is_critical() => {
                error!(error = %e, code = e.status_code().code(), "Delivery aborted");
                break;
            }
            Err(e) => warn!(
                error = %e,
                code = e.status_code().code(),
                retryable = e.status_code().is_retryable(),
                "Delivery failed"
            ),
        }
    }

    receiver.close().await?;
    sender.close().await?;

    logging.shutdown();
    Ok(())
}
