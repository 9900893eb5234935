//! Relay Subscriber
//!
//! Holds the process-lifetime subscribe connection and feeds delivered
//! messages to the gateway's broadcast handler.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RelaySettings;
use crate::domain::ChatMessage;
use crate::shared::error::AppError;

/// Subscribing half of the pub/sub relay.
///
/// Owns a dedicated pub/sub connection, established at process start and
/// re-established with capped exponential backoff when lost. Once the retry
/// cap is exhausted the subscriber gives up and the task exits; the process
/// keeps serving its local clients without cross-process fan-out.
pub struct RelaySubscriber {
    client: redis::Client,
    settings: RelaySettings,
}

impl RelaySubscriber {
    pub fn new(settings: RelaySettings) -> Result<Self, AppError> {
        let client = redis::Client::open(settings.url.as_str())?;
        Ok(Self { client, settings })
    }

    /// Run the subscription loop until shutdown.
    ///
    /// Each delivered message is deserialized and handed to `on_message`
    /// exactly once; malformed payloads are logged and discarded.
    pub async fn run<F>(self, mut on_message: F, mut shutdown: watch::Receiver<bool>)
    where
        F: FnMut(ChatMessage) + Send,
    {
        let mut attempts: u32 = 0;

        loop {
            match self
                .subscribe_loop(&mut on_message, &mut shutdown, &mut attempts)
                .await
            {
                Ok(()) => {
                    info!("Relay subscriber stopped");
                    return;
                }
                Err(e) => {
                    if attempts >= self.settings.reconnect_max_retries {
                        error!(
                            error = %e,
                            attempts,
                            "Relay connection unavailable, giving up"
                        );
                        return;
                    }

                    let delay = backoff_delay(
                        attempts,
                        self.settings.reconnect_base_delay_ms,
                        self.settings.reconnect_max_delay_ms,
                    );
                    attempts += 1;
                    warn!(
                        error = %e,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Relay connection lost, reconnecting"
                    );

                    tokio::select! {
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn subscribe_loop<F>(
        &self,
        on_message: &mut F,
        shutdown: &mut watch::Receiver<bool>,
        attempts: &mut u32,
    ) -> Result<(), AppError>
    where
        F: FnMut(ChatMessage) + Send,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.settings.channel).await?;
        // A successful subscribe resets the backoff sequence
        *attempts = 0;
        info!(channel = %self.settings.channel, "Subscribed to relay channel");

        let mut messages = pubsub.on_message();

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                msg = messages.next() => {
                    let Some(msg) = msg else {
                        return Err(AppError::Internal(
                            "relay subscription stream ended".into(),
                        ));
                    };
                    let payload: String = msg.get_payload()?;
                    match serde_json::from_str::<ChatMessage>(&payload) {
                        Ok(chat) => on_message(chat),
                        Err(e) => warn!(error = %e, "Discarding malformed relay payload"),
                    }
                }
            }
        }
    }
}

/// Exponential backoff delay for reconnect attempt `attempt`, capped at
/// `max_ms`.
fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay = base_ms.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(delay.min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0, 250, 30_000), Duration::from_millis(250));
        assert_eq!(backoff_delay(1, 250, 30_000), Duration::from_millis(500));
        assert_eq!(backoff_delay(2, 250, 30_000), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(10, 250, 30_000), Duration::from_millis(30_000));
        // Large attempt counts must not overflow
        assert_eq!(backoff_delay(u32::MAX, 250, 30_000), Duration::from_millis(30_000));
    }
}
