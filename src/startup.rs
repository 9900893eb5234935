//! Application Startup
//!
//! Application building, background task wiring, and server initialization.
//!
//! All connections (database pool, relay publish/subscribe, stream
//! producer/consumer) are owned here, created at startup and released on
//! shutdown through a watch-channel signal observed by the background tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::domain::ChatMessage;
use crate::infrastructure::{database, metrics, relay, stream};
use crate::infrastructure::relay::{RelayPublisher, RelaySubscriber};
use crate::infrastructure::repositories::PgMessageRepository;
use crate::infrastructure::stream::{StreamConsumer, StreamProducer};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{Gateway, ServerEvent};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: ConnectionManager,
    pub relay: RelayPublisher,
    pub gateway: Arc<Gateway>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    shutdown_tx: watch::Sender<bool>,
    subscriber_task: JoinHandle<()>,
    consumer_task: JoinHandle<()>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        crate::presentation::http::handlers::health::init_server_start();

        // Create database pool and apply migrations
        let db = database::create_pool(&settings.database).await?;
        database::run_migrations(&db).await?;
        tracing::info!("Database connection pool created");

        // Create relay connections (publish via the shared manager,
        // subscribe via its own dedicated connection)
        let relay_conn = relay::create_relay_client(&settings.relay).await?;
        let publisher = RelayPublisher::new(relay_conn.clone(), settings.relay.channel.clone());
        let subscriber = RelaySubscriber::new(settings.relay.clone())?;

        // Create durable log connection, shared by producer and consumer
        let log_conn = stream::create_log_client(&settings.log).await?;
        let producer = StreamProducer::new(log_conn.clone(), settings.log.stream.clone());

        // Create WebSocket gateway
        let gateway = Arc::new(Gateway::new());

        // Shutdown signal observed by the background tasks
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Relay fan-out task: broadcast locally first, then append to the
        // durable log best-effort
        let subscriber_task = tokio::spawn(subscriber.run(
            relay_handler(gateway.clone(), producer.clone()),
            shutdown_rx.clone(),
        ));

        // Persistence consumer task draining the log into the row store
        let repository = Arc::new(PgMessageRepository::new(db.clone()));
        let consumer = StreamConsumer::new(log_conn, repository, settings.log.clone());
        let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

        // Create app state
        let state = AppState {
            db,
            redis: relay_conn,
            relay: publisher,
            gateway,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        // Bind to the configured address
        let addr = settings.server.socket_addr();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            shutdown_tx,
            subscriber_task,
            consumer_task,
        })
    }

    /// Run the server until interrupted, then stop the background tasks.
    ///
    /// The background tasks are stopped whether the server exited cleanly
    /// or with an error; the serve error is propagated after they drain.
    pub async fn run_until_stopped(self) -> Result<()> {
        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        stop_background_tasks(self.shutdown_tx, vec![self.subscriber_task, self.consumer_task])
            .await;

        served?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Signal the background tasks and wait for them to drain.
async fn stop_background_tasks(shutdown_tx: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) {
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
}

/// Build the relay delivery handler for this process.
///
/// Per delivered message: broadcast to every locally connected socket
/// first, then append to the durable log asynchronously. The append is
/// best-effort; its failure is logged and counted, never surfaced to the
/// broadcast path.
fn relay_handler(
    gateway: Arc<Gateway>,
    producer: StreamProducer,
) -> impl FnMut(ChatMessage) + Send {
    move |chat: ChatMessage| {
        metrics::RELAY_MESSAGES_RECEIVED.inc();

        let delivered = gateway.broadcast(ServerEvent::ReceiveMessage(chat.clone()));
        tracing::debug!(delivered, "Broadcast relay message to local sessions");

        let producer = producer.clone();
        tokio::spawn(async move {
            if let Err(e) = producer.append(&chat).await {
                metrics::LOG_APPEND_FAILURES.inc();
                tracing::warn!(
                    error = %e,
                    "Durable log append failed; message broadcast but not persisted"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn background_tasks_stop_on_any_server_exit() {
        // Tasks parked on the shutdown signal must be released even when
        // the server loop exited with an error.
        let (tx, mut rx_a) = watch::channel(false);
        let mut rx_b = tx.subscribe();

        let task_a = tokio::spawn(async move {
            let _ = rx_a.changed().await;
        });
        let task_b = tokio::spawn(async move {
            let _ = rx_b.changed().await;
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            stop_background_tasks(tx, vec![task_a, task_b]),
        )
        .await
        .expect("background tasks did not stop");
    }
}
