//! Wires the consumer and the health server together.
use crate::amqp::{Connection, ConnectionFactory};
use crate::configuration::{ConfigurationError, Settings};
use crate::consumers::{unique_queue_name, Consumer, LogMessages};
use crate::server::{self, BrokerConnectionCheck, Component, Health, Server};
use shutdown_handler::ShutdownHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::Instrument;

/// The name the service reports about itself.
pub const BUILD_NAME: &str = "usvc-message-consumer";
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
/// The commit the binary was built from, injected through `BUILD_COMMIT` at compile time.
pub const BUILD_COMMIT: &str = match option_env!("BUILD_COMMIT") {
    Some(commit) => commit,
    None => "n/a",
};

/// Everything that can stop the service from starting, or make it stop.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration")]
    Configuration(#[from] ConfigurationError),
    #[error("Failed to connect to the RabbitMq broker")]
    BrokerConnection(#[source] anyhow::Error),
    #[error("The health server failed")]
    HealthServer(#[source] anyhow::Error),
    #[error("The message consumer failed")]
    Consumer(#[source] anyhow::Error),
}

impl StartupError {
    /// The process exit code matching this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Configuration(_) => 1,
            StartupError::BrokerConnection(_) => 2,
            StartupError::HealthServer(_) => 3,
            StartupError::Consumer(_) => 4,
        }
    }
}

/// The service, fully initialised: connected to the broker, with its queue declared and bound,
/// and its health server listening.
pub struct Application {
    connection: Arc<Connection>,
    consumer: Consumer,
    server: Server,
    server_address: SocketAddr,
}

impl Application {
    #[tracing::instrument(name = "application_build", skip_all, err)]
    pub async fn build(settings: &Settings) -> Result<Self, StartupError> {
        let address = settings.server_address()?;

        tracing::info!(otel_address = %settings.otel_address, "profiling is not enabled");

        let connection = ConnectionFactory::new(
            settings.mq_address.clone(),
            Some(settings.connection_timeout()),
        )
        .new_connection()
        .await
        .map(Arc::new)
        .map_err(StartupError::BrokerConnection)?;

        let consumer = Consumer::builder(
            &settings.mq_exchange,
            &settings.mq_routing_key,
            unique_queue_name(&settings.mq_queue_prefix),
            LogMessages,
        )
        .with_prefetch_count(settings.mq_prefetch_count)
        .build(&connection)
        .await
        .map_err(StartupError::Consumer)?;
        tracing::info!(queue_name = consumer.queue_name(), "message consumer started");

        let health = Health::new(Component::new(
            format!("{BUILD_NAME} - {BUILD_COMMIT}"),
            BUILD_VERSION,
        ))
        .with_check(BrokerConnectionCheck::new(connection.clone()));
        let server = Server::bind(address, server::router(health))
            .await
            .map_err(StartupError::HealthServer)?;
        let server_address = server.local_addr().map_err(StartupError::HealthServer)?;

        Ok(Self {
            connection,
            consumer,
            server,
            server_address,
        })
    }

    /// The address the health server is listening on.
    pub fn server_address(&self) -> SocketAddr {
        self.server_address
    }

    /// Consume messages and serve health requests until `shutdown` is signalled or one of the two
    /// stops on its own.
    ///
    /// Either way `shutdown` is signalled, both are stopped gracefully and the broker connection
    /// is closed before returning.
    pub async fn run_until_stopped(
        self,
        shutdown: Arc<ShutdownHandler>,
    ) -> Result<(), StartupError> {
        let Self {
            connection,
            consumer,
            server,
            ..
        } = self;

        let mut consumer_task = tokio::spawn(
            {
                let shutdown = shutdown.clone();
                async move { consumer.run_until_shutdown(shutdown.wait_for_signal()).await }
            }
            .in_current_span(),
        );
        let mut server_task = tokio::spawn({
            let shutdown = shutdown.clone();
            server
                .run_until_shutdown(async move { shutdown.wait_for_signal().await })
                .in_current_span()
        });

        let (first, early_outcome) = tokio::select! {
            _ = shutdown.wait_for_signal() => (Stopped::Signal, None),
            outcome = &mut consumer_task => (Stopped::Consumer, Some(outcome)),
            outcome = &mut server_task => (Stopped::Server, Some(outcome)),
        };
        shutdown.shutdown();

        let (consumer_outcome, server_outcome) = match (first, early_outcome) {
            (Stopped::Consumer, Some(outcome)) => (outcome, server_task.await),
            (Stopped::Server, Some(outcome)) => (consumer_task.await, outcome),
            _ => {
                tracing::info!("shutdown requested");
                (consumer_task.await, server_task.await)
            }
        };

        if let Err(e) = connection.close(200, "service stopped").await {
            tracing::warn!(error = %e, "failed to close the broker connection");
        }

        let consumer_outcome = flatten(consumer_outcome);
        let server_outcome = flatten(server_outcome);
        match first {
            Stopped::Signal => {
                server_outcome.map_err(StartupError::HealthServer)?;
                consumer_outcome.map_err(StartupError::Consumer)
            }
            // Stopping without a signal is a failure.
            Stopped::Consumer => Err(StartupError::Consumer(
                consumer_outcome
                    .err()
                    .unwrap_or_else(|| anyhow::anyhow!("The consumer stopped unexpectedly")),
            )),
            Stopped::Server => Err(StartupError::HealthServer(
                server_outcome
                    .err()
                    .unwrap_or_else(|| anyhow::anyhow!("The HTTP server stopped unexpectedly")),
            )),
        }
    }
}

/// What made [`Application::run_until_stopped`] stop.
#[derive(Clone, Copy)]
enum Stopped {
    Signal,
    Consumer,
    Server,
}

fn flatten(outcome: Result<Result<(), anyhow::Error>, JoinError>) -> Result<(), anyhow::Error> {
    outcome.map_err(anyhow::Error::from).and_then(|r| r)
}
