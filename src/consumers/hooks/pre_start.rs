//! A collection of pre-start hooks.
//!
//! ## Binding an ephemeral queue to an exchange
//!
//! ```
//! use message_consumer::consumers::hooks::pre_start::{
//!     Bind, DeclareExchange, DeclareTemporaryQueue, ExchangeKind, RoutingKey,
//! };
//!
//! // we want to bind a queue to an exchange
//! let pre_start_hook = Bind {
//!     // we will create the exchange if it does not exist yet
//!     exchange: DeclareExchange {
//!         // called `some.exchange`
//!         name: "some.exchange".to_owned(),
//!         // and it is a direct exchange
//!         kind: ExchangeKind::Direct,
//!     },
//!     // the queue goes away together with its last consumer
//!     queue: DeclareTemporaryQueue,
//!     // we want to receive the messages published with this routing key
//!     binding: RoutingKey::from("records"),
//! };
//! # drop(pre_start_hook);
//! ```

use crate::consumers::ConsumerPreStartHook;
use amq_protocol_types::FieldTable;
use async_trait::async_trait;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;
pub use lapin::ExchangeKind;

#[async_trait::async_trait]
/// Defines how to setup an exchange
pub trait ExchangeSetup: Send + Sync + 'static {
    /// The name of the exchange that will be set up.
    fn exchange_name(&self) -> &str;

    /// Ensures the exchange is set up.
    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error>;
}

/// Declares a transient exchange, unless it already exists.
pub struct DeclareExchange {
    pub name: String,
    pub kind: ExchangeKind,
}

#[async_trait]
impl ExchangeSetup for DeclareExchange {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error> {
        declare_exchange(channel, &self.name, self.kind.clone()).await
    }
}

/// Declare a transient exchange. Declaring an exchange that already exists with the same
/// settings is a no-op for the broker.
pub(crate) async fn declare_exchange(
    channel: &Channel,
    name: &str,
    kind: ExchangeKind,
) -> Result<(), anyhow::Error> {
    channel
        .exchange_declare(
            name,
            kind,
            ExchangeDeclareOptions {
                passive: false,
                durable: false,
                auto_delete: false,
                internal: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Bind the exchange defined by [`ExchangeSetup`] to the queue that will be defined in the nested `Queue` [`ConsumerPreStartHook`]
/// using the [`Binding`] method specified.
pub struct Bind<Exchange: ExchangeSetup, Queue: ConsumerPreStartHook, Binds: Binding> {
    pub exchange: Exchange,
    pub queue: Queue,
    pub binding: Binds,
}

#[async_trait::async_trait]
impl<E: ExchangeSetup, Q: ConsumerPreStartHook, B: Binding> ConsumerPreStartHook for Bind<E, Q, B> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.exchange.setup_exchange(channel).await?;
        self.queue.run(channel, queue_name, queue_args).await?;
        self.binding
            .bind(channel, self.exchange.exchange_name(), queue_name)
            .await?;

        Ok(())
    }
}

/// Declare a non-durable queue that the broker deletes once its last consumer goes away.
#[derive(Clone)]
pub struct DeclareTemporaryQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareTemporaryQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: false,
                    exclusive: false,
                    auto_delete: true,
                    nowait: false,
                },
                queue_args,
            )
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
/// Defines how to bind an exchange to a queue
pub trait Binding: Send + Sync + 'static {
    /// Bind `queue_name` to `exchange_name`.
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error>;
}

/// Binds an exchange to a queue using a routing key.
pub struct RoutingKey(pub String);

impl From<&str> for RoutingKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for RoutingKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[async_trait::async_trait]
impl Binding for RoutingKey {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_bind(
                queue_name,
                exchange_name,
                &self.0,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }
}
