use crate::consumers::hooks::pre_start::{declare_exchange, ExchangeKind};
use crate::pool::{self, ChannelPool};
use crate::publishers::MessageEnvelope;
use lapin::message::BasicReturnMessage;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// A high-level interface to publish messages.
///
/// # How do I build a `Publisher`?
///
/// `Publisher` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`Publisher::builder`].
///
/// # Fault tolerance
///
/// Channels are checked out of a [`ChannelPool`]: broken channels are replaced transparently.
/// Publishing itself is never retried - failures are returned to the caller.
pub struct Publisher {
    /// Channels in confirm mode.
    channel_pool: ChannelPool,
    /// The exchange declared when the publisher was built.
    exchange: String,
    /// Timeout on publishing.
    timeout: std::time::Duration,
    /// Whether messages ask the broker to write them to disk.
    persistent: bool,
}

impl Publisher {
    /// Start building a [`Publisher`] for `exchange`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use message_consumer::amqp::ConnectionFactory;
    /// use message_consumer::pool::channel_pool;
    /// use message_consumer::publishers::Publisher;
    /// use std::sync::Arc;
    ///
    /// pub async fn get_publisher() -> anyhow::Result<Publisher> {
    ///     let factory = ConnectionFactory::new("amqp://localhost:5672".to_owned().into(), None);
    ///     let connection = Arc::new(factory.new_connection().await?);
    ///     let channel_pool = channel_pool(connection, 10)?;
    ///
    ///     Ok(Publisher::builder(channel_pool, "events")
    ///         .publish_timeout(std::time::Duration::from_secs(3))
    ///         .build()
    ///         .await?)
    /// }
    /// ```
    pub fn builder(channel_pool: ChannelPool, exchange: impl Into<String>) -> PublisherBuilder {
        PublisherBuilder::new(channel_pool, exchange.into())
    }

    /// The exchange this publisher declared.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish a message to RabbitMq.
    ///
    /// A message id and a timestamp are generated if the envelope doesn't carry them.
    /// The content type defaults to `application/json`, the delivery mode to the one chosen with
    /// [`PublisherBuilder::persistent_messages`].
    ///
    /// The mandatory flag is always set: publishing a message that no queue is bound to receive
    /// fails.
    pub async fn publish(&self, envelope: MessageEnvelope) -> Result<(), PublisherError> {
        let options = BasicPublishOptions {
            mandatory: true,
            // The immediate flag was dropped in RabbitMQ 3.0 - see https://www.rabbitmq.com/blog/2012/11/19/breaking-things-with-rabbitmq-3-0/
            // Setting `true` will cause a not-supported error
            immediate: false,
        };
        let envelope = inject_amqp_properties(envelope, self.persistent);
        let message_id = envelope
            .properties
            .message_id()
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let correlation_id = envelope
            .properties
            .correlation_id()
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();

        let MessageEnvelope {
            payload,
            properties,
            exchange_name,
            routing_key,
        } = envelope;

        // The channel checkout and the publishing share the same timeout.
        let publish_future = async {
            let channel = self.channel_pool.get().await.map_err(pool::Error::from)?;

            publish(
                &channel,
                &payload,
                options,
                &exchange_name,
                &routing_key,
                properties,
            )
            .await
        };

        let outcome = match tokio::time::timeout(self.timeout, publish_future).await {
            Ok(result) => result,
            Err(_) => Err(PublisherError::TimeoutError),
        };

        match &outcome {
            Ok(()) => tracing::info!(
                message_id = %message_id,
                correlation_id = %correlation_id,
                exchange = %exchange_name,
                routing_key = %routing_key,
                "message published"
            ),
            Err(e) => tracing::error!(
                error = %e,
                message_id = %message_id,
                correlation_id = %correlation_id,
                exchange = %exchange_name,
                routing_key = %routing_key,
                "failed to publish message"
            ),
        }
        outcome
    }
}

/// Error returned when trying to publish a message using `Publisher`.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("No channel available to publish on")]
    Channel(#[from] pool::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// A builder for [`Publisher`].
///
/// Use [`Publisher::builder`] as entrypoint.
pub struct PublisherBuilder {
    channel_pool: ChannelPool,
    exchange: String,
    timeout: std::time::Duration,
    persistent: bool,
}

impl PublisherBuilder {
    fn new(channel_pool: ChannelPool, exchange: String) -> Self {
        Self {
            channel_pool,
            exchange,
            timeout: std::time::Duration::from_secs(3),
            persistent: false,
        }
    }

    /// Mark published messages as persistent (delivery mode 2).
    ///
    /// Off by default: the exchange and the consumer queues are not durable, so persisted
    /// messages would not survive a broker restart anyway. An envelope that already sets a
    /// delivery mode keeps it.
    #[must_use]
    pub fn persistent_messages(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Timeout applied when attempting to publish a message.
    /// Defaults to 3 seconds if left unspecified.
    #[must_use]
    pub fn publish_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declare the exchange (as a `direct` exchange, unless it already exists) and get an
    /// instance of [`Publisher`].
    #[tracing::instrument(skip_all, name = "publisher_new", err, fields(exchange = %self.exchange))]
    pub async fn build(self) -> Result<Publisher, PublisherError> {
        let channel = self.channel_pool.get().await.map_err(pool::Error::from)?;
        declare_exchange(&channel, &self.exchange, ExchangeKind::Direct)
            .await
            .map_err(PublisherError::GenericError)?;

        tracing::info!("publisher created");
        Ok(Publisher {
            channel_pool: self.channel_pool,
            exchange: self.exchange,
            timeout: self.timeout,
            persistent: self.persistent,
        })
    }
}

/// Publish a payload on a RabbitMq exchange, waiting for publisher confirmation from the
/// RabbitMq broker.
///
/// The mandatory flag tells the broker how to react if the message cannot be routed to a queue.
/// If this flag is `true`, the broker will return an unroutable message with a Return method.
/// If this flag is `false`, the broker silently drops the message.
#[tracing::instrument(level = "debug", skip(channel, payload))]
async fn publish(
    channel: &Channel,
    payload: &[u8],
    options: BasicPublishOptions,
    exchange: &str,
    routing_key: &str,
    properties: BasicProperties,
) -> Result<(), PublisherError> {
    let confirm = channel
        .basic_publish(exchange, routing_key, options, payload, properties)
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(ack) => {
            if let Some(return_message) = ack {
                // Reply Code 312 - NO_ROUTE
                // See https://www.rabbitmq.com/amqp-0-9-1-reference.html
                if return_message.reply_code == 312 {
                    return Err(PublisherError::UnroutableMessage(return_message));
                }
            }
            Ok(())
        }
        Confirmation::Nack(nack) => Err(PublisherError::NegativeAck(nack)),
        Confirmation::NotRequested => Ok(()),
    }
}

/// Delivery modes defined by AMQP 0-9-1.
const TRANSIENT: u8 = 1;
const PERSISTENT: u8 = 2;

/// Fill in the AMQP properties a published message must always carry.
fn inject_amqp_properties(mut envelope: MessageEnvelope, persistent: bool) -> MessageEnvelope {
    let current_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|ct| ct.as_secs());

    let props = envelope.properties;
    let props = if let Some(ct) = current_timestamp {
        let ts = *props.timestamp();
        props.with_timestamp(ts.unwrap_or(ct))
    } else {
        warn!("System time is before 1970");
        props
    };

    let message_id = props.message_id().clone();
    let content_type = props.content_type().clone();
    let default_mode = if persistent { PERSISTENT } else { TRANSIENT };
    let delivery_mode = props.delivery_mode().unwrap_or(default_mode);
    envelope.properties = props
        .with_message_id(message_id.unwrap_or_else(|| Uuid::new_v4().to_string().into()))
        .with_content_type(content_type.unwrap_or_else(|| "application/json".into()))
        .with_delivery_mode(delivery_mode);

    envelope
}
