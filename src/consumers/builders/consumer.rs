use crate::consumers::{
    consumer::Consumer,
    hooks::pre_start::{Bind, DeclareExchange, DeclareTemporaryQueue, ExchangeKind, RoutingKey},
    ConsumerPreStartHook, DeadLetterHook, Discard, Handler,
};
use amq_protocol_types::FieldTable;
use anyhow::Context;
use lapin::{options::BasicQosOptions, Connection};
use std::sync::Arc;
use uuid::Uuid;

/// One delivery in flight per consumer, unless configured otherwise.
const DEFAULT_PREFETCH_COUNT: u16 = 1;

/// Generate a queue name that no other consumer uses: `<prefix>.<random uuid>`.
///
/// Every process instance gets its own ephemeral queue, hence every instance receives a copy
/// of each message routed to the exchange with the bound routing key.
pub fn unique_queue_name(prefix: &str) -> String {
    format!("{prefix}.{}", Uuid::new_v4())
}

/// A builder for [`Consumer`].
///
/// Use [`Consumer::builder`] as entrypoint.
pub struct ConsumerBuilder {
    exchange: String,
    routing_key: String,
    queue_name: String,
    prefetch_count: u16,
    exit_after: Option<usize>,
    handler: Arc<dyn Handler>,
    dead_letter_hook: Arc<dyn DeadLetterHook>,
    pre_start_hook: Option<Arc<dyn ConsumerPreStartHook>>,
}

impl ConsumerBuilder {
    pub(in crate::consumers) fn new(
        exchange: String,
        routing_key: String,
        queue_name: String,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            exchange,
            routing_key,
            queue_name,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            // By default, the consumer will continue to consume message indefinitely.
            exit_after: None,
            handler,
            dead_letter_hook: Arc::new(Discard),
            pre_start_hook: None,
        }
    }

    /// Configure the prefetch count of the consumer - i.e. how many deliveries can be in flight
    /// at the same time.
    /// If not configured, the prefetch count is set to a default value of 1.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// By default, a [`Consumer`] keeps running indefinitely, consuming messages as soon as
    /// they are available in its queue.
    ///
    /// With `exit_after` you can configure the [`Consumer`] to stop consuming messages as soon
    /// as it has processed `max_n_messages`.
    ///
    /// This is mostly useful for testing purposes: it allows you to know, when the consumer has
    /// exited, that a certain number of messages have been processed and you can start performing
    /// your assertions around the side-effects produced by said processing.
    #[must_use]
    pub fn exit_after(mut self, max_n_messages: usize) -> Self {
        self.exit_after = Some(max_n_messages);
        self
    }

    /// Run custom logic on deliveries that are about to be discarded.
    ///
    /// Check out [`DeadLetterHook`]'s documentation for more details.
    ///
    /// By default, discarded deliveries are simply dropped.
    #[must_use]
    pub fn dead_letter_hook<H: DeadLetterHook>(mut self, hook: H) -> Self {
        self.dead_letter_hook = Arc::new(hook);
        self
    }

    /// Replace the default queue topology.
    ///
    /// By default the exchange is declared (as a `direct` exchange) if it does not exist,
    /// the queue is declared as non-durable and auto-deleting and it is bound to the exchange
    /// with the routing key.
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(mut self, hook: H) -> Self {
        self.pre_start_hook = Some(Arc::new(hook));
        self
    }

    /// Open a channel on `connection`, set up the queue topology and return a ready-to-run
    /// [`Consumer`].
    ///
    /// `build` does NOT trigger consumption of messages!
    /// Check out [`Consumer::run_until_shutdown`].
    #[tracing::instrument(
        skip_all,
        name = "consumer_new",
        err,
        fields(
            queue_name = %self.queue_name,
            exchange = %self.exchange,
            routing_key = %self.routing_key,
        )
    )]
    pub async fn build(self, connection: &Connection) -> Result<Consumer, anyhow::Error> {
        let channel = connection
            .create_channel()
            .await
            .context("Failed to open a channel")?;
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await
            .context("Failed to set the prefetch count")?;

        let pre_start_hook: Arc<dyn ConsumerPreStartHook> = match self.pre_start_hook {
            Some(hook) => hook,
            None => Arc::new(Bind {
                exchange: DeclareExchange {
                    name: self.exchange.clone(),
                    kind: ExchangeKind::Direct,
                },
                queue: DeclareTemporaryQueue,
                binding: RoutingKey::from(self.routing_key.clone()),
            }),
        };
        pre_start_hook
            .run(&channel, &self.queue_name, FieldTable::default())
            .await
            .context("Failed to set up the queue topology")?;

        tracing::info!("consumer created");
        Ok(Consumer {
            channel,
            queue_name: self.queue_name,
            exit_after: self.exit_after,
            handler: self.handler,
            dead_letter_hook: self.dead_letter_hook,
        })
    }
}
