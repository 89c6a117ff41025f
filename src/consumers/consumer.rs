use crate::consumers::{
    builders::ConsumerBuilder, BrokerAction, DeadLetterHook, Delivery, Handler,
};
use amq_protocol_types::FieldTable;
use futures_util::{stream::FuturesUnordered, Future, FutureExt, StreamExt};
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions},
    Channel,
};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tracing::Instrument;
use uuid::Uuid;

/// A RabbitMq consumer: it pulls deliveries from its queue, hands them over to a [`Handler`]
/// and acks/rejects them with the broker according to the handler's decision.
///
/// # How do I build a `Consumer`?
///
/// `Consumer` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`Consumer::builder`].
pub struct Consumer {
    /// An open channel to communicate with RabbitMq.
    pub(super) channel: Channel,
    /// The name of the queue we will be consuming messages from.
    pub(super) queue_name: String,
    /// The maximum number of messages `Consumer` is going to process before exiting the processing
    /// loop.
    /// The consumer will process messages indefinitely if set to `None`.
    pub(super) exit_after: Option<usize>,
    /// `handler` decides what happens to each incoming message.
    pub(super) handler: Arc<dyn Handler>,
    /// Executed on every delivery that is about to be discarded.
    pub(super) dead_letter_hook: Arc<dyn DeadLetterHook>,
}

impl Consumer {
    /// Start building a [`Consumer`].
    ///
    /// The consumer will pull messages from `queue_name`, bound to `exchange` using `routing_key`.
    /// See [`unique_queue_name`](crate::consumers::unique_queue_name) to generate a queue name
    /// specific to the current process.
    pub fn builder(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        queue_name: impl Into<String>,
        handler: impl Handler,
    ) -> ConsumerBuilder {
        ConsumerBuilder::new(
            exchange.into(),
            routing_key.into(),
            queue_name.into(),
            Arc::new(handler),
        )
    }

    /// The name of the queue the consumer pulls messages from.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Run the consumer, which will notify RabbitMq to start pushing messages on the specified
    /// queue.
    ///
    /// `run_until_shutdown` exits if the consumer fails with an error (e.g. the channel is closed
    /// or the connection with RabbitMq is lost) or once `shutdown` completes.
    /// On shutdown the consumer stops accepting new deliveries and waits for the ones in flight
    /// to be acked/rejected before closing its channel.
    #[tracing::instrument(skip_all, name = "consumer_run", fields(queue_name = %self.queue_name))]
    pub async fn run_until_shutdown(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!("consumer started");

        let mut task_handles = FuturesUnordered::new();
        let mut counter = 0;

        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        let result = 'event_loop: loop {
            // have we consumed all the events we want?
            if self.exit_after == Some(counter) {
                break 'event_loop Ok(());
            }

            tokio::select! {
                // we want to poll in the specified order - preferring the handling of shutdowns before
                // going on with processing more events
                biased;

                // check for a shutdown signal
                _ = &mut shutdown => {
                    tracing::info!("consumer shutting down");
                    // The broker stops pushing deliveries: the stream ends once it has
                    // confirmed the cancellation.
                    if let Err(e) = self
                        .channel
                        .basic_cancel(consumer.tag().as_str(), BasicCancelOptions::default())
                        .await
                    {
                        tracing::warn!(error = %e, "failed to cancel the consumer");
                        break 'event_loop Ok(());
                    }
                }

                // clear out some of our task handles
                _ = task_handles.next(), if !task_handles.is_empty() => {}

                // try get the next consumer event
                event = consumer.next() => {
                    match event {
                        // consumer has shutdown
                        None => { break 'event_loop Ok(()) }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "failed to run consumer");
                            break 'event_loop Err(e.into())
                        }
                        Some(Ok(delivery)) => {
                            // Each delivery is processed in its own task: up to `prefetch_count`
                            // messages are handled concurrently and a failure while processing
                            // one of them does not tear the whole consumer down.
                            let future = Self::process(
                                delivery.into(),
                                self.handler.clone(),
                                self.dead_letter_hook.clone(),
                            );
                            task_handles.push(tokio::spawn(future.in_current_span()));
                            counter += 1;
                        }
                    }
                }
            }
        };

        // Make sure all tasks in flight complete before returning.
        // If the set is empty, this returns immediately.
        while task_handles.next().await.is_some() {}

        if let Err(e) = self.channel.close(200, "consumer closed").await {
            tracing::debug!(error = %e, "failed to close the consumer channel");
        }
        tracing::info!("consumer closed");

        result
    }

    /// Process an incoming message - handler, dead letter hook, ack/reject against the AMQP broker.
    async fn process(
        delivery: Delivery,
        handler: Arc<dyn Handler>,
        dead_letter_hook: Arc<dyn DeadLetterHook>,
    ) {
        let span = delivery.span();
        async move {
            let action = decide(handler.as_ref(), &delivery).await;
            if action == BrokerAction::NackDiscard {
                dead_letter_hook.on_discard(&delivery).await;
            }
            match action.execute(&delivery.acker).await {
                Ok(()) => tracing::debug!(broker_action = %action, "delivery settled"),
                Err(e) => {
                    tracing::error!(error = ?e, broker_action = %action, "failed to settle delivery")
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Ask `handler` what to do with `delivery`.
///
/// A panicking handler still yields a decision: the delivery is discarded.
pub(crate) async fn decide(handler: &dyn Handler, delivery: &Delivery) -> BrokerAction {
    match AssertUnwindSafe(handler.handle(delivery))
        .catch_unwind()
        .await
    {
        Ok(action) => action,
        Err(_) => {
            tracing::error!("message handler panicked");
            BrokerAction::NackDiscard
        }
    }
}
