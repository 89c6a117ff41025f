use crate::consumers::{BrokerAction, Delivery};

/// Implementers of the `Handler` trait can be used in a [`Consumer`] to process messages
/// retrieved from a queue.
///
/// # Scope
///
/// `handle` does not get access to the underlying RabbitMq channel.
/// It returns the [`BrokerAction`] it wants to see applied to the delivery and the consumer
/// takes care of acking/rejecting the message with the broker.
/// This decouples the low-level interactions with the message broker from the logic associated
/// with the processing of a message, which can be tested without a running broker.
///
/// # Outcome
///
/// Every delivery gets exactly one outcome: if `handle` panics, the delivery is treated as
/// [`BrokerAction::NackDiscard`].
///
/// [`Consumer`]: crate::consumers::Consumer
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction;
}

/// Implement the [`Handler`] trait for all Boxed handlers.
///
/// E.g. Box<dyn Handler>.
#[async_trait::async_trait]
impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        H::handle(self, delivery).await
    }
}
