use crate::consumers::Delivery;

#[async_trait::async_trait]
/// A hook to execute logic before a delivery is discarded.
///
/// # Use case
///
/// Deliveries for which the [`Handler`] returns [`BrokerAction::NackDiscard`] are rejected
/// without requeueing: unless the queue has a dead letter exchange, they are lost.
///
/// A dead letter hook gets a last look at the delivery before the rejection is sent to the
/// broker - e.g. to store the payload somewhere or to forward it to a parking-lot queue.
///
/// The default hook, [`Discard`], does nothing.
///
/// [`Handler`]: crate::consumers::Handler
/// [`BrokerAction::NackDiscard`]: crate::consumers::BrokerAction::NackDiscard
pub trait DeadLetterHook: Send + Sync + 'static {
    async fn on_discard(&self, delivery: &Delivery);
}

/// Drop discarded deliveries on the floor.
pub struct Discard;

#[async_trait::async_trait]
impl DeadLetterHook for Discard {
    async fn on_discard(&self, _delivery: &Delivery) {}
}
