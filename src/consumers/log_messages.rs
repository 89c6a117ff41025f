use crate::consumers::{BrokerAction, Delivery, Handler};
use crate::message::Message;

/// A [`Handler`] that decodes each delivery as a [`Message`] and logs it.
///
/// - Deliveries that decode are logged at `INFO` and acked.
/// - Deliveries that don't are logged at `ERROR` and discarded: they are never requeued.
///
/// No other action is taken on the decoded record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessages;

#[async_trait::async_trait]
impl Handler for LogMessages {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        match Message::decode(&delivery.data) {
            Ok(message) => {
                tracing::info!(
                    action_type = %message.action_type,
                    record = %message.data,
                    "message received"
                );
                BrokerAction::Ack
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to unmarshal message");
                BrokerAction::NackDiscard
            }
        }
    }
}
