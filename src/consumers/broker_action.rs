use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicRejectOptions},
};

/// The action we ask the broker to take when finalising the processing of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    /// Positive acknowledgement - the message was processed and can be removed from the queue.
    Ack,
    /// Rejection without requeueing - the message is dropped.
    /// It is routed to the queue's dead letter exchange, if one is configured.
    NackDiscard,
}

impl BrokerAction {
    pub(crate) async fn execute(&self, acker: &Acker) -> Result<(), anyhow::Error> {
        match self {
            Self::Ack => acker
                .ack(BasicAckOptions { multiple: false })
                .await
                .map_err(anyhow::Error::from),
            Self::NackDiscard => acker
                .reject(BasicRejectOptions { requeue: false })
                .await
                .map_err(anyhow::Error::from),
        }
    }
}

impl std::fmt::Display for BrokerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::NackDiscard => write!(f, "nack_discard"),
        }
    }
}
