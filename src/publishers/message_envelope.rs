use amq_protocol_types::ShortString;
use lapin::BasicProperties;

/// A message to be published via [`Publisher`](super::Publisher).
#[derive(Default, Debug, Clone)]
pub struct MessageEnvelope {
    /// The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    /// The name of the exchange we are publishing the message to.
    pub exchange_name: String,
    /// The routing key used by the exchange to decide which queues receive the message.
    pub routing_key: String,
    /// AMQP properties attached to the message.
    pub properties: BasicProperties,
}

impl MessageEnvelope {
    /// A JSON message: the content type is set to `application/json`.
    pub fn json(payload: Vec<u8>) -> Self {
        Self::default()
            .with_payload(payload)
            .with_content_type("application/json".into())
    }

    pub fn with_payload(mut self, value: Vec<u8>) -> Self {
        self.payload = value;
        self
    }

    pub fn with_exchange_name(mut self, value: String) -> Self {
        self.exchange_name = value;
        self
    }

    pub fn with_routing_key(mut self, value: String) -> Self {
        self.routing_key = value;
        self
    }

    fn props(mut self, f: impl FnOnce(BasicProperties) -> BasicProperties) -> Self {
        self.properties = f(self.properties);
        self
    }

    pub fn with_content_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_type(value))
    }

    pub fn with_correlation_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_correlation_id(value))
    }

    pub fn with_message_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_message_id(value))
    }
}
