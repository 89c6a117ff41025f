use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::{acker::Acker, BasicProperties};

/// A message dequeued from RabbitMq, ready for processing.
///
/// `Delivery` is the input type of [`Handler`](crate::consumers::Handler)s.
#[derive(Debug, PartialEq)]
pub struct Delivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,

    /// The acker used to ack/nack the message
    // Hidden from public interface, to stop a message being acked / rejected inside a message handler.
    // AMQP protocol specifics that a message must not be acked /rejected multiple times:
    // https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    pub(crate) acker: Acker,
}

impl Delivery {
    /// The message id set by the publisher, or an empty string if there is none.
    pub fn message_id(&self) -> &str {
        self.properties
            .message_id()
            .as_ref()
            .map(ShortString::as_str)
            .unwrap_or_default()
    }

    /// The correlation id set by the publisher, or an empty string if there is none.
    pub fn correlation_id(&self) -> &str {
        self.properties
            .correlation_id()
            .as_ref()
            .map(ShortString::as_str)
            .unwrap_or_default()
    }

    /// The span every log line emitted while processing this delivery belongs to.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "delivery",
            message_id = %self.message_id(),
            correlation_id = %self.correlation_id(),
            routing_key = %self.routing_key.as_str(),
        )
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: value.acker,
        }
    }
}
