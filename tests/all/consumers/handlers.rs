use super::Recording;
use crate::helpers::{get_connection, get_publisher};
use amq_protocol_types::{AMQPValue, FieldTable};
use lapin::options::{BasicGetOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;
use message_consumer::consumers::hooks::pre_start::{
    Bind, DeclareExchange, DeclareTemporaryQueue, ExchangeKind, ExchangeSetup, RoutingKey,
};
use message_consumer::consumers::{
    unique_queue_name, BrokerAction, Consumer, ConsumerPreStartHook, DeadLetterHook, Delivery,
    LogMessages,
};
use message_consumer::publishers::MessageEnvelope;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Default)]
struct CollectDiscarded(Arc<Mutex<Vec<Vec<u8>>>>);

#[async_trait::async_trait]
impl DeadLetterHook for CollectDiscarded {
    async fn on_discard(&self, delivery: &Delivery) {
        self.0.lock().unwrap().push(delivery.data.clone());
    }
}

fn envelope(exchange: &str, routing_key: &str, correlation_id: &str, body: &[u8]) -> MessageEnvelope {
    MessageEnvelope::json(body.to_vec())
        .with_exchange_name(exchange.to_owned())
        .with_routing_key(routing_key.to_owned())
        .with_correlation_id(correlation_id.into())
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn valid_messages_are_acked_and_invalid_ones_are_discarded() {
    // Arrange
    let connection = get_connection().await;
    let exchange = format!("message-consumer-tests-{}", Uuid::new_v4());
    let routing_key = "records";
    let handler = Recording::new(LogMessages);
    let discarded = CollectDiscarded::default();

    let consumer = Consumer::builder(
        &exchange,
        routing_key,
        unique_queue_name("message-consumer-tests"),
        handler.clone(),
    )
    .exit_after(2)
    .dead_letter_hook(discarded.clone())
    .build(&connection)
    .await
    .unwrap();
    let publisher = get_publisher(connection.clone(), &exchange).await;

    // Act
    let handle = tokio::spawn(consumer.run_until_shutdown(std::future::pending()));
    publisher
        .publish(envelope(
            &exchange,
            routing_key,
            "valid",
            br#"{"correlation_id":"abc-1","action_type":"create","data":{"ID":"rec-42"}}"#,
        ))
        .await
        .unwrap();
    publisher
        .publish(envelope(&exchange, routing_key, "invalid", b"not json"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("the consumer did not process both messages in time")
        .unwrap()
        .unwrap();

    // Assert
    let mut decisions = handler.decisions();
    decisions.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        decisions,
        vec![
            ("invalid".to_owned(), BrokerAction::NackDiscard),
            ("valid".to_owned(), BrokerAction::Ack),
        ]
    );
    assert_eq!(*discarded.0.lock().unwrap(), vec![b"not json".to_vec()]);
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn messages_published_with_another_routing_key_are_not_received() {
    // Arrange
    let connection = get_connection().await;
    let exchange = format!("message-consumer-tests-{}", Uuid::new_v4());
    let handler = Recording::new(LogMessages);

    let consumer = Consumer::builder(
        &exchange,
        "records",
        unique_queue_name("message-consumer-tests"),
        handler.clone(),
    )
    .exit_after(1)
    .build(&connection)
    .await
    .unwrap();
    let publisher = get_publisher(connection.clone(), &exchange).await;

    // Act
    let handle = tokio::spawn(consumer.run_until_shutdown(std::future::pending()));
    // No queue is bound with this routing key: the broker returns the message.
    let unroutable = publisher
        .publish(envelope(&exchange, "invoices", "other", b"{}"))
        .await;
    publisher
        .publish(envelope(&exchange, "records", "bound", b"{}"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("the consumer did not process the message in time")
        .unwrap()
        .unwrap();

    // Assert
    assert!(unroutable.is_err());
    assert_eq!(
        handler.decisions(),
        vec![("bound".to_owned(), BrokerAction::Ack)]
    );
}

/// Declares the consumer queue with a broker-side dead-letter exchange.
struct DeadLetterTo(String);

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeadLetterTo {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        mut queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        queue_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.0.clone().into()),
        );
        DeclareTemporaryQueue
            .run(channel, queue_name, queue_args)
            .await
    }
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn a_custom_topology_can_park_discarded_messages() {
    // Arrange
    let connection = get_connection().await;
    let exchange = format!("message-consumer-tests-{}", Uuid::new_v4());
    let dead_letters = DeclareExchange {
        name: format!("{exchange}.dead-letters"),
        kind: ExchangeKind::Fanout,
    };
    let parking_queue = format!("{exchange}.parked");

    let channel = connection.create_channel().await.unwrap();
    dead_letters.setup_exchange(&channel).await.unwrap();
    channel
        .queue_declare(
            &parking_queue,
            QueueDeclareOptions {
                exclusive: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();
    channel
        .queue_bind(
            &parking_queue,
            dead_letters.exchange_name(),
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .unwrap();

    let consumer = Consumer::builder(
        &exchange,
        "records",
        unique_queue_name("message-consumer-tests"),
        LogMessages,
    )
    .exit_after(1)
    .with_pre_start_hook(Bind {
        exchange: DeclareExchange {
            name: exchange.clone(),
            kind: ExchangeKind::Direct,
        },
        queue: DeadLetterTo(dead_letters.name.clone()),
        binding: RoutingKey::from("records"),
    })
    .build(&connection)
    .await
    .unwrap();
    let publisher = get_publisher(connection.clone(), &exchange).await;

    // Act
    let handle = tokio::spawn(consumer.run_until_shutdown(std::future::pending()));
    publisher
        .publish(envelope(&exchange, "records", "invalid", b"not json"))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("the consumer did not process the message in time")
        .unwrap()
        .unwrap();

    // Assert
    let parked = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let message = channel
                .basic_get(&parking_queue, BasicGetOptions { no_ack: true })
                .await
                .unwrap();
            match message {
                Some(message) => break message,
                None => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    })
    .await
    .expect("the discarded message was not dead-lettered");
    assert_eq!(parked.delivery.data, b"not json".to_vec());
}
