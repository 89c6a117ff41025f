use super::Recording;
use crate::helpers::get_connection;
use message_consumer::consumers::{unique_queue_name, Consumer, LogMessages};
use shutdown_handler::ShutdownHandler;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn the_consumer_stops_when_shutdown_is_signalled() {
    // Arrange
    let connection = get_connection().await;
    let consumer = Consumer::builder(
        format!("message-consumer-tests-{}", Uuid::new_v4()),
        "records",
        unique_queue_name("message-consumer-tests"),
        Recording::new(LogMessages),
    )
    .build(&connection)
    .await
    .unwrap();
    let shutdown = Arc::new(ShutdownHandler::new());

    // Act
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { consumer.run_until_shutdown(shutdown.wait_for_signal()).await }
    });
    shutdown.shutdown();

    // Assert
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("the consumer did not stop in time")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn each_consumer_gets_its_own_queue() {
    let connection = get_connection().await;
    let exchange = format!("message-consumer-tests-{}", Uuid::new_v4());

    let mut queue_names = Vec::new();
    for _ in 0..2 {
        let consumer = Consumer::builder(
            &exchange,
            "records",
            unique_queue_name("message-consumer-tests"),
            LogMessages,
        )
        .build(&connection)
        .await
        .unwrap();
        queue_names.push(consumer.queue_name().to_owned());
    }

    assert_ne!(queue_names[0], queue_names[1]);
    assert!(queue_names
        .iter()
        .all(|name| name.starts_with("message-consumer-tests.")));
}
