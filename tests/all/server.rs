use message_consumer::server::{router, Component, Health, HealthCheck, Server};
use shutdown_handler::ShutdownHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct AlwaysHealthy;

#[async_trait::async_trait]
impl HealthCheck for AlwaysHealthy {
    fn name(&self) -> &str {
        "always-healthy"
    }

    async fn check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Send a bare HTTP/1.1 `GET` and return the raw response.
async fn get(address: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn the_server_answers_until_shutdown_is_signalled() {
    // Arrange
    let health = Health::new(Component::new("usvc-message-consumer - n/a", "0.1.0"))
        .with_check(AlwaysHealthy);
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), router(health))
        .await
        .unwrap();
    let address = server.local_addr().unwrap();
    let shutdown = Arc::new(ShutdownHandler::new());
    let handle = tokio::spawn(server.run_until_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.wait_for_signal().await }
    }));

    // Act
    let healthz = get(address, "/healthz").await;
    let unknown = get(address, "/metrics").await;
    shutdown.shutdown();

    // Assert
    assert!(healthz.starts_with("HTTP/1.1 200"), "{healthz}");
    assert!(healthz.contains(r#""status":"OK""#), "{healthz}");
    assert!(unknown.starts_with("HTTP/1.1 404"), "{unknown}");
    assert!(
        unknown.contains("content-type: application/problem+json"),
        "{unknown}"
    );
    assert!(
        unknown.contains(r#""detail":"no handler defined for path""#),
        "{unknown}"
    );
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("the server did not stop in time")
        .unwrap()
        .unwrap();
}
