mod handlers;
mod shutdown;

use message_consumer::consumers::{BrokerAction, Delivery, Handler};
use std::sync::{Arc, Mutex};

/// Records the decision taken by the wrapped handler for every delivery.
#[derive(Clone)]
pub struct Recording<H> {
    inner: Arc<H>,
    pub decisions: Arc<Mutex<Vec<(String, BrokerAction)>>>,
}

impl<H> Recording<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner: Arc::new(inner),
            decisions: Default::default(),
        }
    }

    pub fn decisions(&self) -> Vec<(String, BrokerAction)> {
        self.decisions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl<H: Handler> Handler for Recording<H> {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        let action = self.inner.handle(delivery).await;
        self.decisions
            .lock()
            .unwrap()
            .push((delivery.correlation_id().to_owned(), action));
        action
    }
}
