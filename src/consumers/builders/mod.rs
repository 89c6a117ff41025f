mod consumer;

pub use consumer::{unique_queue_name, ConsumerBuilder};
