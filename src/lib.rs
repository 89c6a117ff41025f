//! A microservice consuming JSON messages from a RabbitMQ exchange, built on top of [`lapin`].
//!
//! Each instance binds its own queue to the configured exchange and routing key, logs every
//! message it receives and acknowledges it. Messages that cannot be decoded are discarded.
//!
//! [`startup::Application`] wires everything together; [`consumers::Consumer`] and
//! [`publishers::Publisher`] are the best starting points to learn how messages flow.

pub mod amqp;
pub mod configuration;
pub mod consumers;
pub mod message;
pub mod pool;
pub mod publishers;
pub mod server;
pub mod startup;
pub mod telemetry;
