//! Helpers for connecting to a RabbitMq broker.

mod factory;
pub(crate) use factory::is_connected;
pub use factory::ConnectionFactory;
pub use lapin::{Channel, Connection};

pub use lapin::{options, types, BasicProperties, ExchangeKind};
