//! Facilities to consume messages from a RabbitMq queue. Check out [`Consumer`] as a
//! starting point.
pub use broker_action::BrokerAction;
pub use builders::{unique_queue_name, ConsumerBuilder};
pub use consumer::Consumer;
pub use dead_letter_hook::{DeadLetterHook, Discard};
pub use handler::Handler;
pub use incoming_message::Delivery;
pub use log_messages::LogMessages;
pub use pre_start_hook::ConsumerPreStartHook;

mod broker_action;
mod builders;
mod consumer;
mod dead_letter_hook;
mod handler;
pub mod hooks;
mod incoming_message;
mod log_messages;
mod pre_start_hook;
