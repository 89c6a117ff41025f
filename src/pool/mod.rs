//! Pools publishing [`lapin::Channel`]s with [`deadpool`].
//!
//! All channels are opened on the shared [`lapin::Connection`] the service keeps for its whole
//! lifetime, with publisher confirms on. Broken channels are disposed of and new ones are created
//! on demand; no channel is opened once the connection is closed.
//!
//! ```rust,no_run
//! use message_consumer::amqp::ConnectionFactory;
//! use message_consumer::pool::channel_pool;
//! use std::sync::Arc;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let factory = ConnectionFactory::new("amqp://localhost:5672".to_owned().into(), None);
//!     let connection = Arc::new(factory.new_connection().await?);
//!
//!     let pool = channel_pool(connection, 16)?;
//!     let channel = pool.get().await?;
//!     Ok(())
//! }
//! ```

mod channel;
mod error;

pub use channel::{channel_pool, ChannelManager, ChannelPool};
pub use error::Error;
