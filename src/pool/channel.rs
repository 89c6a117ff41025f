//! Publishing channels opened on the service connection.
use super::Error;
use crate::amqp::{is_connected, Connection};
use deadpool::managed::{Manager, Pool, RecycleError, RecycleResult};
use lapin::{options::ConfirmSelectOptions, Channel, ChannelState};
use std::sync::Arc;

/// A pool of publishing [`Channel`]s.
pub type ChannelPool = Pool<ChannelManager>;

/// Build a [`ChannelPool`] holding at most `max_size` channels opened on `connection`.
pub fn channel_pool(connection: Arc<Connection>, max_size: usize) -> Result<ChannelPool, Error> {
    ChannelPool::builder(ChannelManager { connection })
        .max_size(max_size)
        .build()
        .map_err(|e| Error::Pool(e.to_string()))
}

/// Opens channels in confirm mode: every publishing on them is acked or nacked by the broker.
pub struct ChannelManager {
    connection: Arc<Connection>,
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = Error;

    async fn create(&self) -> Result<Channel, Error> {
        if !is_connected(&self.connection) {
            return Err(Error::ConnectionClosed);
        }
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(Error::Channel)?;
        channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
            .map_err(Error::Channel)?;
        Ok(channel)
    }

    async fn recycle(&self, channel: &mut Channel) -> RecycleResult<Error> {
        if !is_connected(&self.connection) {
            return Err(RecycleError::Backend(Error::ConnectionClosed));
        }
        match channel.status().state() {
            ChannelState::Connected => Ok(()),
            state => Err(RecycleError::Message(format!(
                "channel is in state {state:?}"
            ))),
        }
    }
}
