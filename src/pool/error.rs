use deadpool::managed::PoolError;

/// Why no channel could be handed out.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The connection to the RabbitMq broker is closed")]
    ConnectionClosed,
    #[error("Failed to open a channel on the RabbitMq connection")]
    Channel(#[source] lapin::Error),
    #[error("The channel pool failed: {0}")]
    Pool(String),
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            PoolError::Backend(e) => e,
            err => Self::Pool(err.to_string()),
        }
    }
}
