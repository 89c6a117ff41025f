use amq_protocol_types::FieldTable;
use lapin::Channel;

#[async_trait::async_trait]
/// A hook to execute logic before a [`Consumer`] starts pulling messages.
///
/// # Use case
///
/// [`Consumer`]s process messages retrieved from a queue. Who is in charge of creating the queue
/// resource? What about the exchange the queue needs to be bound to?
///
/// Our consumers work on ephemeral queues, hence they are in charge of creating the objects they
/// rely on. A pre-start hook gives you access to a channel, allowing you to perform actions
/// against the message broker before the consumer actually starts pulling messages.
///
/// Check out [`hooks::pre_start`] for the available implementations.
///
/// [`Consumer`]: crate::consumers::Consumer
/// [`hooks::pre_start`]: crate::consumers::hooks::pre_start
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error>;
}

/// assert it's object safe
type _CHECK = Box<dyn ConsumerPreStartHook>;
