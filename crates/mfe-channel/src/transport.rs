use std::sync::Arc;

use crate::error::TransportResult;
use crate::message::BroadcastMessage;

/// Callback receiving messages posted by other contexts.
pub type MessageHandler = Arc<dyn Fn(BroadcastMessage) + Send + Sync>;

/// Cross-context publish/receive service.
///
/// Implementations must never deliver a message back to the handle that
/// posted it. Ordering, acknowledgement, and retry are not part of the
/// contract; a reliable transport may add them without changing callers.
pub trait BroadcastTransport: Send + Sync {
    /// Join the channel named `channel_name`.
    ///
    /// A message posted by any other handle on the same channel after this
    /// call returns is eligible for delivery to this handle.
    fn open(&self, channel_name: &str) -> TransportResult<Box<dyn ChannelHandle>>;
}

/// One context's membership in a broadcast channel.
pub trait ChannelHandle: Send + Sync {
    /// Channel name this handle was opened on.
    fn name(&self) -> &str;

    /// Send `message` to every other live handle on the channel.
    fn post(&self, message: &BroadcastMessage) -> TransportResult<()>;

    /// Install the handler for inbound messages. At most one per handle.
    fn on_message(&self, handler: MessageHandler) -> TransportResult<()>;

    /// Leave the channel. Further posts fail; no more messages are delivered.
    fn close(&self);

    /// Returns `true` once `close` has run.
    fn is_closed(&self) -> bool;
}
