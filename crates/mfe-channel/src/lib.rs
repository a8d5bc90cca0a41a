//! Notification plumbing for the micro-frontend state store.
//!
//! Two independent fan-out mechanisms live here:
//!
//! - The **broadcast transport** ([`BroadcastTransport`], [`ChannelHandle`])
//!   carries [`BroadcastMessage`]s between isolated contexts that share a
//!   channel name. Delivery never includes the sender and is at-most-once per
//!   live receiver. [`LocalBroadcastHub`] is the in-process implementation.
//! - The **event bus** ([`EventBus`]) dispatches [`Change`]s to listeners in the
//!   current context, keyed by the composite [`EventName`] `(channel, key)`.
//!   [`subscribe_to_key`] attaches to the process-wide bus using only a channel
//!   name and a key.
//!
//! # Namespace collisions
//!
//! Event names are scoped by channel name only. Two unrelated stores that are
//! configured with the same channel name share one namespace on the bus and
//! on the transport: a listener on `("app", "user")` hears both of them. Pick
//! channel names that are unique per logical store.

pub mod bus;
pub mod error;
pub mod hub;
pub mod listener;
pub mod message;
pub mod transport;

pub use bus::{subscribe_to_key, Change, EventBus, EventName};
pub use error::{TransportError, TransportResult};
pub use hub::LocalBroadcastHub;
pub use listener::{listener, Listener, ListenerId, ListenerSet, Unsubscribe};
pub use message::BroadcastMessage;
pub use transport::{BroadcastTransport, ChannelHandle, MessageHandler};
