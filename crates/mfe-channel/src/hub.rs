//! In-process broadcast transport built on `tokio::sync::broadcast`.
//!
//! Every handle opened on a channel name gets its own receiver on a shared
//! broadcast channel. Messages carry the id of the posting handle so the
//! delivery task can drop the sender's own posts. A receiver that falls more
//! than `capacity` messages behind loses the oldest ones; the gap is logged
//! and delivery continues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::message::BroadcastMessage;
use crate::transport::{BroadcastTransport, ChannelHandle, MessageHandler};

/// Default per-channel buffer, in messages.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct Envelope {
    origin: u64,
    payload: Arc<str>,
}

struct HubInner {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    next_handle: AtomicU64,
    capacity: usize,
}

impl HubInner {
    /// Forget `channel_name` once no handle is subscribed to it.
    fn prune(&self, channel_name: &str) {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        if channels
            .get(channel_name)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel_name);
            debug!(channel = channel_name, "channel pruned");
        }
    }
}

/// Shared in-process implementation of [`BroadcastTransport`].
///
/// Clones address the same set of channels. Handles opened from one hub
/// stand for separate contexts of the same origin.
#[derive(Clone)]
pub struct LocalBroadcastHub {
    inner: Arc<HubInner>,
}

impl LocalBroadcastHub {
    /// Create a hub with the default per-channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub whose channels buffer up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// The process-wide hub.
    pub fn global() -> &'static LocalBroadcastHub {
        static GLOBAL_HUB: OnceLock<LocalBroadcastHub> = OnceLock::new();
        GLOBAL_HUB.get_or_init(LocalBroadcastHub::new)
    }

    /// Number of channel names with at least one handle, or whose last
    /// handle has not been pruned yet.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().expect("hub lock poisoned").len()
    }

    /// Number of open handles on `channel_name`.
    pub fn member_count(&self, channel_name: &str) -> usize {
        let channels = self.inner.channels.lock().expect("hub lock poisoned");
        channels
            .get(channel_name)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for LocalBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalBroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.channels.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("LocalBroadcastHub")
            .field("channel_count", &count)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl BroadcastTransport for LocalBroadcastHub {
    fn open(&self, channel_name: &str) -> TransportResult<Box<dyn ChannelHandle>> {
        if channel_name.is_empty() {
            return Err(TransportError::InvalidChannel(channel_name.to_string()));
        }
        let sender = {
            let mut channels = self.inner.channels.lock().expect("hub lock poisoned");
            // Handles whose delivery task was still winding down at close.
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels
                .entry(channel_name.to_string())
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                .clone()
        };
        let receiver = sender.subscribe();
        let id = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        debug!(channel = channel_name, handle = id, "channel opened");

        Ok(Box::new(LocalChannel {
            name: channel_name.to_string(),
            id,
            hub: Arc::downgrade(&self.inner),
            sender,
            receiver: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One handle on a hub channel.
struct LocalChannel {
    name: String,
    id: u64,
    hub: Weak<HubInner>,
    sender: broadcast::Sender<Envelope>,
    receiver: Mutex<Option<broadcast::Receiver<Envelope>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChannelHandle for LocalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: &BroadcastMessage) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.name.clone()));
        }
        let envelope = Envelope {
            origin: self.id,
            payload: Arc::from(message.encode()?),
        };
        // An error only means nobody is listening right now.
        match self.sender.send(envelope) {
            Ok(receivers) => {
                debug!(channel = %self.name, kind = message.kind(), receivers, "message posted")
            }
            Err(_) => debug!(channel = %self.name, kind = message.kind(), "no receivers"),
        }
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.name.clone()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let mut receiver = self
            .receiver
            .lock()
            .expect("channel lock poisoned")
            .take()
            .ok_or_else(|| TransportError::HandlerInstalled(self.name.clone()))?;

        let own_id = self.id;
        let name = self.name.clone();
        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) if envelope.origin == own_id => continue,
                    Ok(envelope) => match BroadcastMessage::decode(&envelope.payload) {
                        Ok(message) => handler(message),
                        Err(e) => warn!(channel = %name, error = %e, "dropping undecodable message"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %name, skipped, "receiver lagged; messages lost")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *self.task.lock().expect("channel lock poisoned") = Some(task);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.lock().expect("channel lock poisoned").take() {
            task.abort();
        }
        self.receiver.lock().expect("channel lock poisoned").take();
        if let Some(hub) = self.hub.upgrade() {
            hub.prune(&self.name);
        }
        debug!(channel = %self.name, handle = self.id, "channel closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.close();
    }
}
