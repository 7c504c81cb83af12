use std::sync::Mutex;
use std::sync::atomic::{ AtomicBool, Ordering };

use log::debug;
use tokio::sync::broadcast;

use super::{ RealtimeChannel, EVENT_BUFFER };
use crate::error::{ ChatError, ChatResult };
use crate::models::realtime::{ ClientEvent, ServerEvent };

/// In-process channel: records what was emitted and lets the caller inject
/// inbound events.
pub struct MemoryChannel {
    inbound: broadcast::Sender<ServerEvent>,
    emitted: Mutex<Vec<ClientEvent>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inbound,
            emitted: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Delivers an event to every current subscriber. Returns how many got it.
    pub fn inject(&self, event: ServerEvent) -> usize {
        self.inbound.send(event).unwrap_or(0)
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inbound.receiver_count()
    }

    /// Makes every later `emit` fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel for MemoryChannel {
    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::ChannelClosed);
        }
        debug!("memory channel emit: {}", event.name());
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inbound.subscribe()
    }
}
