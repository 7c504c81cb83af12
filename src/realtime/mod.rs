mod client;
mod memory;

pub use client::RealtimeClient;
pub use memory::MemoryChannel;

use tokio::sync::broadcast;

use crate::error::ChatResult;
use crate::models::realtime::{ ClientEvent, ServerEvent };

/// Capacity of the fan-out queue each subscriber reads from.
pub const EVENT_BUFFER: usize = 256;

/// A shared, long-lived connection to the real-time messaging service.
///
/// Views borrow it for the duration of a mount: they emit through it and hold
/// a subscription, which they drop on unmount. The connection itself belongs
/// to whoever constructed it.
pub trait RealtimeChannel: Send + Sync {
    /// Fire-and-forget. `Ok` means the frame was queued, not that it arrived.
    fn emit(&self, event: ClientEvent) -> ChatResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;
}
