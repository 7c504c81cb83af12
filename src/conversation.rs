use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use log::{ debug, error, info, warn };
use tokio::sync::broadcast::{ self, error::RecvError };
use tokio::time::Instant;

use crate::models::chat::{ DeliveryStatus, Message };
use crate::models::realtime::{ ClientEvent, InboundMessage, ServerEvent, TypingNotice };
use crate::models::user::UserId;
use crate::realtime::RealtimeChannel;
use crate::session::Session;

pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_SEPARATOR_GAP: Duration = Duration::from_millis(300_000);
pub const MAX_DRAFT_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub typing_timeout: Duration,
    pub separator_gap: Duration,
    /// Outbound typing signals allowed per second.
    pub typing_per_second: NonZeroU32,
    pub max_draft_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            separator_gap: DEFAULT_SEPARATOR_GAP,
            typing_per_second: NonZeroU32::new(2).unwrap_or(NonZeroU32::MIN),
            max_draft_chars: MAX_DRAFT_CHARS,
        }
    }
}

/// A key event from the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Enter,
    ShiftEnter,
    Other,
}

/// What changed after an event, so the host knows what to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// A message was appended at `index`; the thread should scroll to the bottom.
    MessageAppended {
        index: usize,
    },
    /// The delivery status of the entry at `index` changed.
    MessageUpdated {
        index: usize,
    },
    TypingChanged(bool),
    PresenceChanged {
        counterpart_online: bool,
    },
    Unchanged,
}

/// Indices of messages that get a time separator drawn above them.
///
/// The first message always does; after that, any message more than `gap`
/// later than the message that opened the current group. A steady trickle
/// of replies therefore still gets a fresh timestamp every `gap`.
pub fn separators(messages: &[Message], gap: Duration) -> Vec<usize> {
    let gap_ms = i64::try_from(gap.as_millis()).unwrap_or(i64::MAX);
    let mut anchor: Option<chrono::DateTime<Utc>> = None;
    let mut indices = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        let opens_group = match anchor {
            None => true,
            Some(start) => (message.timestamp - start).num_milliseconds() > gap_ms,
        };
        if opens_group {
            anchor = Some(message.timestamp);
            indices.push(i);
        }
    }
    indices
}

/// One live one-to-one thread with `counterpart`.
///
/// Mounting joins the local user's room and subscribes to the shared channel;
/// unmounting (or dropping) releases only the subscription.
pub struct Conversation {
    channel: Arc<dyn RealtimeChannel>,
    local_id: UserId,
    counterpart: UserId,
    config: ConversationConfig,
    subscription: Option<broadcast::Receiver<ServerEvent>>,
    messages: Vec<Message>,
    online: HashSet<String>,
    typing_until: Option<Instant>,
    draft: String,
    typing_limiter: DefaultDirectRateLimiter,
}

impl Conversation {
    pub fn mount(
        channel: Arc<dyn RealtimeChannel>,
        session: &Session,
        counterpart: UserId,
        config: ConversationConfig
    ) -> Self {
        let local_id = session.user_id().clone();
        // Subscribe first so the presence snapshot that answers `join` is not missed.
        let subscription = channel.subscribe();
        info!("Joining with userId: {}", local_id);
        if let Err(e) = channel.emit(ClientEvent::Join { user_id: local_id.clone() }) {
            error!("Failed to join room for {}: {}", local_id, e);
        }

        let typing_limiter = RateLimiter::direct(Quota::per_second(config.typing_per_second));

        Self {
            channel,
            local_id,
            counterpart,
            config,
            subscription: Some(subscription),
            messages: Vec::new(),
            online: HashSet::new(),
            typing_until: None,
            draft: String::new(),
            typing_limiter,
        }
    }

    pub fn unmount(&mut self) {
        if self.subscription.take().is_some() {
            debug!("Conversation with {} unmounted", self.counterpart);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn local_id(&self) -> &UserId {
        &self.local_id
    }

    pub fn counterpart(&self) -> &UserId {
        &self.counterpart
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn separators(&self) -> Vec<usize> {
        separators(&self.messages, self.config.separator_gap)
    }

    pub fn is_online(&self) -> bool {
        self.online.contains(self.counterpart.as_str())
    }

    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing_until.map_or(false, |deadline| now < deadline)
    }

    /// Applies one inbound event.
    pub fn handle(&mut self, event: ServerEvent, now: Instant) -> Update {
        match event {
            ServerEvent::ReceiveMessage(inbound) => self.receive(inbound),
            ServerEvent::Typing(notice) => self.typing_signal(notice, now),
            ServerEvent::OnlineUsers(ids) => {
                debug!("Online users: {:?}", ids);
                self.online = ids.into_iter().map(|id| id.to_string()).collect();
                Update::PresenceChanged { counterpart_online: self.is_online() }
            }
        }
    }

    fn receive(&mut self, inbound: InboundMessage) -> Update {
        let from_counterpart =
            inbound.sender_id == self.counterpart && inbound.receiver_id == self.local_id;
        let from_local =
            inbound.sender_id == self.local_id && inbound.receiver_id == self.counterpart;
        if !from_counterpart && !from_local {
            debug!(
                "Dropping message {} -> {} outside conversation with {}",
                inbound.sender_id,
                inbound.receiver_id,
                self.counterpart
            );
            return Update::Unchanged;
        }

        if from_local {
            // The server relays our own sends back; settle the optimistic entry instead.
            let echoed = self.messages
                .iter()
                .position(|m| {
                    m.status == DeliveryStatus::Sent &&
                        m.is_from(&self.local_id) &&
                        m.text == inbound.message
                });
            if let Some(index) = echoed {
                self.messages[index].status = DeliveryStatus::Delivered;
                return Update::MessageUpdated { index };
            }
        }

        let timestamp = inbound.timestamp.unwrap_or_else(Utc::now);
        let mut message = Message::incoming(
            inbound.sender_id,
            inbound.receiver_id,
            inbound.message,
            timestamp
        );
        if from_local {
            // Sent from another session of the same user.
            message.status = DeliveryStatus::Delivered;
        }
        self.messages.push(message);
        Update::MessageAppended { index: self.messages.len() - 1 }
    }

    fn typing_signal(&mut self, notice: TypingNotice, now: Instant) -> Update {
        if let Some(sender) = &notice.sender_id {
            if sender != &self.counterpart {
                return Update::Unchanged;
            }
        }

        let was_typing = self.is_typing(now);
        // A fresh signal restarts the window instead of stacking timers.
        self.typing_until = Some(now + self.config.typing_timeout);
        if was_typing {
            Update::Unchanged
        } else {
            Update::TypingChanged(true)
        }
    }

    /// Clears the typing flag once its window has passed.
    pub fn expire_typing(&mut self, now: Instant) -> Option<Update> {
        match self.typing_until {
            Some(deadline) if now >= deadline => {
                self.typing_until = None;
                Some(Update::TypingChanged(false))
            }
            _ => None,
        }
    }

    /// Waits for the next inbound event or typing expiry that changes state.
    ///
    /// Returns `None` once unmounted or when the channel is gone.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            let deadline = self.typing_until;
            let subscription = self.subscription.as_mut()?;
            let received = match deadline {
                Some(deadline) =>
                    tokio::select! {
                        event = subscription.recv() => Some(event),
                        _ = tokio::time::sleep_until(deadline) => None,
                    },
                None => Some(subscription.recv().await),
            };

            match received {
                None => {
                    if let Some(update) = self.expire_typing(Instant::now()) {
                        return Some(update);
                    }
                }
                Some(Ok(event)) => {
                    let update = self.handle(event, Instant::now());
                    if update != Update::Unchanged {
                        return Some(update);
                    }
                }
                Some(Err(RecvError::Lagged(skipped))) => {
                    warn!("Conversation with {} skipped {} events", self.counterpart, skipped);
                }
                Some(Err(RecvError::Closed)) => {
                    info!("Real-time channel closed; conversation with {} stops", self.counterpart);
                    self.subscription = None;
                    return None;
                }
            }
        }
    }

    // --- composer ---

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.chars().take(self.config.max_draft_chars).collect();
    }

    pub fn char_count(&self) -> usize {
        self.draft.chars().count()
    }

    pub fn can_send(&self) -> bool {
        !self.draft.trim().is_empty()
    }

    pub fn key_press(&mut self, key: KeyPress) -> Option<Update> {
        match key {
            KeyPress::Enter => self.send(),
            KeyPress::ShiftEnter => {
                if self.char_count() < self.config.max_draft_chars {
                    self.draft.push('\n');
                }
                self.notify_typing();
                None
            }
            KeyPress::Other => {
                self.notify_typing();
                None
            }
        }
    }

    /// Emits a typing signal unless the rate limit says it is too soon.
    pub fn notify_typing(&mut self) -> bool {
        if self.typing_limiter.check().is_err() {
            return false;
        }
        match self.channel.emit(ClientEvent::Typing { receiver_id: self.counterpart.clone() }) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send typing signal to {}: {}", self.counterpart, e);
                false
            }
        }
    }

    /// Sends the draft and appends it to the thread without waiting for the
    /// server. Blank drafts are ignored.
    pub fn send(&mut self) -> Option<Update> {
        if !self.can_send() {
            return None;
        }

        let text = std::mem::take(&mut self.draft);
        let mut message = Message::outgoing(
            self.local_id.clone(),
            self.counterpart.clone(),
            text.clone(),
            Utc::now()
        );
        let event = ClientEvent::SendMessage {
            sender_id: self.local_id.clone(),
            receiver_id: self.counterpart.clone(),
            message: text,
        };
        message.status = match self.channel.emit(event) {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                error!("Failed to send message to {}: {}", self.counterpart, e);
                DeliveryStatus::Failed
            }
        };

        self.messages.push(message);
        Some(Update::MessageAppended { index: self.messages.len() - 1 })
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.unmount();
    }
}
