use chrono::{ DateTime, Utc };
use uuid::Uuid;

use super::user::UserId;

/// Where a thread entry stands with respect to the real-time transport.
///
/// There is no delivery acknowledgement on the wire, so `Sent` only means the
/// transport accepted the frame. `Delivered` marks our own message once the
/// server has relayed it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Received,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    pub fn outgoing(
        sender_id: UserId,
        receiver_id: UserId,
        text: String,
        timestamp: DateTime<Utc>
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text,
            timestamp,
            status: DeliveryStatus::Pending,
        }
    }

    pub fn incoming(
        sender_id: UserId,
        receiver_id: UserId,
        text: String,
        timestamp: DateTime<Utc>
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text,
            timestamp,
            status: DeliveryStatus::Received,
        }
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }
}
