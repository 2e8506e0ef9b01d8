use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Participant;

/// Order a participant pair into its canonical storage form. Both
/// directions of a pair map to the same key, which is what the uniqueness
/// constraint on conversations is declared over.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    /// The other participant, if `user_id` belongs to this conversation.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.user_low {
            Some(self.user_high)
        } else if user_id == self.user_high {
            Some(self.user_low)
        } else {
            None
        }
    }
}

/// Display-enriched conversation snapshot pushed to list views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub participants: Vec<Participant>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
}
