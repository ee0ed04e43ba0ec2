use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope of a booking that originated inside a chat session. Ephemeral: built
/// from request data, used to key lookups and log lines, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingContext {
    pub conversation_id: ConversationId,
    pub business_id: BusinessId,
}

impl BookingContext {
    pub fn new(conversation_id: ConversationId, business_id: BusinessId) -> Self {
        Self { conversation_id, business_id }
    }
}
