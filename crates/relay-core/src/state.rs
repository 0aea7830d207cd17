//! Per-chat conversation state shared by the flow managers.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use crate::domain::ChatId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WelcomeStep {
    AwaitingMessage,
    AwaitingButtons,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastStep {
    AwaitText,
    AwaitMedia,
    AwaitButtons,
}

/// The single active flow tag of a chat. Absence means no flow is waiting for input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Welcome(WelcomeStep),
    Broadcast(BroadcastStep),
}

/// `chat → FlowState` table.
///
/// Setting a state overwrites the previous one; there is no history. The lock is a
/// std mutex because every operation is a single map access and is never held
/// across an `.await`.
#[derive(Debug, Default)]
pub struct ConversationStates {
    inner: Mutex<HashMap<ChatId, FlowState>>,
}

impl ConversationStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat_id: ChatId) -> Option<FlowState> {
        self.lock().get(&chat_id).copied()
    }

    pub fn set(&self, chat_id: ChatId, state: FlowState) {
        tracing::debug!(chat_id = chat_id.0, ?state, "conversation state set");
        self.lock().insert(chat_id, state);
    }

    pub fn clear(&self, chat_id: ChatId) {
        if self.lock().remove(&chat_id).is_some() {
            tracing::debug!(chat_id = chat_id.0, "conversation state cleared");
        }
    }

    pub fn welcome_step(&self, chat_id: ChatId) -> Option<WelcomeStep> {
        match self.get(chat_id)? {
            FlowState::Welcome(step) => Some(step),
            FlowState::Broadcast(_) => None,
        }
    }

    pub fn broadcast_step(&self, chat_id: ChatId) -> Option<BroadcastStep> {
        match self.get(chat_id)? {
            FlowState::Broadcast(step) => Some(step),
            FlowState::Welcome(_) => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, FlowState>> {
        // A panic while holding this lock cannot leave the map half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
