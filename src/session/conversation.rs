use crate::error::ChatError;
use crate::models::chat::{ ChatTurn, Role };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    Idle,
    AwaitingCompletion,
}

/// Ordered in-memory log of one conversation's turns.
///
/// Turns are only ever appended. While a user turn is waiting for its reply
/// the state is `AwaitingCompletion` and further user turns are refused.
#[derive(Clone, Debug)]
pub struct ConversationState {
    id: String,
    principal: String,
    turns: Vec<ChatTurn>,
    status: CompletionStatus,
}

impl ConversationState {
    pub fn new(id: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::from_turns(id, principal, Vec::new())
    }

    /// Rebuilds state from persisted turns. A reloaded conversation is always idle.
    pub fn from_turns(
        id: impl Into<String>,
        principal: impl Into<String>,
        turns: Vec<ChatTurn>
    ) -> Self {
        Self {
            id: id.into(),
            principal: principal.into(),
            turns,
            status: CompletionStatus::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    pub fn is_awaiting(&self) -> bool {
        self.status == CompletionStatus::AwaitingCompletion
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Result<&ChatTurn, ChatError> {
        self.push_user(ChatTurn::user(text))
    }

    pub(crate) fn push_user(&mut self, turn: ChatTurn) -> Result<&ChatTurn, ChatError> {
        if self.is_awaiting() {
            return Err(ChatError::Busy(self.id.clone()));
        }
        debug_assert_eq!(turn.role, Role::User);
        self.turns.push(turn);
        self.status = CompletionStatus::AwaitingCompletion;
        Ok(&self.turns[self.turns.len() - 1])
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) -> &ChatTurn {
        self.push_assistant(ChatTurn::assistant(text))
    }

    pub(crate) fn push_assistant(&mut self, turn: ChatTurn) -> &ChatTurn {
        debug_assert_eq!(turn.role, Role::Assistant);
        self.turns.push(turn);
        self.status = CompletionStatus::Idle;
        &self.turns[self.turns.len() - 1]
    }

    /// Drops the pending completion without recording a reply.
    pub fn cancel_pending(&mut self) {
        self.status = CompletionStatus::Idle;
    }

    /// Full history, oldest first. No truncation is applied.
    pub fn snapshot(&self) -> &[ChatTurn] {
        &self.turns
    }
}
