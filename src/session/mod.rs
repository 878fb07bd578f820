//! One chat cycle: append the user turn, stream the reply, record it.

mod conversation;

pub use self::conversation::{ CompletionStatus, ConversationState };

use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::Arc;

use crate::error::ChatError;
use crate::history::HistoryStore;
use crate::llm::chat::{ generate_title, is_error_fragment, ChatClient, FragmentStream };
use crate::models::chat::{ ChatTurn, Role };
use crate::usage::{ UsageRecord, UsageStore };

pub struct ChatSession {
    client: Arc<dyn ChatClient>,
    history: Arc<dyn HistoryStore>,
    usage: Option<Arc<dyn UsageStore>>,
    state: ConversationState,
    auto_title: bool,
}

impl ChatSession {
    /// Starts a new, empty conversation owned by `principal`.
    pub async fn create(
        client: Arc<dyn ChatClient>,
        history: Arc<dyn HistoryStore>,
        principal: &str
    ) -> Result<Self, ChatError> {
        let id = history.create_conversation(principal).await?;
        info!("Created conversation {} for {}", id, principal);
        Ok(Self::from_state(client, history, ConversationState::new(id, principal)))
    }

    /// Reloads a persisted conversation.
    pub async fn resume(
        client: Arc<dyn ChatClient>,
        history: Arc<dyn HistoryStore>,
        conversation_id: &str
    ) -> Result<Self, ChatError> {
        let summary = history.get_summary(conversation_id).await?;
        let turns = history.load_conversation(conversation_id).await?;
        info!("Resumed conversation {} ({} turns)", conversation_id, turns.len());
        let state = ConversationState::from_turns(conversation_id, summary.principal, turns);
        Ok(Self::from_state(client, history, state))
    }

    fn from_state(
        client: Arc<dyn ChatClient>,
        history: Arc<dyn HistoryStore>,
        state: ConversationState
    ) -> Self {
        Self {
            client,
            history,
            usage: None,
            state,
            auto_title: false,
        }
    }

    pub fn with_usage_store(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_auto_title(mut self, enabled: bool) -> Self {
        self.auto_title = enabled;
        self
    }

    pub fn conversation_id(&self) -> &str {
        self.state.id()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Records `text` as the next user turn and opens the reply stream.
    ///
    /// The returned reply borrows the session, so only one completion can be
    /// pending at a time.
    pub async fn submit(&mut self, text: &str) -> Result<PendingReply<'_>, ChatError> {
        if self.state.is_awaiting() {
            return Err(ChatError::Busy(self.state.id().to_string()));
        }
        let turn = ChatTurn::user(text);
        self.history.append_turn(self.state.id(), &turn).await?;
        self.state.push_user(turn)?;

        let stream = self.client.stream_completion(self.state.snapshot());
        Ok(PendingReply {
            session: self,
            stream: Some(stream),
            text: String::new(),
            finished: false,
        })
    }

    /// Deletes the conversation from the store, consuming the session.
    pub async fn delete(self) -> Result<(), ChatError> {
        self.history.delete_conversation(self.state.id()).await?;
        info!("Deleted conversation {}", self.state.id());
        Ok(())
    }

    async fn maybe_generate_title(&self, reply: &str) {
        if !self.auto_title || is_error_fragment(reply) {
            return;
        }
        let user_turns = self.state
            .snapshot()
            .iter()
            .filter(|t| t.role == Role::User)
            .count();
        if user_turns != 1 {
            return;
        }
        let Some(first) = self.state.snapshot().first() else {
            return;
        };

        let (title, usage) = generate_title(self.client.as_ref(), &first.content).await;
        if let Err(e) = self.history.rename_conversation(self.state.id(), &title).await {
            warn!("Failed to store title for {}: {}", self.state.id(), e);
        }
        if let (Some(store), Some(usage)) = (&self.usage, usage) {
            let record = UsageRecord::new(self.state.principal(), usage);
            if let Err(e) = store.record(record).await {
                warn!("Failed to record token usage: {}", e);
            }
        }
    }
}

/// An in-flight assistant reply.
///
/// Dropping it before [`PendingReply::finish`] cancels the request: the
/// connection is released and no assistant turn is recorded.
pub struct PendingReply<'a> {
    session: &'a mut ChatSession,
    stream: Option<FragmentStream>,
    text: String,
    finished: bool,
}

impl<'a> PendingReply<'a> {
    /// Next fragment in arrival order, or `None` once the reply is complete.
    pub async fn next_fragment(&mut self) -> Option<String> {
        let stream = self.stream.as_mut()?;
        match stream.next().await {
            Some(fragment) => {
                self.text.push_str(&fragment);
                Some(fragment)
            }
            None => {
                self.stream = None;
                None
            }
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Drains the remaining fragments and records the assistant turn.
    pub async fn finish(mut self) -> Result<String, ChatError> {
        while self.next_fragment().await.is_some() {}

        let reply = std::mem::take(&mut self.text);
        let turn = ChatTurn::assistant(reply.clone());
        // on failure the drop handler returns the reducer to idle without the turn
        self.session.history.append_turn(self.session.state.id(), &turn).await?;
        self.session.state.push_assistant(turn);
        self.finished = true;

        self.session.maybe_generate_title(&reply).await;
        Ok(reply)
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.stream = None;
        self.session.state.cancel_pending();
        debug!("Reply for {} cancelled after {} bytes", self.session.state.id(), self.text.len());
    }
}
