use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ normalize_tag, HistoryStore };
use crate::error::ChatError;
use crate::models::chat::{ ChatTurn, ConversationSummary, DEFAULT_CONVERSATION_TITLE };

struct StoredConversation {
    summary: ConversationSummary,
    turns: Vec<ChatTurn>,
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, StoredConversation>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(conversation_id: &str) -> ChatError {
    ChatError::NotFound(conversation_id.to_string())
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create_conversation(&self, principal: &str) -> Result<String, ChatError> {
        let id = Uuid::new_v4().to_string();
        let summary = ConversationSummary {
            id: id.clone(),
            principal: principal.to_string(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            tags: Vec::new(),
            created_at: Utc::now(),
        };
        self.conversations
            .write().await
            .insert(id.clone(), StoredConversation { summary, turns: Vec::new() });
        Ok(id)
    }

    async fn append_turn(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatError> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(conversation_id).ok_or_else(|| not_found(conversation_id))?;
        stored.turns.push(turn.clone());
        Ok(())
    }

    async fn load_conversation(&self, conversation_id: &str) -> Result<Vec<ChatTurn>, ChatError> {
        let conversations = self.conversations.read().await;
        conversations
            .get(conversation_id)
            .map(|stored| stored.turns.clone())
            .ok_or_else(|| not_found(conversation_id))
    }

    async fn list_conversations(
        &self,
        principal: &str
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let conversations = self.conversations.read().await;
        let mut owned: Vec<ConversationSummary> = conversations
            .values()
            .filter(|stored| stored.summary.principal == principal)
            .map(|stored| stored.summary.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<ConversationSummary, ChatError> {
        let conversations = self.conversations.read().await;
        conversations
            .get(conversation_id)
            .map(|stored| stored.summary.clone())
            .ok_or_else(|| not_found(conversation_id))
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ChatError> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(conversation_id).ok_or_else(|| not_found(conversation_id))?;
        stored.summary.title = title.to_string();
        Ok(())
    }

    async fn add_tag(&self, conversation_id: &str, tag: &str) -> Result<(), ChatError> {
        let tag = normalize_tag(tag);
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(conversation_id).ok_or_else(|| not_found(conversation_id))?;
        if !tag.is_empty() && !stored.summary.tags.contains(&tag) {
            stored.summary.tags.push(tag);
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        self.conversations
            .write().await
            .remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| not_found(conversation_id))
    }
}
