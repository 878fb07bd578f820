mod memory;
mod redis;

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use serde::Deserialize;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::ChatError;
use crate::models::chat::{ ChatTurn, ConversationSummary, Role };

/// Document store for conversations. Turn order must survive a reload.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create_conversation(&self, principal: &str) -> Result<String, ChatError>;

    async fn append_turn(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatError>;

    async fn load_conversation(&self, conversation_id: &str) -> Result<Vec<ChatTurn>, ChatError>;

    /// Conversations owned by `principal`, most recently created first.
    async fn list_conversations(
        &self,
        principal: &str
    ) -> Result<Vec<ConversationSummary>, ChatError>;

    async fn get_summary(&self, conversation_id: &str) -> Result<ConversationSummary, ChatError>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ChatError>;

    async fn add_tag(&self, conversation_id: &str, tag: &str) -> Result<(), ChatError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError>;
}

pub fn create_history_store(args: &Args) -> Result<Arc<dyn HistoryStore>, ChatError> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        other => Err(ChatError::Config(format!("Unsupported history store type: {}", other))),
    }
}

pub fn initialize_history_store(args: &Args) -> Result<Arc<dyn HistoryStore>, ChatError> {
    info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    create_history_store(args)
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Record shape written by older chat front-ends before turns carried a role.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyMessage {
    pub text: String,
    pub is_user: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LegacyMessage {
    pub fn into_turn(self) -> ChatTurn {
        let role = if self.is_user { Role::User } else { Role::Assistant };
        ChatTurn {
            role,
            content: self.text,
            created_at: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Imports a batch of legacy records into a fresh conversation, keeping their order.
pub async fn import_legacy(
    store: &dyn HistoryStore,
    principal: &str,
    messages: Vec<LegacyMessage>
) -> Result<String, ChatError> {
    let conversation_id = store.create_conversation(principal).await?;
    for message in messages {
        store.append_turn(&conversation_id, &message.into_turn()).await?;
    }
    info!("Imported legacy history for {} into {}", principal, conversation_id);
    Ok(conversation_id)
}
