use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::{ Client, AsyncCommands };
use uuid::Uuid;

use crate::error::ChatError;
use crate::history::{ normalize_tag, HistoryStore };
use crate::models::chat::{ ChatTurn, ConversationSummary, DEFAULT_CONVERSATION_TITLE };

/// Key layout under `key_prefix`:
/// `turns:{id}` list of JSON turns (RPUSH order),
/// `meta:{id}` JSON summary,
/// `owner:{principal}` sorted set of ids scored by creation time.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, ChatError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn turns_key(&self, conversation_id: &str) -> String {
        format!("{}turns:{}", self.key_prefix, conversation_id)
    }

    fn meta_key(&self, conversation_id: &str) -> String {
        format!("{}meta:{}", self.key_prefix, conversation_id)
    }

    fn owner_key(&self, principal: &str) -> String {
        format!("{}owner:{}", self.key_prefix, principal)
    }

    async fn read_summary(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        conversation_id: &str
    ) -> Result<ConversationSummary, ChatError> {
        let raw: Option<String> = conn.get(self.meta_key(conversation_id)).await?;
        let raw = raw.ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_summary(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        summary: &ConversationSummary
    ) -> Result<(), ChatError> {
        let json = serde_json::to_string(summary)?;
        conn.set::<_, _, ()>(self.meta_key(&summary.id), json).await?;
        Ok(())
    }
}

/// Decodes a stored turn list in LRANGE order. One bad entry fails the whole
/// load so a resumed conversation never silently loses a turn.
fn parse_turns(conversation_id: &str, json_entries: &[String]) -> Result<Vec<ChatTurn>, ChatError> {
    json_entries
        .iter()
        .enumerate()
        .map(|(index, json_entry)| {
            serde_json::from_str::<ChatTurn>(json_entry).map_err(|e| {
                error!("Error parsing history entry {} in {}: {}", index, conversation_id, e);
                ChatError::Storage(
                    format!("Corrupt turn {} in conversation {}: {}", index, conversation_id, e)
                )
            })
        })
        .collect()
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn create_conversation(&self, principal: &str) -> Result<String, ChatError> {
        let mut conn = self.get_connection().await?;
        let summary = ConversationSummary {
            id: Uuid::new_v4().to_string(),
            principal: principal.to_string(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            tags: Vec::new(),
            created_at: Utc::now(),
        };
        self.write_summary(&mut conn, &summary).await?;
        conn.zadd::<_, _, _, ()>(
            self.owner_key(principal),
            &summary.id,
            summary.created_at.timestamp_millis()
        ).await?;
        Ok(summary.id)
    }

    async fn append_turn(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatError> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(self.meta_key(conversation_id)).await?;
        if !exists {
            return Err(ChatError::NotFound(conversation_id.to_string()));
        }
        let json_turn = serde_json::to_string(turn)?;
        conn.rpush::<_, _, ()>(self.turns_key(conversation_id), json_turn).await?;
        Ok(())
    }

    async fn load_conversation(&self, conversation_id: &str) -> Result<Vec<ChatTurn>, ChatError> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(self.meta_key(conversation_id)).await?;
        if !exists {
            return Err(ChatError::NotFound(conversation_id.to_string()));
        }
        let json_entries: Vec<String> = conn.lrange(self.turns_key(conversation_id), 0, -1).await?;
        parse_turns(conversation_id, &json_entries)
    }

    async fn list_conversations(
        &self,
        principal: &str
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.owner_key(principal), 0, -1).await?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_summary(&mut conn, &id).await {
                Ok(summary) => summaries.push(summary),
                Err(ChatError::NotFound(_)) => {}
                Err(e) => {
                    return Err(e);
                }
            }
        }
        Ok(summaries)
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<ConversationSummary, ChatError> {
        let mut conn = self.get_connection().await?;
        self.read_summary(&mut conn, conversation_id).await
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ChatError> {
        let mut conn = self.get_connection().await?;
        let mut summary = self.read_summary(&mut conn, conversation_id).await?;
        summary.title = title.to_string();
        self.write_summary(&mut conn, &summary).await
    }

    async fn add_tag(&self, conversation_id: &str, tag: &str) -> Result<(), ChatError> {
        let tag = normalize_tag(tag);
        let mut conn = self.get_connection().await?;
        let mut summary = self.read_summary(&mut conn, conversation_id).await?;
        if tag.is_empty() || summary.tags.contains(&tag) {
            return Ok(());
        }
        summary.tags.push(tag);
        self.write_summary(&mut conn, &summary).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        let mut conn = self.get_connection().await?;
        let summary = self.read_summary(&mut conn, conversation_id).await?;
        conn.del::<_, ()>(vec![self.meta_key(conversation_id), self.turns_key(conversation_id)]).await?;
        conn.zrem::<_, _, ()>(self.owner_key(&summary.principal), conversation_id).await?;
        Ok(())
    }
}
