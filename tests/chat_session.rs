mod common;

use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::{ Json, Router };
use chatstream::error::ChatError;
use chatstream::history::{ HistoryStore, MemoryHistoryStore };
use chatstream::llm::chat::{ new_client, ChatClient };
use chatstream::models::chat::{ ChatTurn, ConversationSummary, Role, DEFAULT_CONVERSATION_TITLE };
use chatstream::session::{ ChatSession, CompletionStatus };
use chatstream::usage::{ MemoryUsageStore, UsageStore };
use serde_json::{ json, Value };

use common::*;

/// Streams a canned reply for `stream: true` requests and answers title
/// requests with a JSON completion that reports usage.
fn chat_upstream() -> Router {
    Router::new().route(ROUTE, post(|Json(body): Json<Value>| async move {
        if body["stream"] == true {
            let turns = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
            let reply = format!("reply to {} messages", turns);
            let payloads = vec![delta(&reply[..6]), delta(&reply[6..]), "[DONE]".to_string()];
            sse_response(sse_body(&payloads))
        } else {
            Json(json!({
                "choices": [{ "message": { "content": "Greeting Chat" } }],
                "usage": { "prompt_tokens": 9, "completion_tokens": 2 }
            })).into_response()
        }
    }))
}

/// Memory store whose `append_turn` starts failing after `allowed` successes.
struct FlakyHistory {
    inner: MemoryHistoryStore,
    appends: AtomicUsize,
    allowed: usize,
}

impl FlakyHistory {
    fn failing_after(allowed: usize) -> Self {
        Self { inner: MemoryHistoryStore::new(), appends: AtomicUsize::new(0), allowed }
    }
}

#[async_trait]
impl HistoryStore for FlakyHistory {
    async fn create_conversation(&self, principal: &str) -> Result<String, ChatError> {
        self.inner.create_conversation(principal).await
    }

    async fn append_turn(&self, conversation_id: &str, turn: &ChatTurn) -> Result<(), ChatError> {
        if self.appends.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(ChatError::Storage("disk full".to_string()));
        }
        self.inner.append_turn(conversation_id, turn).await
    }

    async fn load_conversation(&self, conversation_id: &str) -> Result<Vec<ChatTurn>, ChatError> {
        self.inner.load_conversation(conversation_id).await
    }

    async fn list_conversations(
        &self,
        principal: &str
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        self.inner.list_conversations(principal).await
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<ConversationSummary, ChatError> {
        self.inner.get_summary(conversation_id).await
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ChatError> {
        self.inner.rename_conversation(conversation_id, title).await
    }

    async fn add_tag(&self, conversation_id: &str, tag: &str) -> Result<(), ChatError> {
        self.inner.add_tag(conversation_id, tag).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        self.inner.delete_conversation(conversation_id).await
    }
}

async fn client_for(app: Router) -> Arc<dyn ChatClient> {
    new_client(&test_config(spawn_upstream(app).await)).unwrap()
}

#[tokio::test]
async fn full_cycle_records_both_turns_title_and_usage() {
    let client = client_for(chat_upstream()).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let usage = Arc::new(MemoryUsageStore::new());

    let mut session = ChatSession::create(client, history.clone(), "a@example.com").await
        .unwrap()
        .with_usage_store(usage.clone())
        .with_auto_title(true);

    let mut reply = session.submit("hello").await.unwrap();
    let first = reply.next_fragment().await.expect("first fragment");
    assert_eq!(first, "reply ");
    assert_eq!(reply.text(), "reply ");
    let text = reply.finish().await.unwrap();
    // system persona + one user turn
    assert_eq!(text, "reply to 2 messages");

    let state = session.state();
    assert_eq!(state.status(), CompletionStatus::Idle);
    let shape: Vec<(Role, &str)> = state
        .snapshot()
        .iter()
        .map(|t| (t.role, t.content.as_str()))
        .collect();
    assert_eq!(shape, vec![(Role::User, "hello"), (Role::Assistant, "reply to 2 messages")]);

    let id = session.conversation_id().to_string();
    assert_eq!(history.load_conversation(&id).await.unwrap(), state.snapshot().to_vec());
    assert_eq!(history.get_summary(&id).await.unwrap().title, "Greeting Chat");

    let totals = usage.totals("a@example.com", None).await.unwrap();
    assert_eq!(totals.total_tokens, 11);
}

#[tokio::test]
async fn second_exchange_sends_full_history_and_keeps_title() {
    let client = client_for(chat_upstream()).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let mut session = ChatSession::create(client, history.clone(), "a@example.com").await
        .unwrap();

    session.submit("one").await.unwrap().finish().await.unwrap();
    let second = session.submit("two").await.unwrap().finish().await.unwrap();
    assert_eq!(second, "reply to 4 messages");
    assert_eq!(session.state().len(), 4);

    let summary = history.get_summary(session.conversation_id()).await.unwrap();
    assert_eq!(summary.title, DEFAULT_CONVERSATION_TITLE);
}

#[tokio::test]
async fn dropping_a_reply_cancels_without_assistant_turn() {
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();
    let app = Router::new().route(ROUTE, post(move || {
        let flag = flag.clone();
        async move { sse_response(endless_body(flag)) }
    }));
    let client = client_for(app).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let mut session = ChatSession::create(client, history.clone(), "a@example.com").await
        .unwrap();

    {
        let mut reply = session.submit("tell me everything").await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), reply.next_fragment())
            .await
            .expect("first fragment in time");
        assert_eq!(first.as_deref(), Some("t0 "));
    }

    assert_eq!(session.state().status(), CompletionStatus::Idle);
    let roles: Vec<Role> = session.state().snapshot().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User]);
    let stored = history.load_conversation(session.conversation_id()).await.unwrap();
    assert_eq!(stored.len(), 1);

    // the session accepts a new question after cancelling
    let reply = session.submit("shorter please").await;
    assert!(reply.is_ok());
}

#[tokio::test]
async fn transport_error_is_recorded_inline() {
    let app = Router::new().route(ROUTE, post(|| async {
        Response::builder().status(502).body(axum::body::Body::from("bad gateway")).unwrap()
    }));
    let client = client_for(app).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let mut session = ChatSession::create(client, history, "a@example.com").await
        .unwrap()
        .with_auto_title(true);

    let text = session.submit("hi").await.unwrap().finish().await.unwrap();
    assert!(text.contains("⚠️ Error"));
    assert!(text.contains("502"));
    assert_eq!(session.state().snapshot()[1].role, Role::Assistant);
}

#[tokio::test]
async fn resume_reloads_persisted_turns() {
    let client = client_for(chat_upstream()).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let id = {
        let mut session = ChatSession::create(client.clone(), history.clone(), "a@example.com").await
            .unwrap();
        session.submit("remember me").await.unwrap().finish().await.unwrap();
        session.conversation_id().to_string()
    };

    let resumed = ChatSession::resume(client.clone(), history.clone(), &id).await.unwrap();
    assert_eq!(resumed.state().principal(), "a@example.com");
    assert_eq!(resumed.state().len(), 2);
    assert_eq!(resumed.state().snapshot()[0].content, "remember me");

    resumed.delete().await.unwrap();
    let missing = ChatSession::resume(client, history, &id).await;
    assert!(matches!(missing, Err(ChatError::NotFound(_))));
}

#[tokio::test]
async fn failed_assistant_write_leaves_log_matching_store() {
    let client = client_for(chat_upstream()).await;
    let history = Arc::new(FlakyHistory::failing_after(1));
    let mut session = ChatSession::create(client, history.clone(), "a@example.com").await
        .unwrap();

    let result = session.submit("q").await.unwrap().finish().await;
    assert!(matches!(result, Err(ChatError::Storage(_))));

    let state = session.state();
    assert_eq!(state.status(), CompletionStatus::Idle);
    let stored = history.load_conversation(state.id()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(state.snapshot(), stored.as_slice());
}
