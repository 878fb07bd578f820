pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use log::warn;
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::error::ChatError;
use crate::models::chat::{ ChatTurn, DEFAULT_CONVERSATION_TITLE };

/// Lazy, finite sequence of assistant text fragments. Dropping it cancels the request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Prefix of the single fragment emitted when a streaming request fails.
pub const ERROR_MARKER_PREFIX: &str = "\n\n⚠️ Error: ";

const FRAGMENT_CHANNEL_CAPACITY: usize = 1;

const TITLE_INSTRUCTION: &str = "Generate a concise and descriptive title for this conversation:";
const TITLE_TEMPERATURE: f32 = 0.3;
const TITLE_MAX_TOKENS: u32 = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Streams the reply to `context`, prefixed by the configured system persona.
    ///
    /// Never fails: a transport error is reported as one fragment starting
    /// with [`ERROR_MARKER_PREFIX`], after which the stream ends.
    fn stream_completion(&self, context: &[ChatTurn]) -> FragmentStream;

    async fn complete(
        &self,
        system_prompt: &str,
        context: &[ChatTurn],
        options: &CompletionOptions
    ) -> Result<Completion, ChatError>;

    fn get_model(&self) -> String;
}

pub fn error_fragment(err: &ChatError) -> String {
    format!("{}{}", ERROR_MARKER_PREFIX, err)
}

pub fn is_error_fragment(fragment: &str) -> bool {
    fragment.starts_with(ERROR_MARKER_PREFIX)
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<String>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Asks the model for a short conversation title.
///
/// Falls back to the default title on any failure; usage is returned
/// whenever the endpoint reported it.
pub async fn generate_title(
    client: &dyn ChatClient,
    first_message: &str
) -> (String, Option<TokenUsage>) {
    let options = CompletionOptions {
        temperature: TITLE_TEMPERATURE,
        max_tokens: Some(TITLE_MAX_TOKENS),
    };
    let context = [ChatTurn::user(first_message)];
    match client.complete(TITLE_INSTRUCTION, &context, &options).await {
        Ok(completion) => {
            let title = completion.content.trim();
            if title.is_empty() {
                (DEFAULT_CONVERSATION_TITLE.to_string(), completion.usage)
            } else {
                (title.to_string(), completion.usage)
            }
        }
        Err(e) => {
            warn!("Title generation failed, keeping default title: {}", e);
            (DEFAULT_CONVERSATION_TITLE.to_string(), None)
        }
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
