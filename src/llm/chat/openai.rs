use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, error, info, warn };
use reqwest::{
    Client as HttpClient,
    RequestBuilder,
    Response,
    header::{ HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE },
};
use serde::{ Deserialize, Serialize };
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    create_streaming_response,
    error_fragment,
    ChatClient,
    Completion,
    CompletionOptions,
    FragmentStream,
    TokenUsage,
};
use crate::error::ChatError;
use crate::llm::delta::extract_delta;
use crate::llm::sse::{ FrameDecoder, StreamFrame };
use crate::llm::LlmConfig;
use crate::models::chat::{ ChatTurn, Role };

const SITE_URL_HEADER: &str = "http-referer";
const SITE_NAME_HEADER: &str = "x-title";
const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
    model: String,
    temperature: f32,
    system_prompt: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAIChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", config.api_key), "API key")?);
        if !config.site_url.is_empty() {
            headers.insert(
                HeaderName::from_static(SITE_URL_HEADER),
                header_value(&config.site_url, "site URL")?
            );
        }
        if !config.site_name.is_empty() {
            headers.insert(
                HeaderName::from_static(SITE_NAME_HEADER),
                header_value(&config.site_name, "site name")?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        })
    }

    fn build_request(
        &self,
        system_prompt: &str,
        context: &[ChatTurn],
        temperature: f32,
        max_tokens: Option<u32>,
        stream: bool
    ) -> RequestBuilder {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(OpenAIMessage { role: Role::System, content: system_prompt });
        messages.extend(
            context
                .iter()
                .filter(|turn| turn.role != Role::System)
                .map(|turn| OpenAIMessage { role: turn.role, content: &turn.content })
        );

        let req = OpenAIChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
            stream,
        };
        self.http.post(&self.base_url).json(&req)
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, ChatError> {
    HeaderValue::from_str(value).map_err(|e| ChatError::Config(format!("Invalid {} header: {}", what, e)))
}

async fn check_status(resp: Response) -> Result<Response, ChatError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

/// Sends the decoded frames' deltas downstream. Returns `false` once the
/// stream should stop, either on `[DONE]` or because the consumer went away.
async fn forward_frames(tx: &mpsc::Sender<String>, frames: Vec<StreamFrame>) -> bool {
    for frame in frames {
        match frame {
            StreamFrame::Terminator => {
                return false;
            }
            StreamFrame::Data(payload) => {
                if let Some(fragment) = extract_delta(&payload) {
                    if tx.send(fragment).await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
    true
}

async fn pump_stream(request: RequestBuilder, tx: mpsc::Sender<String>) {
    let sent = tokio::select! {
        _ = tx.closed() => {
            debug!("Completion consumer dropped before the response arrived");
            return;
        }
        result = request.send() => result,
    };

    let resp = match sent {
        Ok(resp) => resp,
        Err(e) => {
            let err = ChatError::from(e);
            error!("Completion request failed: {}", err);
            let _ = tx.send(error_fragment(&err)).await;
            return;
        }
    };
    let checked = tokio::select! {
        _ = tx.closed() => {
            debug!("Completion consumer dropped while reading the error body");
            return;
        }
        checked = check_status(resp) => checked,
    };
    let resp = match checked {
        Ok(resp) => resp,
        Err(err) => {
            error!("Completion request rejected: {}", err);
            let _ = tx.send(error_fragment(&err)).await;
            return;
        }
    };

    let mut body = resp.bytes_stream();
    let mut decoder = FrameDecoder::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                debug!("Completion consumer dropped, releasing connection");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                if !forward_frames(&tx, decoder.push(&bytes)).await {
                    return;
                }
            }
            Some(Err(e)) => {
                let err = ChatError::from(e);
                warn!("Completion stream interrupted: {}", err);
                let _ = tx.send(error_fragment(&err)).await;
                return;
            }
            None => {
                forward_frames(&tx, decoder.finish()).await;
                debug!("Completion body ended without a terminator");
                return;
            }
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    fn stream_completion(&self, context: &[ChatTurn]) -> FragmentStream {
        info!("Streaming completion: model={}, turns={}", self.model, context.len());
        let request = self.build_request(
            &self.system_prompt,
            context,
            self.temperature,
            None,
            true
        );
        create_streaming_response(move |tx| pump_stream(request, tx))
    }

    async fn complete(
        &self,
        system_prompt: &str,
        context: &[ChatTurn],
        options: &CompletionOptions
    ) -> Result<Completion, ChatError> {
        let request = self.build_request(
            system_prompt,
            context,
            options.temperature,
            options.max_tokens,
            false
        );
        let resp = check_status(request.send().await?).await?;
        let parsed = resp.json::<OpenAIResponse>().await?;

        let content = parsed.choices
            .into_iter()
            .next()
            .ok_or(ChatError::EmptyResponse)?
            .message.content.unwrap_or_default();
        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(Completion { content, usage })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}
