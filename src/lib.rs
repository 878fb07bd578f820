pub mod auth;
pub mod cli;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod session;
pub mod usage;

use cli::Args;
use error::ChatError;
use history::{ initialize_history_store, HistoryStore };
use llm::chat::{ new_client as new_chat_client, ChatClient };
use log::{ info, warn };
use session::ChatSession;
use std::error::Error;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, BufReader, Lines };
use usage::{ MemoryUsageStore, UsageStore };

const HELP_TEXT: &str = "Commands: /new (start a new chat), /list (your chats), /quit";

struct Services {
    client: Arc<dyn ChatClient>,
    history: Arc<dyn HistoryStore>,
    usage: Arc<dyn UsageStore>,
    auto_title: bool,
}

impl Services {
    async fn new_session(&self, principal: &str) -> Result<ChatSession, ChatError> {
        let session = ChatSession::create(self.client.clone(), self.history.clone(), principal).await?;
        Ok(self.configure(session))
    }

    async fn resume_session(&self, conversation_id: &str) -> Result<ChatSession, ChatError> {
        let session = ChatSession::resume(
            self.client.clone(),
            self.history.clone(),
            conversation_id
        ).await?;
        Ok(self.configure(session))
    }

    fn configure(&self, session: ChatSession) -> ChatSession {
        session.with_usage_store(self.usage.clone()).with_auto_title(self.auto_title)
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Completion URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Temperature: {}", args.chat_temperature);
    info!("History Store Type: {}", args.history_type);
    info!("Principal: {}", args.principal);
    info!("Auto Title: {}", args.auto_title);
    info!("-------------------------");

    let services = Services {
        client: new_chat_client(&args.llm_config())?,
        history: initialize_history_store(&args)?,
        usage: Arc::new(MemoryUsageStore::new()),
        auto_title: args.auto_title,
    };
    info!("Chat client ready: model={}", services.client.get_model());

    let mut session = match &args.conversation_id {
        Some(id) => services.resume_session(id).await?,
        None => services.new_session(&args.principal).await?,
    };
    println!("{}", HELP_TEXT);
    for turn in session.state().snapshot() {
        println!("{}: {}", turn.role, turn.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();
    while let Some(line) = read_input(&mut lines, interrupted()).await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => {
                break;
            }
            "/new" => {
                session = services.new_session(&args.principal).await?;
                println!("Started conversation {}", session.conversation_id());
            }
            "/list" => {
                for summary in services.history.list_conversations(&args.principal).await? {
                    println!("{}  {}  {}", summary.created_at.format("%Y-%m-%d %H:%M"), summary.id, summary.title);
                }
            }
            text => {
                if let Err(e) = stream_reply(&mut session, text).await {
                    warn!("Reply failed: {}", e);
                    println!("Error: {}", e);
                }
            }
        }
        print_prompt();
    }

    info!("Session for {} closed", args.principal);
    Ok(())
}

/// Next line of input, or `None` on end of input or when `interrupt`
/// resolves first.
async fn read_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>
) -> std::io::Result<Option<String>>
    where R: AsyncBufRead + Unpin
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

/// Resolves on Ctrl-C. Once a handler is installed the default SIGINT exit
/// is gone, so the prompt has to listen for it too.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Streams one reply to stdout. Ctrl-C cancels the reply without recording it.
async fn stream_reply(session: &mut ChatSession, text: &str) -> Result<(), ChatError> {
    let mut reply = session.submit(text).await?;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            fragment = reply.next_fragment() => match fragment {
                Some(fragment) => {
                    print!("{}", fragment);
                    let _ = stdout.flush();
                }
                None => break,
            },
            _ = interrupted() => {
                println!("\n[cancelled]");
                return Ok(());
            }
        }
    }
    println!();
    reply.finish().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn interrupt_at_the_prompt_ends_input() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let line = read_input(&mut lines, async {}).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn input_is_read_while_no_interrupt_arrives() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"hello\nsecond\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        let first = read_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(first.as_deref(), Some("hello"));
        let second = read_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(second.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn closed_input_ends_the_loop() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(writer);
        let mut lines = BufReader::new(reader).lines();
        let line = read_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(line, None);
    }
}
