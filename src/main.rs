use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use chat_stream::api::HttpChatApi;
use chat_stream::config::ClientConfig;
use chat_stream::models::Credentials;
use chat_stream::service::{ChatSession, ChatView, ConnectionStatus};
use chat_stream::transport::StompWsChannel;

#[derive(Parser)]
#[command(name = "chat_stream", version, about = "Terminal client for job-portal conversations")]
struct Cli {
    /// Bearer token issued by the portal
    #[arg(long, env = "CHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Id of the signed-in user
    #[arg(long, env = "CHAT_USER_ID")]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List your conversations
    Conversations,
    /// Stream a conversation; type to send, `/older` for history, `/quit` to leave
    Open { conversation_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_stream=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    let (Some(token), Some(user)) = (cli.token, cli.user) else {
        anyhow::bail!("Sign in first: set CHAT_TOKEN and CHAT_USER_ID (or pass --token/--user)");
    };
    let credentials = Credentials::new(token, user);
    let api = HttpChatApi::new(&config)?;

    match cli.command {
        Command::Conversations => list_conversations(&api, &credentials).await,
        Command::Open { conversation_id } => {
            open_conversation(api, config, credentials, conversation_id).await
        }
    }
}

async fn list_conversations(api: &HttpChatApi, credentials: &Credentials) -> anyhow::Result<()> {
    let conversations = api
        .fetch_conversations(credentials)
        .await
        .context("Failed to fetch conversations")?;
    if conversations.is_empty() {
        println!("No conversations yet");
    }
    for conv in conversations {
        let unread = if conv.unread_count > 0 {
            format!(" ({} unread)", conv.unread_count)
        } else {
            String::new()
        };
        println!(
            "{:>8}  {}{}  {}",
            conv.id,
            conv.partner_name(&credentials.user_id),
            unread,
            conv.last_message.as_deref().unwrap_or("Start conversation...")
        );
    }
    Ok(())
}

async fn open_conversation(
    api: HttpChatApi,
    config: ClientConfig,
    credentials: Credentials,
    conversation_id: String,
) -> anyhow::Result<()> {
    let partner = match api.fetch_conversations(&credentials).await {
        Ok(list) => list
            .into_iter()
            .find(|c| c.id == conversation_id)
            .map(|c| c.partner_name(&credentials.user_id).to_string()),
        Err(e) => {
            warn!("Could not resolve chat partner: {e}");
            None
        }
    }
    .unwrap_or_else(|| "them".to_string());

    let ws_url = config.ws_url.clone();
    let factory = move || StompWsChannel::new(ws_url.clone());
    let mut session = ChatSession::new(api, factory, &config);
    session.set_credentials(Some(credentials)).await;
    session.set_conversation(Some(conversation_id.clone())).await;
    info!(%conversation_id, "Conversation opened");

    let mut rendered = Rendered::default();
    render(&session.view(), &partner, &mut rendered);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/older" => {
                        let outcome = session.load_next_history_page().await;
                        info!(?outcome, "Requested older messages");
                    }
                    "" => {}
                    text => {
                        if !session.send_message(text) {
                            println!("  (not sent: {})", ConnectionStatus::from(session.feed_state()));
                        }
                    }
                }
            }
            _ = tick.tick() => {}
        }
        render(&session.view(), &partner, &mut rendered);
    }

    session.shutdown().await;
    Ok(())
}

#[derive(Default)]
struct Rendered {
    ids: HashSet<String>,
    oldest: Option<DateTime<Utc>>,
    status: Option<ConnectionStatus>,
    start_marker: bool,
    placeholder: bool,
}

fn render(view: &ChatView, partner: &str, rendered: &mut Rendered) {
    for line in render_lines(view, partner, rendered) {
        println!("{line}");
    }
}

/// Lines for messages not shown yet and any status change. Rows older than
/// anything already printed come from `/older` and get their own heading.
fn render_lines(view: &ChatView, partner: &str, rendered: &mut Rendered) -> Vec<String> {
    let mut lines = Vec::new();
    if rendered.status != Some(view.status) {
        lines.push(format!("-- {partner}: {} --", view.status));
        rendered.status = Some(view.status);
    }

    if view.messages.is_empty() {
        if !view.is_loading_history && !view.is_connecting && !rendered.placeholder {
            lines.push("Start a new conversation!".to_string());
            rendered.placeholder = true;
        }
        return lines;
    }

    let mut backfill_heading = false;
    for message in &view.messages {
        if !rendered.ids.insert(message.id.clone()) {
            continue;
        }
        let backfilled = rendered.oldest.is_some_and(|oldest| message.timestamp < oldest);
        if backfilled && !backfill_heading {
            lines.push("(older messages)".to_string());
            backfill_heading = true;
        }
        let who = if view.is_mine(message) { "me" } else { partner };
        lines.push(format!("[{}] {who}: {}", message.display_time(), message.content));
    }
    rendered.oldest = view.messages.first().map(|m| m.timestamp);

    if view.at_start_of_conversation() && !rendered.start_marker {
        lines.push("--- Start of Conversation ---".to_string());
        rendered.start_marker = true;
    }
    lines
}
