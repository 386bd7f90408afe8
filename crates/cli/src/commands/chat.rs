//! `taskmate chat`: single-message or interactive chat.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use taskmate_agent::{AgentStatus, ChatReply, ChatService};
use taskmate_config::AppConfig;
use taskmate_core::error::Error;
use taskmate_core::event::EventBus;
use taskmate_core::identity::UserIdentity;
use taskmate_core::turn::ConversationId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(
    message: Option<String>,
    conversation: Option<String>,
    user: String,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;

    if !config.can_reach_provider() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!("    TASKMATE_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file (local providers such as Ollama need none):");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("no API key found");
    }

    let chat = taskmate_agent::build_chat_service(&config, Arc::new(EventBus::default())).await?;
    let identity = UserIdentity::new(user);
    let mut conversation_id = conversation.map(ConversationId);

    if let Some(msg) = message {
        match send(&chat, &identity, conversation_id.as_ref(), &msg).await {
            Ok(reply) => {
                println!("{}", reply.text);
                eprintln!("  conversation: {}", reply.conversation_id);
                return Ok(());
            }
            Err(e) => {
                if let Some(id) = e.conversation_id() {
                    eprintln!("  conversation: {id}");
                }
                return Err(e.into());
            }
        }
    }

    println!();
    println!("  Taskmate, interactive mode");
    println!("  Model:  {}", config.provider.model);
    println!("  User:   {identity}");
    println!("  Tools:  {}", chat.tool_specs().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' to quit. Ctrl+C cancels a running request.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        match send(&chat, &identity, conversation_id.as_ref(), line).await {
            Ok(reply) => {
                for text_line in reply.text.lines() {
                    println!("  Assistant > {text_line}");
                }
                println!();
                conversation_id = Some(reply.conversation_id);
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
                // the message was saved, so the next one continues the same conversation
                if let Some(id) = e.conversation_id() {
                    conversation_id = Some(id.clone());
                }
            }
        }
    }

    if let Some(id) = conversation_id {
        println!();
        println!("  Resume with: taskmate chat -c {id}");
    }
    Ok(())
}

/// Send one message; Ctrl+C cancels it instead of killing the process.
async fn send(
    chat: &ChatService,
    identity: &UserIdentity,
    conversation_id: Option<&ConversationId>,
    text: &str,
) -> Result<ChatReply, Error> {
    let cancel = CancellationToken::new();
    let request = chat.send_until_cancelled(identity, conversation_id, text, &cancel);
    tokio::pin!(request);

    let finished = tokio::select! {
        reply = &mut request => Some(reply),
        _ = tokio::signal::ctrl_c() => None,
    };
    let reply = match finished {
        Some(reply) => reply?,
        None => {
            cancel.cancel();
            request.await?
        }
    };

    if reply.status == AgentStatus::IterationCapReached {
        tracing::warn!(iterations = reply.iterations, "Gave up before finishing the request");
    }
    Ok(reply)
}
