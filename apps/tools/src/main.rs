mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use chat_core::{
    attach_message_stream, subscribe_channel_list, ChatContext, ConversationSession,
    ConversationTarget,
};
use clap::{Parser, Subcommand};
use shared::domain::{ChannelId, ParticipantId};
use storage::Storage;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the database url from chat.toml and the environment.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates or renames a participant profile.
    AddParticipant { participant_id: String, display_name: String },
    /// Finds or creates the one-to-one channel between two participants.
    Open {
        self_id: String,
        peer_id: String,
        #[arg(long)]
        peer_name: Option<String>,
    },
    Send {
        channel_id: String,
        sender_id: String,
        text: String,
    },
    /// Prints the current conversation list of a participant.
    Channels { self_id: String },
    /// Follows a channel and prints every new message.
    Tail {
        channel_id: String,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = config::load_settings()?;
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    let database_url = config::prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await?;
    info!(%database_url, "chat store ready");

    let ctx = ChatContext {
        storage,
        settings: settings.chat_settings(),
    };

    match cli.command {
        Command::AddParticipant {
            participant_id,
            display_name,
        } => {
            ctx.storage
                .upsert_participant(&ParticipantId::from(participant_id.as_str()), &display_name)
                .await?;
            println!("saved participant {participant_id}");
        }
        Command::Open {
            self_id,
            peer_id,
            peer_name,
        } => {
            let peer_id = ParticipantId::from(peer_id);
            let target = match peer_name {
                Some(name) => ConversationTarget::peer(peer_id, name),
                None => ConversationTarget {
                    peer_id: Some(peer_id),
                    ..ConversationTarget::default()
                },
            };
            let session = ConversationSession::open(&ctx, ParticipantId::from(self_id), target).await?;
            println!("channel_id={} title={}", session.channel_id(), session.title());
        }
        Command::Send {
            channel_id,
            sender_id,
            text,
        } => {
            let mut session = ConversationSession::open(
                &ctx,
                ParticipantId::from(sender_id),
                ConversationTarget::channel(ChannelId::from(channel_id)),
            )
            .await?;
            let message = session.send(&text).await?;
            println!(
                "sent message_id={} to {} at {}",
                message.message_id,
                session.title(),
                message.time_label()
            );
        }
        Command::Channels { self_id } => {
            let self_id = ParticipantId::from(self_id);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let (err_tx, mut err_rx) = mpsc::unbounded_channel();
            let handle = subscribe_channel_list(
                &ctx,
                self_id.clone(),
                move |channels| {
                    let _ = tx.send(channels);
                },
                move |error| {
                    let _ = err_tx.send(error);
                },
            )?;

            let channels = tokio::select! {
                Some(channels) = rx.recv() => channels,
                Some(error) = err_rx.recv() => return Err(error.into()),
                else => anyhow::bail!("channel list ended before its first snapshot"),
            };
            handle.detach().await;

            if channels.is_empty() {
                println!("no conversations");
            }
            for channel in channels {
                let when = channel
                    .last_message_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:<20} {:<16} {}",
                    channel.channel_id,
                    channel.display_title(&self_id),
                    when,
                    channel.last_message
                );
            }
        }
        Command::Tail {
            channel_id,
            seconds,
        } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let (err_tx, mut err_rx) = mpsc::unbounded_channel();
            let handle = attach_message_stream(
                &ctx,
                ChannelId::from(channel_id),
                move |messages| {
                    let _ = tx.send(messages);
                },
                move |error| {
                    let _ = err_tx.send(error);
                },
            )?;

            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            let mut printed = 0;
            let outcome = loop {
                tokio::select! {
                    _ = &mut deadline => break Ok(()),
                    Some(error) = err_rx.recv() => break Err(error),
                    Some(messages) = rx.recv() => {
                        for message in messages.iter().skip(printed) {
                            println!(
                                "[{}] {}: {}",
                                message.time_label(),
                                message.sender_name,
                                message.message_text
                            );
                        }
                        printed = messages.len();
                    }
                }
            };
            handle.detach().await;
            outcome.context("message stream failed")?;
        }
    }

    Ok(())
}
