use anyhow::{bail, Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::broadcast;
use tracing::debug;

use shared::domain::{ChannelId, MessageId, ParticipantId};

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<StoreChange>,
}

/// Notification emitted after a write commits. Subscribers re-query on
/// receipt; the payload only tells them whether the write concerns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    ChannelWritten {
        channel_id: ChannelId,
        participant_ids: Vec<ParticipantId>,
    },
    MessageAppended {
        channel_id: ChannelId,
        message_id: MessageId,
    },
}

#[derive(Debug, Clone)]
pub struct StoredChannel {
    pub channel_id: ChannelId,
    pub participant_ids: BTreeSet<ParticipantId>,
    pub participant_names: BTreeMap<ParticipantId, Option<String>>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_group_chat: bool,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub channel_id: ChannelId,
    pub participants: Vec<(ParticipantId, String)>,
    pub last_message: String,
    pub is_group_chat: bool,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: ParticipantId,
    pub sender_name: Option<String>,
    pub message_text: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub message_text: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Each connection to an in-memory database is its own database, so
        // keep exactly one alive for the lifetime of the pool.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run chat migrations")?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { pool, changes })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Subscribes to committed writes. Receivers created before a write are
    /// guaranteed to observe its notification (or a lag marker).
    pub fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: StoreChange) {
        // No receivers is the common case outside a live screen.
        let _ = self.changes.send(change);
    }

    pub async fn upsert_participant(
        &self,
        participant_id: &ParticipantId,
        display_name: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO participants (id, display_name, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(participant_id.as_str())
        .bind(display_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store profile for participant '{participant_id}'"))?;
        Ok(())
    }

    /// Profile name for a participant. `Ok(None)` covers both a missing
    /// profile and a profile without a name.
    pub async fn participant_name(&self, participant_id: &ParticipantId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT display_name FROM participants WHERE id = ?")
            .bind(participant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load profile for participant '{participant_id}'"))?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>(0)))
    }

    pub async fn load_channel(&self, channel_id: &ChannelId) -> Result<Option<StoredChannel>> {
        let rows = sqlx::query(
            "SELECT c.id, c.last_message, c.last_message_at, c.is_group_chat, p.participant_id, p.display_name
             FROM channels c
             LEFT JOIN channel_participants p ON p.channel_id = c.id
             WHERE c.id = ?
             ORDER BY p.participant_id ASC",
        )
        .bind(channel_id.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load channel '{channel_id}'"))?;

        Ok(group_channel_rows(rows).into_iter().next())
    }

    /// All channels whose participant set contains `participant_id`, most
    /// recently active first. Channels without a summary timestamp sort last.
    pub async fn list_channels_for_participant(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Vec<StoredChannel>> {
        let rows = sqlx::query(
            "SELECT c.id, c.last_message, c.last_message_at, c.is_group_chat, p.participant_id, p.display_name
             FROM channels c
             INNER JOIN channel_participants mine
                ON mine.channel_id = c.id AND mine.participant_id = ?
             INNER JOIN channel_participants p ON p.channel_id = c.id
             ORDER BY c.last_message_at IS NULL ASC, c.last_message_at DESC, c.id ASC, p.participant_id ASC",
        )
        .bind(participant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list channels for participant '{participant_id}'"))?;

        Ok(group_channel_rows(rows))
    }

    /// Creates the channel and its participant set in one transaction unless
    /// a channel with the same id already exists. Returns `true` when this
    /// call created it.
    pub async fn create_channel_if_absent(&self, channel: &NewChannel) -> Result<bool> {
        let now = Utc::now().trunc_subsecs(6);
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO channels (id, last_message, last_message_at, is_group_chat)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(channel.channel_id.as_str())
        .bind(channel.last_message.as_str())
        .bind(now)
        .bind(channel.is_group_chat)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to create channel '{}'", channel.channel_id))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            debug!(channel_id = %channel.channel_id, "channel already exists");
            return Ok(false);
        }

        for (participant_id, display_name) in &channel.participants {
            sqlx::query(
                "INSERT INTO channel_participants (channel_id, participant_id, display_name)
                 VALUES (?, ?, ?)",
            )
            .bind(channel.channel_id.as_str())
            .bind(participant_id.as_str())
            .bind(display_name.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "failed to add participant '{participant_id}' to channel '{}'",
                    channel.channel_id
                )
            })?;
        }

        tx.commit().await?;
        self.publish(StoreChange::ChannelWritten {
            channel_id: channel.channel_id.clone(),
            participant_ids: channel.participants.iter().map(|(id, _)| id.clone()).collect(),
        });
        Ok(true)
    }

    /// Inserts a message and moves the channel summary to it as one atomic
    /// write. Both effects carry the same store-assigned timestamp, which never
    /// precedes the channel's current one. Fails, writing nothing, when the
    /// channel does not exist.
    pub async fn commit_message(
        &self,
        channel_id: &ChannelId,
        message: &NewMessage,
    ) -> Result<StoredMessage> {
        let message_id = MessageId::generate();
        let mut tx = self.pool.begin().await?;

        // The no-op write takes the database write lock, so no other send can
        // commit between reading the clock and committing this one.
        let previous = sqlx::query(
            "UPDATE channels SET is_group_chat = is_group_chat WHERE id = ? RETURNING last_message_at",
        )
        .bind(channel_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("failed to lock channel '{channel_id}'"))?;
        let Some(previous) = previous else {
            tx.rollback().await?;
            bail!("channel '{channel_id}' does not exist");
        };
        let now = Utc::now().trunc_subsecs(6);
        let sent_at = match previous.get::<Option<DateTime<Utc>>, _>(0) {
            Some(last) if last > now => last,
            _ => now,
        };

        sqlx::query("UPDATE channels SET last_message = ?, last_message_at = ? WHERE id = ?")
            .bind(message.message_text.as_str())
            .bind(sent_at)
            .bind(channel_id.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to update summary of channel '{channel_id}'"))?;

        sqlx::query(
            "INSERT INTO messages (id, channel_id, sender_id, sender_name, message_text, sent_at, read)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(message_id.as_str())
        .bind(channel_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(message.sender_name.as_str())
        .bind(message.message_text.as_str())
        .bind(sent_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert message into channel '{channel_id}'"))?;

        let participant_ids = sqlx::query(
            "SELECT participant_id FROM channel_participants WHERE channel_id = ? ORDER BY participant_id",
        )
        .bind(channel_id.as_str())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|r| ParticipantId(r.get::<String, _>(0)))
        .collect();

        tx.commit()
            .await
            .with_context(|| format!("failed to commit message to channel '{channel_id}'"))?;

        self.publish(StoreChange::MessageAppended {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });
        self.publish(StoreChange::ChannelWritten {
            channel_id: channel_id.clone(),
            participant_ids,
        });

        Ok(StoredMessage {
            message_id,
            channel_id: channel_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: Some(message.sender_name.clone()),
            message_text: message.message_text.clone(),
            sent_at,
            read: false,
        })
    }

    /// Full message sequence of a channel, ascending by store timestamp with
    /// ties broken by arrival order.
    pub async fn list_channel_messages(&self, channel_id: &ChannelId) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT id, channel_id, sender_id, sender_name, message_text, sent_at, read
             FROM messages
             WHERE channel_id = ?
             ORDER BY sent_at ASC, seq ASC",
        )
        .bind(channel_id.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list messages of channel '{channel_id}'"))?;

        Ok(rows
            .into_iter()
            .map(|r| StoredMessage {
                message_id: MessageId(r.get::<String, _>(0)),
                channel_id: ChannelId(r.get::<String, _>(1)),
                sender_id: ParticipantId(r.get::<String, _>(2)),
                sender_name: r.get::<Option<String>, _>(3),
                message_text: r.get::<String, _>(4),
                sent_at: r.get::<DateTime<Utc>, _>(5),
                read: r.get::<bool, _>(6),
            })
            .collect())
    }
}

/// Folds joined channel/participant rows (ordered by channel) into channels.
fn group_channel_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Vec<StoredChannel> {
    let mut channels: Vec<StoredChannel> = Vec::new();
    for r in rows {
        let channel_id = ChannelId(r.get::<String, _>(0));
        let same_as_last = channels
            .last()
            .is_some_and(|last| last.channel_id == channel_id);
        if !same_as_last {
            channels.push(StoredChannel {
                channel_id,
                participant_ids: BTreeSet::new(),
                participant_names: BTreeMap::new(),
                last_message: r.get::<Option<String>, _>(1),
                last_message_at: r.get::<Option<DateTime<Utc>>, _>(2),
                is_group_chat: r.get::<bool, _>(3),
            });
        }

        let Some(participant_id) = r.get::<Option<String>, _>(4).map(ParticipantId) else {
            continue;
        };
        if let Some(channel) = channels.last_mut() {
            channel.participant_ids.insert(participant_id.clone());
            channel
                .participant_names
                .insert(participant_id, r.get::<Option<String>, _>(5));
        }
    }
    channels
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
