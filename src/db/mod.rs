use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::Config;
use crate::model::{
    snowflake_timestamp, CanonicalAccount, CanonicalMessage, CanonicalThread, ChannelKind,
    ChannelRecord, ServerRecord, ThreadCursor,
};
use crate::normalize::NormalizedBatch;
use crate::settings::{
    ChannelSettings, ChannelSettingsChange, ServerSettings, UserServerSettings, UserSettingsChange,
};

pub mod schema;

/// SQLite caps bound parameters per statement; two per (user, server) pair.
const SETTINGS_LOOKUP_CHUNK: usize = 400;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Everything one indexing pass writes for a channel, committed atomically.
#[derive(Debug, Clone)]
pub struct ChannelCommit {
    pub server: ServerRecord,
    pub channel: ChannelRecord,
    pub batch: NormalizedBatch,
    /// Watermark to advance to once every row is written.
    pub watermark: Option<MessageId>,
    /// Replaces the channel's unfinished threads. `None` leaves them alone.
    pub backlog: Option<Vec<ThreadCursor>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs blocking database work off the async executor.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    // --- Channel settings ---

    pub fn find_channel_settings(&self, channel_id: ChannelId) -> anyhow::Result<Option<ChannelSettings>> {
        let conn = self.conn()?;
        read_channel_settings(&conn, channel_id)
    }

    /// Writes `settings`. The watermark column never moves backwards.
    pub fn upsert_channel_settings(&self, settings: &ChannelSettings) -> anyhow::Result<()> {
        let conn = self.conn()?;
        write_channel_settings(&conn, settings)
    }

    /// Applies `change` to the channel's settings, creating them with defaults
    /// first if needed.
    pub fn update_channel_settings(
        &self,
        channel_id: ChannelId,
        change: ChannelSettingsChange,
    ) -> anyhow::Result<ChannelSettings> {
        let conn = self.conn()?;
        let mut settings =
            read_channel_settings(&conn, channel_id)?.unwrap_or_else(|| ChannelSettings::new(channel_id));
        settings.apply(change);
        write_channel_settings(&conn, &settings)?;
        Ok(settings)
    }

    // --- Server settings ---

    pub fn find_server_settings(&self, server_id: GuildId) -> anyhow::Result<ServerSettings> {
        let conn = self.conn()?;
        let public: Option<bool> = conn
            .query_row(
                "SELECT consider_all_messages_public FROM server_settings WHERE server_id = ?1",
                [server_id.get() as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ServerSettings {
            server_id,
            consider_all_messages_public: public.unwrap_or(false),
        })
    }

    pub fn upsert_server_settings(&self, settings: &ServerSettings) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO server_settings (server_id, consider_all_messages_public, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(server_id) DO UPDATE SET
                consider_all_messages_public = ?2, updated_at = CURRENT_TIMESTAMP",
            (settings.server_id.get() as i64, settings.consider_all_messages_public),
        )?;
        Ok(())
    }

    // --- User server settings ---

    pub fn find_user_server_settings_many(
        &self,
        pairs: &[(UserId, GuildId)],
    ) -> anyhow::Result<Vec<UserServerSettings>> {
        let conn = self.conn()?;
        let mut found = Vec::new();
        for chunk in pairs.chunks(SETTINGS_LOOKUP_CHUNK) {
            let clause = vec!["(user_id = ? AND server_id = ?)"; chunk.len()].join(" OR ");
            let sql = format!(
                "SELECT user_id, server_id, message_indexing_disabled, can_publicly_display_messages
                 FROM user_server_settings WHERE {}",
                clause
            );
            let params: Vec<i64> = chunk
                .iter()
                .flat_map(|(user, server)| [user.get() as i64, server.get() as i64])
                .collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                Ok(UserServerSettings {
                    user_id: UserId::new(row.get::<_, i64>(0)? as u64),
                    server_id: GuildId::new(row.get::<_, i64>(1)? as u64),
                    message_indexing_disabled: row.get(2)?,
                    can_publicly_display_messages: row.get(3)?,
                })
            })?;
            for row in rows {
                found.push(row?);
            }
        }
        Ok(found)
    }

    pub fn find_user_server_settings(
        &self,
        user_id: UserId,
        server_id: GuildId,
    ) -> anyhow::Result<UserServerSettings> {
        Ok(self
            .find_user_server_settings_many(&[(user_id, server_id)])?
            .into_iter()
            .next()
            .unwrap_or_else(|| UserServerSettings::new(user_id, server_id)))
    }

    /// Applies `change`, creating the row with defaults first if needed. The
    /// consent/indexing invariant holds for whatever gets written.
    pub fn update_user_server_settings(
        &self,
        user_id: UserId,
        server_id: GuildId,
        change: UserSettingsChange,
    ) -> anyhow::Result<UserServerSettings> {
        let mut settings = self.find_user_server_settings(user_id, server_id)?;
        settings.apply(change);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_server_settings
                (user_id, server_id, message_indexing_disabled, can_publicly_display_messages, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id, server_id) DO UPDATE SET
                message_indexing_disabled = ?3,
                can_publicly_display_messages = ?4,
                updated_at = CURRENT_TIMESTAMP",
            (
                user_id.get() as i64,
                server_id.get() as i64,
                settings.message_indexing_disabled,
                settings.can_publicly_display_messages,
            ),
        )?;
        Ok(settings)
    }

    // --- Servers and channels ---

    pub fn upsert_channel_with_server_dependency(
        &self,
        server: &ServerRecord,
        channel: &ChannelRecord,
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        upsert_server_and_channel(&conn, server, channel)
    }

    pub fn find_channel(&self, channel_id: ChannelId) -> anyhow::Result<Option<ChannelRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, server_id, name, kind, parent_id, invite_code FROM channels WHERE id = ?1",
                [channel_id.get() as i64],
                |row| {
                    Ok(ChannelRecord {
                        id: ChannelId::new(row.get::<_, i64>(0)? as u64),
                        server_id: GuildId::new(row.get::<_, i64>(1)? as u64),
                        name: row.get(2)?,
                        kind: ChannelKind::parse(&row.get::<_, String>(3)?),
                        parent_id: row
                            .get::<_, Option<i64>>(4)?
                            .map(|id| ChannelId::new(id as u64)),
                        invite_code: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // --- Bulk upserts ---

    pub fn upsert_accounts_bulk(&self, accounts: &[CanonicalAccount]) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_accounts(&tx, accounts)?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_threads_bulk(&self, threads: &[CanonicalThread]) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_threads(&tx, threads)?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_messages_bulk(&self, messages: &[CanonicalMessage]) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_messages(&tx, messages)?;
        tx.commit()?;
        Ok(())
    }

    /// Accounts, then server and channel, then threads, then messages, then the
    /// watermark, all in one transaction.
    pub fn commit_channel_batch(&self, commit: &ChannelCommit) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_accounts(&tx, &commit.batch.accounts)?;
        upsert_server_and_channel(&tx, &commit.server, &commit.channel)?;
        upsert_threads(&tx, &commit.batch.threads)?;
        upsert_messages(&tx, &commit.batch.messages)?;
        if let Some(backlog) = &commit.backlog {
            replace_thread_backlog(&tx, commit.channel.id, backlog)?;
        }
        if let Some(watermark) = commit.watermark {
            advance_watermark(&tx, commit.channel.id, watermark)?;
        }
        tx.commit()?;
        debug!(
            channel = commit.channel.id.get(),
            accounts = commit.batch.accounts.len(),
            threads = commit.batch.threads.len(),
            messages = commit.batch.messages.len(),
            "Database: Committed channel batch"
        );
        Ok(())
    }

    /// Threads of `channel_id` a previous pass could not finish, by thread id.
    pub fn find_thread_backlog(&self, channel_id: ChannelId) -> anyhow::Result<Vec<ThreadCursor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT thread_id, resume_after FROM thread_backlog
             WHERE channel_id = ?1 ORDER BY thread_id",
        )?;
        let rows = stmt.query_map([channel_id.get() as i64], |row| {
            Ok(ThreadCursor {
                thread_id: ChannelId::new(row.get::<_, i64>(0)? as u64),
                resume_after: row
                    .get::<_, Option<i64>>(1)?
                    .map(|id| MessageId::new(id as u64)),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // --- Messages ---

    pub fn find_message_by_id(&self, id: MessageId) -> anyhow::Result<Option<CanonicalMessage>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", MESSAGE_SELECT),
                [id.get() as i64],
                MessageRow::from_row,
            )
            .optional()?;
        row.map(MessageRow::into_canonical).transpose()
    }

    /// Messages stored for a channel, including the messages of its threads.
    pub fn find_messages_in_channel(&self, channel_id: ChannelId) -> anyhow::Result<Vec<CanonicalMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE channel_id = ?1 OR parent_channel_id = ?1 ORDER BY id",
            MESSAGE_SELECT
        ))?;
        let rows = stmt.query_map([channel_id.get() as i64], MessageRow::from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.into_canonical()?);
        }
        Ok(messages)
    }

    #[cfg(test)]
    pub(crate) fn count_rows(&self, table: &str) -> usize {
        let conn = self.conn().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap() as usize
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.conn().unwrap().execute_batch(sql).unwrap();
    }
}

fn read_channel_settings(conn: &Connection, channel_id: ChannelId) -> anyhow::Result<Option<ChannelSettings>> {
    let settings = conn
        .query_row(
            "SELECT indexing_enabled, mark_solution_enabled, forum_guidelines_consent_enabled,
                    solution_tag_id, last_indexed_snowflake
             FROM channel_settings WHERE channel_id = ?1",
            [channel_id.get() as i64],
            |row| {
                Ok(ChannelSettings {
                    channel_id,
                    indexing_enabled: row.get(0)?,
                    mark_solution_enabled: row.get(1)?,
                    forum_guidelines_consent_enabled: row.get(2)?,
                    solution_tag_id: row
                        .get::<_, Option<i64>>(3)?
                        .map(|id| ForumTagId::new(id as u64)),
                    last_indexed_snowflake: row
                        .get::<_, Option<i64>>(4)?
                        .map(|id| MessageId::new(id as u64)),
                })
            },
        )
        .optional()?;
    Ok(settings)
}

fn write_channel_settings(conn: &Connection, settings: &ChannelSettings) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO channel_settings
            (channel_id, indexing_enabled, mark_solution_enabled, forum_guidelines_consent_enabled,
             solution_tag_id, last_indexed_snowflake, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
         ON CONFLICT(channel_id) DO UPDATE SET
            indexing_enabled = ?2,
            mark_solution_enabled = ?3,
            forum_guidelines_consent_enabled = ?4,
            solution_tag_id = ?5,
            last_indexed_snowflake = NULLIF(MAX(
                COALESCE(channel_settings.last_indexed_snowflake, 0),
                COALESCE(excluded.last_indexed_snowflake, 0)), 0),
            updated_at = CURRENT_TIMESTAMP",
        (
            settings.channel_id.get() as i64,
            settings.indexing_enabled,
            settings.mark_solution_enabled,
            settings.forum_guidelines_consent_enabled,
            settings.solution_tag_id.map(|id| id.get() as i64),
            settings.last_indexed_snowflake.map(|id| id.get() as i64),
        ),
    )?;
    Ok(())
}

fn advance_watermark(conn: &Connection, channel_id: ChannelId, watermark: MessageId) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO channel_settings (channel_id, last_indexed_snowflake, updated_at)
         VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(channel_id) DO UPDATE SET
            last_indexed_snowflake = MAX(COALESCE(channel_settings.last_indexed_snowflake, 0), ?2),
            updated_at = CURRENT_TIMESTAMP",
        (channel_id.get() as i64, watermark.get() as i64),
    )?;
    Ok(())
}

fn replace_thread_backlog(
    conn: &Connection,
    channel_id: ChannelId,
    backlog: &[ThreadCursor],
) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM thread_backlog WHERE channel_id = ?1",
        [channel_id.get() as i64],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO thread_backlog (thread_id, channel_id, resume_after) VALUES (?1, ?2, ?3)
         ON CONFLICT(thread_id) DO UPDATE SET channel_id = ?2, resume_after = ?3",
    )?;
    for cursor in backlog {
        stmt.execute((
            cursor.thread_id.get() as i64,
            channel_id.get() as i64,
            cursor.resume_after.map(|id| id.get() as i64),
        ))?;
    }
    Ok(())
}

fn upsert_server_and_channel(
    conn: &Connection,
    server: &ServerRecord,
    channel: &ChannelRecord,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO servers (id, name, icon) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO NOTHING",
        (server.id.get() as i64, &server.name, &server.icon),
    )?;
    conn.execute(
        "INSERT INTO channels (id, server_id, name, kind, parent_id, invite_code, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
         ON CONFLICT(id) DO UPDATE SET
            name = ?3,
            kind = ?4,
            parent_id = ?5,
            invite_code = COALESCE(?6, channels.invite_code),
            updated_at = CURRENT_TIMESTAMP",
        (
            channel.id.get() as i64,
            channel.server_id.get() as i64,
            &channel.name,
            channel.kind.as_str(),
            channel.parent_id.map(|id| id.get() as i64),
            &channel.invite_code,
        ),
    )?;
    Ok(())
}

fn upsert_accounts(conn: &Connection, accounts: &[CanonicalAccount]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO accounts (id, name, avatar) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = ?2, avatar = ?3",
    )?;
    for account in accounts {
        stmt.execute((account.id.get() as i64, &account.name, &account.avatar))?;
    }
    Ok(())
}

fn upsert_threads(conn: &Connection, threads: &[CanonicalThread]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO threads (id, server_id, parent_id, name, archived, archived_at, applied_tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            name = ?4, archived = ?5, archived_at = ?6, applied_tags = ?7",
    )?;
    for thread in threads {
        let tags: Vec<u64> = thread.applied_tags.iter().map(|t| t.get()).collect();
        stmt.execute((
            thread.id.get() as i64,
            thread.server_id.get() as i64,
            thread.parent_id.get() as i64,
            &thread.name,
            thread.archived,
            thread
                .archived_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            serde_json::to_string(&tags)?,
        ))?;
    }
    Ok(())
}

/// Overwrites content, embeds and reactions with the latest copy. Solutions
/// already recorded are kept and new ones appended.
fn upsert_messages(conn: &Connection, messages: &[CanonicalMessage]) -> anyhow::Result<()> {
    let mut existing = conn.prepare_cached("SELECT solutions FROM messages WHERE id = ?1")?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO messages
            (id, channel_id, server_id, author_id, thread_id, parent_channel_id, content,
             solutions, attachments, embeds, reactions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            channel_id = ?2,
            thread_id = COALESCE(?5, messages.thread_id),
            parent_channel_id = ?6,
            content = ?7,
            solutions = ?8,
            attachments = ?9,
            embeds = ?10,
            reactions = ?11",
    )?;

    for message in messages {
        let stored: Option<String> = existing
            .query_row([message.id.get() as i64], |row| row.get(0))
            .optional()?;
        let mut solutions = match stored {
            Some(json) => parse_ids(&json)?,
            None => Vec::new(),
        };
        for solution in &message.solutions {
            if *solution != message.id && !solutions.contains(solution) {
                solutions.push(*solution);
            }
        }
        let solution_ids: Vec<u64> = solutions.iter().map(|id| id.get()).collect();

        stmt.execute((
            message.id.get() as i64,
            message.channel_id.get() as i64,
            message.server_id.get() as i64,
            message.author_id.get() as i64,
            message.thread_id.map(|id| id.get() as i64),
            message.parent_channel_id.map(|id| id.get() as i64),
            &message.content,
            serde_json::to_string(&solution_ids)?,
            serde_json::to_string(&message.attachments)?,
            serde_json::to_string(&message.embeds)?,
            serde_json::to_string(&message.reactions)?,
            snowflake_timestamp(message.id.get())
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ))?;
    }
    Ok(())
}

fn parse_ids(json: &str) -> anyhow::Result<Vec<MessageId>> {
    let ids: Vec<u64> = serde_json::from_str(json)?;
    Ok(ids.into_iter().filter(|id| *id != 0).map(MessageId::new).collect())
}

const MESSAGE_SELECT: &str = "SELECT id, channel_id, server_id, author_id, thread_id, parent_channel_id,
        content, solutions, attachments, embeds, reactions FROM messages";

struct MessageRow {
    id: i64,
    channel_id: i64,
    server_id: i64,
    author_id: i64,
    thread_id: Option<i64>,
    parent_channel_id: Option<i64>,
    content: String,
    solutions: String,
    attachments: String,
    embeds: String,
    reactions: String,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            server_id: row.get(2)?,
            author_id: row.get(3)?,
            thread_id: row.get(4)?,
            parent_channel_id: row.get(5)?,
            content: row.get(6)?,
            solutions: row.get(7)?,
            attachments: row.get(8)?,
            embeds: row.get(9)?,
            reactions: row.get(10)?,
        })
    }

    fn into_canonical(self) -> anyhow::Result<CanonicalMessage> {
        Ok(CanonicalMessage {
            id: MessageId::new(self.id as u64),
            channel_id: ChannelId::new(self.channel_id as u64),
            server_id: GuildId::new(self.server_id as u64),
            author_id: UserId::new(self.author_id as u64),
            thread_id: self.thread_id.map(|id| ChannelId::new(id as u64)),
            parent_channel_id: self.parent_channel_id.map(|id| ChannelId::new(id as u64)),
            content: self.content,
            solutions: parse_ids(&self.solutions)?,
            attachments: serde_json::from_str(&self.attachments)?,
            embeds: serde_json::from_str(&self.embeds)?,
            reactions: serde_json::from_str(&self.reactions)?,
        })
    }
}
