use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serenity::all::{
    Channel, ChannelId, ChannelType, CreateInvite, EditThread, ForumTagId, GuildChannel, GuildId,
    Message, MessageId, MessagePagination, MessageType, ReactionType, Timestamp, UserId,
};
use serenity::http::{GuildPagination, Http};
use tracing::debug;

use super::{ChatPlatform, ThreadPage};
use crate::error::PlatformError;
use crate::model::{
    ChannelKind, RawAttachment, RawChannel, RawEmbed, RawEmbedField, RawMessage, RawReaction,
    RawServer, RawUser,
};

/// `ChatPlatform` over the serenity HTTP client. Every call is bounded by
/// `timeout`; 404 maps to `NotFound`, 429 to `RateLimited`.
pub struct DiscordPlatform {
    http: Arc<Http>,
    bot_user_id: Option<UserId>,
    timeout: Duration,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, bot_user_id: Option<UserId>, timeout: Duration) -> Self {
        Self {
            http,
            bot_user_id,
            timeout,
        }
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T, PlatformError>
    where
        F: Future<Output = serenity::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify_error(what, e)),
            Err(_) => {
                debug!("Platform call {} timed out", what);
                Err(PlatformError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

fn classify_error(what: &str, err: serenity::Error) -> PlatformError {
    let status = match &err {
        serenity::Error::Http(http_err) => http_err.status_code().map(|s| s.as_u16()),
        _ => None,
    };
    match status {
        Some(404) => PlatformError::NotFound(format!("{what}: {err}")),
        Some(429) => PlatformError::RateLimited(format!("{what}: {err}")),
        _ => PlatformError::Api(format!("{what}: {err}")),
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn bot_user_id(&self) -> Option<UserId> {
        self.bot_user_id
    }

    async fn list_servers(&self) -> Result<Vec<RawServer>, PlatformError> {
        let mut servers = Vec::new();
        let mut after: Option<GuildId> = None;
        loop {
            let page = self
                .call(
                    "get_guilds",
                    self.http.get_guilds(after.map(GuildPagination::After), Some(200)),
                )
                .await?;
            if page.is_empty() {
                break;
            }
            after = page.last().map(|g| g.id);
            servers.extend(page.iter().map(|g| RawServer {
                id: g.id,
                name: g.name.clone(),
                icon: g.icon.as_ref().map(|h| h.to_string()),
            }));
            if page.len() < 200 {
                break;
            }
        }
        Ok(servers)
    }

    async fn fetch_server(&self, server_id: GuildId) -> Result<RawServer, PlatformError> {
        let guild = self
            .call("get_guild", self.http.get_guild(server_id))
            .await?;
        Ok(RawServer {
            id: guild.id,
            name: guild.name,
            icon: guild.icon.as_ref().map(|h| h.to_string()),
        })
    }

    async fn list_channels(&self, server_id: GuildId) -> Result<Vec<RawChannel>, PlatformError> {
        let channels = self
            .call("get_channels", self.http.get_channels(server_id))
            .await?;
        Ok(channels.iter().map(raw_channel).collect())
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<RawChannel, PlatformError> {
        let channel = self
            .call("get_channel", self.http.get_channel(channel_id))
            .await?;
        Ok(match channel {
            Channel::Guild(gc) => raw_channel(&gc),
            other => RawChannel::new(other.id(), ChannelKind::Other, ""),
        })
    }

    async fn fetch_messages_after(
        &self,
        channel_id: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, PlatformError> {
        // Snowflake 0 is not representable; 1 predates every real message.
        let after = after.unwrap_or_else(|| MessageId::new(1));
        let mut messages = self
            .call(
                "get_messages",
                self.http.get_messages(
                    channel_id,
                    Some(MessagePagination::After(after)),
                    Some(limit),
                ),
            )
            .await?;
        messages.sort_by_key(|m| m.id);
        Ok(messages.iter().map(raw_message).collect())
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<RawMessage, PlatformError> {
        let message = self
            .call("get_message", self.http.get_message(channel_id, message_id))
            .await?;
        Ok(raw_message(&message))
    }

    async fn list_active_threads(
        &self,
        server_id: GuildId,
        parent_id: ChannelId,
    ) -> Result<Vec<RawChannel>, PlatformError> {
        let data = self
            .call(
                "get_guild_active_threads",
                self.http.get_guild_active_threads(server_id),
            )
            .await?;
        Ok(data
            .threads
            .iter()
            .filter(|t| t.parent_id == Some(parent_id))
            .map(raw_channel)
            .collect())
    }

    async fn list_archived_threads(
        &self,
        parent_id: ChannelId,
        before: Option<DateTime<Utc>>,
    ) -> Result<ThreadPage, PlatformError> {
        let before = before.map(|ts| ts.timestamp().max(0) as u64);
        let data = self
            .call(
                "get_channel_archived_public_threads",
                self.http
                    .get_channel_archived_public_threads(parent_id, before, Some(100)),
            )
            .await?;
        Ok(ThreadPage {
            threads: data.threads.iter().map(raw_channel).collect(),
            has_more: data.has_more,
        })
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let reaction = ReactionType::Unicode(emoji.to_string());
        self.call(
            "create_reaction",
            self.http.create_reaction(channel_id, message_id, &reaction),
        )
        .await
    }

    async fn set_thread_tags(
        &self,
        thread_id: ChannelId,
        tags: &[ForumTagId],
    ) -> Result<(), PlatformError> {
        let builder = EditThread::new().applied_tags(tags.iter().copied());
        self.call(
            "edit_thread",
            thread_id.edit_thread(self.http.as_ref(), builder),
        )
        .await?;
        Ok(())
    }

    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError> {
        let builder = CreateInvite::new().max_age(0).max_uses(0).unique(false);
        let invite = self
            .call(
                "create_invite",
                channel_id.create_invite(self.http.as_ref(), builder),
            )
            .await?;
        Ok(invite.code)
    }
}

fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text => ChannelKind::Text,
        ChannelType::News => ChannelKind::Announcement,
        ChannelType::Forum => ChannelKind::Forum,
        ChannelType::PublicThread => ChannelKind::PublicThread,
        ChannelType::PrivateThread => ChannelKind::PrivateThread,
        ChannelType::NewsThread => ChannelKind::AnnouncementThread,
        _ => ChannelKind::Other,
    }
}

fn to_utc(ts: &Timestamp) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts.unix_timestamp(), 0).single()
}

pub fn raw_channel(channel: &GuildChannel) -> RawChannel {
    let metadata = channel.thread_metadata.as_ref();
    RawChannel {
        id: channel.id,
        guild_id: Some(channel.guild_id),
        name: channel.name.clone(),
        kind: channel_kind(channel.kind),
        parent_id: channel.parent_id,
        applied_tags: channel.applied_tags.clone(),
        archived: metadata.map(|m| m.archived).unwrap_or(false),
        archive_timestamp: metadata
            .and_then(|m| m.archive_timestamp.as_ref())
            .and_then(to_utc),
        last_message_id: channel.last_message_id,
    }
}

fn is_system_message(kind: MessageType) -> bool {
    !matches!(
        kind,
        MessageType::Regular
            | MessageType::InlineReply
            | MessageType::ChatInputCommand
            | MessageType::ContextMenuCommand
    )
}

pub fn raw_message(message: &Message) -> RawMessage {
    let author = &message.author;
    RawMessage {
        id: message.id,
        channel_id: message.channel_id,
        guild_id: message.guild_id,
        parent_channel_id: None,
        author: RawUser {
            id: author.id,
            name: author.name.clone(),
            global_name: author.global_name.clone(),
            avatar: author.avatar.as_ref().map(|h| h.to_string()),
            bot: author.bot,
        },
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|a| RawAttachment {
                id: a.id.get(),
                url: a.url.clone(),
                filename: a.filename.clone(),
                size: a.size as u32,
                content_type: a.content_type.clone(),
            })
            .collect(),
        embeds: message
            .embeds
            .iter()
            .map(|e| RawEmbed {
                title: e.title.clone(),
                description: e.description.clone(),
                url: e.url.clone(),
                fields: e
                    .fields
                    .iter()
                    .map(|f| RawEmbedField {
                        name: f.name.clone(),
                        value: f.value.clone(),
                    })
                    .collect(),
            })
            .collect(),
        reactions: message
            .reactions
            .iter()
            .map(|r| RawReaction {
                emoji: r.reaction_type.to_string(),
                count: r.count,
                me: r.me,
            })
            .collect(),
        thread: message.thread.as_ref().map(|t| raw_channel(t)),
        system: is_system_message(message.kind),
    }
}
