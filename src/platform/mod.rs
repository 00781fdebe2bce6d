//! The chat-platform API the pipeline consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};

use crate::error::PlatformError;
use crate::model::{RawChannel, RawMessage, RawServer};

pub mod discord;

pub use discord::DiscordPlatform;

/// Largest page the platform hands out for message history.
pub const MAX_PAGE_SIZE: u8 = 100;

/// One page of archived threads.
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub threads: Vec<RawChannel>,
    pub has_more: bool,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The bot's own account, once the gateway has identified it.
    fn bot_user_id(&self) -> Option<UserId>;

    async fn list_servers(&self) -> Result<Vec<RawServer>, PlatformError>;

    async fn fetch_server(&self, server_id: GuildId) -> Result<RawServer, PlatformError>;

    async fn list_channels(&self, server_id: GuildId) -> Result<Vec<RawChannel>, PlatformError>;

    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<RawChannel, PlatformError>;

    /// Up to `limit` messages strictly newer than `after` (or from the start of
    /// the channel when `after` is `None`), oldest first.
    async fn fetch_messages_after(
        &self,
        channel_id: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, PlatformError>;

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<RawMessage, PlatformError>;

    /// Active threads of `parent_id`.
    async fn list_active_threads(
        &self,
        server_id: GuildId,
        parent_id: ChannelId,
    ) -> Result<Vec<RawChannel>, PlatformError>;

    /// Archived threads of `parent_id` archived before `before`, newest first.
    async fn list_archived_threads(
        &self,
        parent_id: ChannelId,
        before: Option<DateTime<Utc>>,
    ) -> Result<ThreadPage, PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    async fn set_thread_tags(
        &self,
        thread_id: ChannelId,
        tags: &[ForumTagId],
    ) -> Result<(), PlatformError>;

    /// Creates a permanent invite and returns its code.
    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError>;
}
