//! Platform-facing ("raw") and store-facing ("canonical") shapes of the
//! entities the indexing pipeline moves around.
//!
//! Identifiers are serenity snowflake newtypes. Snowflakes grow with creation
//! time, so ordering by id is ordering by recency.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};

/// 2015-01-01T00:00:00.000Z
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Unicode emoji used as the fallback solved indicator.
pub const SOLVED_REACTION: &str = "✅";

/// Milliseconds since the unix epoch encoded in a snowflake.
pub fn snowflake_ms(id: u64) -> i64 {
    ((id >> 22) as i64) + DISCORD_EPOCH_MS
}

pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(snowflake_ms(id))
        .single()
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Announcement,
    Forum,
    PublicThread,
    PrivateThread,
    AnnouncementThread,
    Other,
}

impl ChannelKind {
    pub fn is_thread(self) -> bool {
        matches!(
            self,
            ChannelKind::PublicThread | ChannelKind::PrivateThread | ChannelKind::AnnouncementThread
        )
    }

    /// Channel types the orchestrator walks.
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            ChannelKind::Text | ChannelKind::Announcement | ChannelKind::Forum
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Announcement => "announcement",
            ChannelKind::Forum => "forum",
            ChannelKind::PublicThread => "public_thread",
            ChannelKind::PrivateThread => "private_thread",
            ChannelKind::AnnouncementThread => "announcement_thread",
            ChannelKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "text" => ChannelKind::Text,
            "announcement" => ChannelKind::Announcement,
            "forum" => ChannelKind::Forum,
            "public_thread" => ChannelKind::PublicThread,
            "private_thread" => ChannelKind::PrivateThread,
            "announcement_thread" => ChannelKind::AnnouncementThread,
            _ => ChannelKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawServer {
    pub id: GuildId,
    pub name: String,
    pub icon: Option<String>,
}

/// A guild channel or thread as the platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChannel {
    pub id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    /// Forum tags applied to a thread. Empty for everything else.
    pub applied_tags: Vec<ForumTagId>,
    pub archived: bool,
    pub archive_timestamp: Option<DateTime<Utc>>,
    pub last_message_id: Option<MessageId>,
}

impl RawChannel {
    pub fn new(id: ChannelId, kind: ChannelKind, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id: None,
            name: name.into(),
            kind,
            parent_id: None,
            applied_tags: Vec::new(),
            archived: false,
            archive_timestamp: None,
            last_message_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawUser {
    pub id: UserId,
    pub name: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl RawUser {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEmbed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub fields: Vec<RawEmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAttachment {
    pub id: u64,
    pub url: String,
    pub filename: String,
    pub size: u32,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReaction {
    pub emoji: String,
    pub count: u64,
    /// Whether the bot itself placed this reaction.
    pub me: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    /// Set when `channel_id` is a thread.
    pub parent_channel_id: Option<ChannelId>,
    pub author: RawUser,
    pub content: String,
    pub attachments: Vec<RawAttachment>,
    pub embeds: Vec<RawEmbed>,
    pub reactions: Vec<RawReaction>,
    /// Thread started from this message.
    pub thread: Option<RawChannel>,
    /// Platform-generated notice (member joined, thread created, ...).
    pub system: bool,
}

impl RawMessage {
    pub fn has_reaction_from_bot(&self, emoji: &str) -> bool {
        self.reactions.iter().any(|r| r.me && r.emoji == emoji)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAccount {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<&RawUser> for CanonicalAccount {
    fn from(user: &RawUser) -> Self {
        Self {
            id: user.id,
            name: user.display_name().to_string(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalThread {
    pub id: ChannelId,
    pub server_id: GuildId,
    pub parent_id: ChannelId,
    pub name: String,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub applied_tags: Vec<ForumTagId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub server_id: GuildId,
    pub author_id: UserId,
    /// Thread started from this message.
    pub thread_id: Option<ChannelId>,
    /// Set when the message lives inside a thread.
    pub parent_channel_id: Option<ChannelId>,
    pub content: String,
    /// Ordered set of messages that solve this one.
    pub solutions: Vec<MessageId>,
    pub attachments: Vec<RawAttachment>,
    pub embeds: Vec<RawEmbed>,
    pub reactions: Vec<RawReaction>,
}

impl CanonicalMessage {
    /// Records `solution` as a solution of this message. A message never
    /// solves itself and each solution is listed once.
    pub fn add_solution(&mut self, solution: MessageId) -> bool {
        if solution == self.id || self.solutions.contains(&solution) {
            return false;
        }
        self.solutions.push(solution);
        true
    }
}

/// A thread whose history was only partly read because the pass ran out of
/// message budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCursor {
    pub thread_id: ChannelId,
    /// Last message read from the thread; `None` when nothing was read yet.
    pub resume_after: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: GuildId,
    pub name: String,
    pub icon: Option<String>,
}

impl From<&RawServer> for ServerRecord {
    fn from(server: &RawServer) -> Self {
        Self {
            id: server.id,
            name: server.name.clone(),
            icon: server.icon.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub server_id: GuildId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub invite_code: Option<String>,
}

impl ChannelRecord {
    pub fn from_raw(channel: &RawChannel, server_id: GuildId) -> Self {
        Self {
            id: channel.id,
            server_id,
            name: channel.name.clone(),
            kind: channel.kind,
            parent_id: channel.parent_id,
            invite_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_timestamp() {
        // Snowflake from the platform documentation: 2016-04-30 11:18:25.796 UTC
        let id = 175928847299117063u64;
        assert_eq!(snowflake_ms(id), 1462015105796);
        assert_eq!(
            snowflake_timestamp(id).format("%Y-%m-%d %H:%M:%S").to_string(),
            "2016-04-30 11:18:25"
        );
    }

    #[test]
    fn test_channel_kind_round_trip_and_classes() {
        for kind in [
            ChannelKind::Text,
            ChannelKind::Announcement,
            ChannelKind::Forum,
            ChannelKind::PublicThread,
            ChannelKind::PrivateThread,
            ChannelKind::AnnouncementThread,
            ChannelKind::Other,
        ] {
            assert_eq!(ChannelKind::parse(kind.as_str()), kind);
        }
        assert!(ChannelKind::Forum.is_indexable());
        assert!(!ChannelKind::PublicThread.is_indexable());
        assert!(ChannelKind::PrivateThread.is_thread());
        assert!(!ChannelKind::Text.is_thread());
    }

    #[test]
    fn test_add_solution_rejects_self_and_duplicates() {
        let mut msg = CanonicalMessage {
            id: MessageId::new(10),
            channel_id: ChannelId::new(1),
            server_id: GuildId::new(1),
            author_id: UserId::new(1),
            thread_id: None,
            parent_channel_id: None,
            content: "q".into(),
            solutions: Vec::new(),
            attachments: Vec::new(),
            embeds: Vec::new(),
            reactions: Vec::new(),
        };
        assert!(!msg.add_solution(MessageId::new(10)));
        assert!(msg.add_solution(MessageId::new(11)));
        assert!(!msg.add_solution(MessageId::new(11)));
        assert!(msg.add_solution(MessageId::new(12)));
        assert_eq!(msg.solutions, vec![MessageId::new(11), MessageId::new(12)]);
    }
}
