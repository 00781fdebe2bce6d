//! In-memory `ChatPlatform` and message builders shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};

use crate::error::PlatformError;
use crate::model::{
    ChannelKind, RawChannel, RawEmbed, RawEmbedField, RawMessage, RawReaction, RawServer, RawUser,
};
use crate::platform::{ChatPlatform, ThreadPage};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Page {
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    },
    Reaction {
        channel: ChannelId,
        message: MessageId,
        emoji: String,
    },
    SetTags {
        thread: ChannelId,
        tags: Vec<ForumTagId>,
    },
    Invite {
        channel: ChannelId,
    },
    ArchivedThreads {
        parent: ChannelId,
        before: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Timeout,
    Api,
}

impl Failure {
    fn to_error(self, what: &str) -> PlatformError {
        match self {
            Failure::Timeout => PlatformError::Timeout(30),
            Failure::Api => PlatformError::Api(what.to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub bot_id: Option<UserId>,
    servers: Vec<RawServer>,
    channels: HashMap<ChannelId, RawChannel>,
    messages: HashMap<ChannelId, Vec<RawMessage>>,
    archived: HashMap<ChannelId, Vec<RawChannel>>,
    archived_page_size: Option<usize>,
    page_failures: Mutex<HashMap<ChannelId, Failure>>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    pub fn new(bot_id: u64) -> Self {
        Self {
            bot_id: Some(UserId::new(bot_id)),
            ..Default::default()
        }
    }

    pub fn add_server(&mut self, id: u64, name: &str) {
        self.servers.push(RawServer {
            id: GuildId::new(id),
            name: name.to_string(),
            icon: None,
        });
    }

    pub fn add_channel(&mut self, channel: RawChannel) {
        self.messages.entry(channel.id).or_default();
        self.channels.insert(channel.id, channel);
    }

    /// Registers an archived forum thread; it is still fetchable by id.
    pub fn add_archived_thread(&mut self, mut thread: RawChannel) {
        thread.archived = true;
        if let Some(parent) = thread.parent_id {
            self.archived.entry(parent).or_default().push(thread.clone());
        }
        self.add_channel(thread);
    }

    /// Splits archived-thread listings into pages of `size`.
    pub fn set_archived_page_size(&mut self, size: usize) {
        self.archived_page_size = Some(size);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = RawMessage>) {
        for message in messages {
            let list = self.messages.entry(message.channel_id).or_default();
            list.push(message);
            list.sort_by_key(|m| m.id);
        }
    }

    pub fn set_message(&mut self, message: RawMessage) {
        let list = self.messages.entry(message.channel_id).or_default();
        list.retain(|m| m.id != message.id);
        list.push(message);
        list.sort_by_key(|m| m.id);
    }

    pub fn fail_pages(&self, channel: u64, failure: Failure) {
        self.page_failures
            .lock()
            .unwrap()
            .insert(ChannelId::new(channel), failure);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn page_calls(&self, channel: u64) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Page { channel: ch, .. } if ch.get() == channel))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn bot_user_id(&self) -> Option<UserId> {
        self.bot_id
    }

    async fn list_servers(&self) -> Result<Vec<RawServer>, PlatformError> {
        Ok(self.servers.clone())
    }

    async fn fetch_server(&self, server_id: GuildId) -> Result<RawServer, PlatformError> {
        self.servers
            .iter()
            .find(|s| s.id == server_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("server {server_id}")))
    }

    async fn list_channels(&self, server_id: GuildId) -> Result<Vec<RawChannel>, PlatformError> {
        let mut channels: Vec<RawChannel> = self
            .channels
            .values()
            .filter(|c| c.guild_id == Some(server_id) && !c.kind.is_thread())
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.id);
        Ok(channels)
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<RawChannel, PlatformError> {
        self.channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
    }

    async fn fetch_messages_after(
        &self,
        channel_id: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, PlatformError> {
        self.record(Call::Page {
            channel: channel_id,
            after,
            limit,
        });
        if let Some(failure) = self.page_failures.lock().unwrap().get(&channel_id) {
            return Err(failure.to_error("page"));
        }
        let Some(messages) = self.messages.get(&channel_id) else {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        };
        Ok(messages
            .iter()
            .filter(|m| after.map_or(true, |a| m.id > a))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<RawMessage, PlatformError> {
        self.messages
            .get(&channel_id)
            .and_then(|list| list.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message_id}")))
    }

    async fn list_active_threads(
        &self,
        _server_id: GuildId,
        parent_id: ChannelId,
    ) -> Result<Vec<RawChannel>, PlatformError> {
        let mut threads: Vec<RawChannel> = self
            .channels
            .values()
            .filter(|c| c.kind.is_thread() && c.parent_id == Some(parent_id) && !c.archived)
            .cloned()
            .collect();
        threads.sort_by_key(|c| c.id);
        Ok(threads)
    }

    async fn list_archived_threads(
        &self,
        parent_id: ChannelId,
        before: Option<DateTime<Utc>>,
    ) -> Result<ThreadPage, PlatformError> {
        self.record(Call::ArchivedThreads {
            parent: parent_id,
            before,
        });
        let mut threads: Vec<RawChannel> = self
            .archived
            .get(&parent_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|t| match before {
                Some(before) => t.archive_timestamp.map_or(false, |ts| ts < before),
                None => true,
            })
            .collect();
        threads.sort_by(|a, b| b.archive_timestamp.cmp(&a.archive_timestamp));

        let size = self.archived_page_size.unwrap_or(usize::MAX);
        let has_more = threads.len() > size;
        threads.truncate(size);
        Ok(ThreadPage { threads, has_more })
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.record(Call::Reaction {
            channel: channel_id,
            message: message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn set_thread_tags(
        &self,
        thread_id: ChannelId,
        tags: &[ForumTagId],
    ) -> Result<(), PlatformError> {
        self.record(Call::SetTags {
            thread: thread_id,
            tags: tags.to_vec(),
        });
        Ok(())
    }

    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError> {
        self.record(Call::Invite {
            channel: channel_id,
        });
        Ok(format!("invite-{channel_id}"))
    }
}

pub fn user(id: u64) -> RawUser {
    RawUser {
        id: UserId::new(id),
        name: format!("user{id}"),
        global_name: None,
        avatar: None,
        bot: false,
    }
}

pub fn message(id: u64, channel: u64, author: u64) -> RawMessage {
    RawMessage {
        id: MessageId::new(id),
        channel_id: ChannelId::new(channel),
        guild_id: Some(GuildId::new(1)),
        parent_channel_id: None,
        author: user(author),
        content: format!("message {id}"),
        attachments: Vec::new(),
        embeds: Vec::new(),
        reactions: Vec::new(),
        thread: None,
        system: false,
    }
}

pub fn channel(id: u64, server: u64, kind: ChannelKind) -> RawChannel {
    let mut channel = RawChannel::new(ChannelId::new(id), kind, format!("channel-{id}"));
    channel.guild_id = Some(GuildId::new(server));
    channel
}

pub fn thread(id: u64, parent: u64, server: u64) -> RawChannel {
    let mut thread = channel(id, server, ChannelKind::PublicThread);
    thread.parent_id = Some(ChannelId::new(parent));
    thread
}

/// A bot message carrying the question/solution embed fields.
pub fn solution_embed_message(id: u64, channel: u64, bot: u64, question: u64, solution: u64) -> RawMessage {
    let mut msg = message(id, channel, bot);
    msg.author.bot = true;
    msg.embeds.push(RawEmbed {
        fields: vec![
            RawEmbedField {
                name: "Question Message ID".to_string(),
                value: question.to_string(),
            },
            RawEmbedField {
                name: "Solution Message ID".to_string(),
                value: solution.to_string(),
            },
        ],
        ..Default::default()
    });
    msg
}

pub fn bot_check_reaction() -> RawReaction {
    RawReaction {
        emoji: "✅".to_string(),
        count: 1,
        me: true,
    }
}
