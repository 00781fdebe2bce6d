//! Conversion of raw platform messages into the store's canonical shapes.
//!
//! Accounts, threads and messages are keyed by id, so repeated entries
//! collapse into one and output order is ascending id.

use std::collections::BTreeMap;

use serenity::model::id::{GuildId, MessageId};

use crate::model::{
    CanonicalAccount, CanonicalMessage, CanonicalThread, RawChannel, RawMessage,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub accounts: Vec<CanonicalAccount>,
    pub threads: Vec<CanonicalThread>,
    pub messages: Vec<CanonicalMessage>,
}

impl NormalizedBatch {
    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut CanonicalMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

pub fn normalize_messages(messages: &[RawMessage], server_id: GuildId) -> NormalizedBatch {
    let mut accounts = BTreeMap::new();
    let mut threads = BTreeMap::new();
    let mut canonical = BTreeMap::new();

    for message in messages {
        accounts
            .entry(message.author.id)
            .or_insert_with(|| CanonicalAccount::from(&message.author));

        if let Some(thread) = &message.thread {
            threads
                .entry(thread.id)
                .or_insert_with(|| canonical_thread(thread, message, server_id));
        }

        canonical
            .entry(message.id)
            .or_insert_with(|| canonical_message(message, server_id));
    }

    NormalizedBatch {
        accounts: accounts.into_values().collect(),
        threads: threads.into_values().collect(),
        messages: canonical.into_values().collect(),
    }
}

fn canonical_thread(thread: &RawChannel, starter: &RawMessage, server_id: GuildId) -> CanonicalThread {
    CanonicalThread {
        id: thread.id,
        server_id,
        parent_id: thread
            .parent_id
            .or(starter.parent_channel_id)
            .unwrap_or(starter.channel_id),
        name: thread.name.clone(),
        archived: thread.archived,
        archived_at: thread.archive_timestamp,
        applied_tags: thread.applied_tags.clone(),
    }
}

pub fn canonical_message(message: &RawMessage, server_id: GuildId) -> CanonicalMessage {
    CanonicalMessage {
        id: message.id,
        channel_id: message.channel_id,
        server_id,
        author_id: message.author.id,
        thread_id: message.thread.as_ref().map(|t| t.id),
        parent_channel_id: message.parent_channel_id,
        content: message.content.clone(),
        solutions: Vec::new(),
        attachments: message.attachments.clone(),
        embeds: message.embeds.clone(),
        reactions: message.reactions.clone(),
    }
}
