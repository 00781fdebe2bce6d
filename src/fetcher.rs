//! Paginated retrieval of a channel's history, oldest first.
//!
//! Forum channels have no history of their own, so their threads are listed
//! and paged one by one. Text and announcement channels are paged directly and
//! every thread started from one of their messages is paged afterwards.
//!
//! The message limit is one budget for the whole channel, threads included.
//! Threads it cuts short come back as [`ThreadCursor`]s and are resumed,
//! before anything else, on the next pass.

use std::collections::{BTreeMap, HashSet};

use serenity::model::id::{ChannelId, MessageId};
use tracing::debug;

use crate::error::PlatformError;
use crate::model::{ChannelKind, RawChannel, RawMessage, ThreadCursor};
use crate::platform::{ChatPlatform, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Only messages strictly newer than this id.
    pub start: Option<MessageId>,
    /// Stop once this many messages have been handed out.
    pub limit: Option<usize>,
}

impl FetchOptions {
    pub fn after(start: Option<MessageId>) -> Self {
        Self { start, limit: None }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Pull-based pager over one channel. Each call to [`MessagePager::next_page`]
/// issues at most one request; once exhausted it stays exhausted.
pub struct MessagePager<'a, P: ChatPlatform + ?Sized> {
    platform: &'a P,
    channel_id: ChannelId,
    cursor: Option<MessageId>,
    remaining: Option<usize>,
    pages: usize,
    done: bool,
    hit_limit: bool,
}

impl<'a, P: ChatPlatform + ?Sized> MessagePager<'a, P> {
    pub fn new(platform: &'a P, channel_id: ChannelId, options: FetchOptions) -> Self {
        Self {
            platform,
            channel_id,
            cursor: options.start,
            remaining: options.limit,
            pages: 0,
            done: false,
            hit_limit: false,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Whether paging stopped on the limit rather than at the end of history.
    pub fn hit_limit(&self) -> bool {
        self.hit_limit
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<RawMessage>>, PlatformError> {
        if self.done {
            return Ok(None);
        }
        let page_size = match self.remaining {
            Some(0) => {
                self.done = true;
                self.hit_limit = true;
                return Ok(None);
            }
            Some(n) => n.min(MAX_PAGE_SIZE as usize) as u8,
            None => MAX_PAGE_SIZE,
        };

        let mut page = match self
            .platform
            .fetch_messages_after(self.channel_id, self.cursor, page_size)
            .await
        {
            Ok(page) => page,
            // A missing channel on the very first page is just an empty one.
            Err(e) if e.is_not_found() && self.pages == 0 => {
                debug!("Channel {} not found, treating as empty", self.channel_id);
                self.done = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.pages += 1;

        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }
        page.sort_by_key(|m| m.id);
        if page.len() < page_size as usize {
            self.done = true;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            page.truncate(*remaining);
            *remaining -= page.len();
        }
        self.cursor = page.last().map(|m| m.id);
        Ok(Some(page))
    }

    pub async fn collect_all(&mut self) -> Result<Vec<RawMessage>, PlatformError> {
        let mut messages = Vec::new();
        while let Some(page) = self.next_page().await? {
            messages.extend(page);
        }
        debug!(
            channel = self.channel_id.get(),
            pages = self.pages,
            messages = messages.len(),
            "Fetched channel history"
        );
        Ok(messages)
    }
}

/// What one pass read from a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelHistory {
    pub messages: Vec<RawMessage>,
    /// Newest message the next pass may start after. Text channels only count
    /// their own history; forum channels count every thread message.
    pub watermark: Option<MessageId>,
    /// Threads left unfinished when the budget ran out.
    pub unfinished: Vec<ThreadCursor>,
}

impl ChannelHistory {
    fn push_thread(&mut self, read: ThreadRead, parent: ChannelId, thread: Option<&RawChannel>) {
        for mut message in read.messages {
            message.parent_channel_id = Some(parent);
            // The starter message of a forum post shares its id with the thread.
            if let Some(thread) = thread {
                if message.id.get() == thread.id.get() && message.thread.is_none() {
                    message.thread = Some(thread.clone());
                }
            }
            self.messages.push(message);
        }
        self.unfinished.extend(read.unfinished);
    }
}

struct ThreadRead {
    messages: Vec<RawMessage>,
    unfinished: Option<ThreadCursor>,
}

/// Pages one thread from `cursor`, drawing on the shared `budget`.
async fn read_thread<P: ChatPlatform + ?Sized>(
    platform: &P,
    cursor: ThreadCursor,
    budget: &mut Option<usize>,
) -> Result<ThreadRead, PlatformError> {
    let options = FetchOptions::after(cursor.resume_after).with_limit(*budget);
    let mut pager = MessagePager::new(platform, cursor.thread_id, options);
    let messages = pager.collect_all().await?;
    spend(budget, messages.len());

    let unfinished = pager.hit_limit().then(|| ThreadCursor {
        thread_id: cursor.thread_id,
        resume_after: messages.last().map(|m| m.id).or(cursor.resume_after),
    });
    Ok(ThreadRead {
        messages,
        unfinished,
    })
}

fn spend(budget: &mut Option<usize>, used: usize) {
    if let Some(remaining) = budget.as_mut() {
        *remaining = remaining.saturating_sub(used);
    }
}

/// Every message of `channel` newer than `options.start`, including the
/// messages of its threads. Threads in `backlog` are resumed first.
pub async fn fetch_channel_messages<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel: &RawChannel,
    options: FetchOptions,
    backlog: &[ThreadCursor],
) -> Result<ChannelHistory, PlatformError> {
    match channel.kind {
        ChannelKind::Forum => fetch_forum_messages(platform, channel, options, backlog).await,
        _ => fetch_text_messages(platform, channel, options, backlog).await,
    }
}

async fn fetch_text_messages<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel: &RawChannel,
    options: FetchOptions,
    backlog: &[ThreadCursor],
) -> Result<ChannelHistory, PlatformError> {
    let mut budget = options.limit;
    let mut history = ChannelHistory::default();
    for cursor in backlog {
        let read = read_thread(platform, *cursor, &mut budget).await?;
        history.push_thread(read, channel.id, None);
    }

    let mut pager = MessagePager::new(
        platform,
        channel.id,
        FetchOptions::after(options.start).with_limit(budget),
    );
    let own = pager.collect_all().await?;
    spend(&mut budget, own.len());
    history.watermark = own.last().map(|m| m.id);

    let threads: Vec<RawChannel> = own.iter().filter_map(|m| m.thread.clone()).collect();
    history.messages.extend(own);
    for thread in threads {
        let cursor = ThreadCursor {
            thread_id: thread.id,
            resume_after: None,
        };
        let read = read_thread(platform, cursor, &mut budget).await?;
        history.push_thread(read, channel.id, None);
    }
    Ok(history)
}

async fn fetch_forum_messages<P: ChatPlatform + ?Sized>(
    platform: &P,
    forum: &RawChannel,
    options: FetchOptions,
    backlog: &[ThreadCursor],
) -> Result<ChannelHistory, PlatformError> {
    let listed: BTreeMap<ChannelId, RawChannel> = list_forum_threads(platform, forum)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();
    let pending: HashSet<ChannelId> = backlog.iter().map(|c| c.thread_id).collect();
    let selected: Vec<&RawChannel> = listed
        .values()
        .filter(|t| !pending.contains(&t.id) && has_activity_after(t, options.start))
        .collect();
    debug!(
        forum = forum.id.get(),
        backlog = backlog.len(),
        threads = selected.len(),
        "Fetching forum threads"
    );

    let mut budget = options.limit;
    let mut history = ChannelHistory::default();
    for cursor in backlog {
        let read = read_thread(platform, *cursor, &mut budget).await?;
        history.push_thread(read, forum.id, listed.get(&cursor.thread_id));
    }
    for thread in selected {
        let cursor = ThreadCursor {
            thread_id: thread.id,
            resume_after: None,
        };
        let read = read_thread(platform, cursor, &mut budget).await?;
        history.push_thread(read, forum.id, Some(thread));
    }
    history.watermark = history.messages.iter().map(|m| m.id).max();
    Ok(history)
}

fn has_activity_after(thread: &RawChannel, start: Option<MessageId>) -> bool {
    let Some(start) = start else {
        return true;
    };
    let latest = thread
        .last_message_id
        .map(|id| id.get())
        .unwrap_or(thread.id.get());
    latest > start.get()
}

/// Active and archived threads of a forum, deduplicated and ordered by id.
pub async fn list_forum_threads<P: ChatPlatform + ?Sized>(
    platform: &P,
    forum: &RawChannel,
) -> Result<Vec<RawChannel>, PlatformError> {
    let mut threads: BTreeMap<ChannelId, RawChannel> = BTreeMap::new();

    let mut before = None;
    loop {
        let page = platform.list_archived_threads(forum.id, before).await?;
        let oldest = page
            .threads
            .iter()
            .filter_map(|t| t.archive_timestamp)
            .min();
        for thread in page.threads {
            threads.insert(thread.id, thread);
        }
        match (page.has_more, oldest) {
            (true, Some(ts)) if Some(ts) != before => before = Some(ts),
            _ => break,
        }
    }

    if let Some(server_id) = forum.guild_id {
        for thread in platform.list_active_threads(server_id, forum.id).await? {
            threads.insert(thread.id, thread);
        }
    }

    Ok(threads.into_values().collect())
}
