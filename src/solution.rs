//! Marking a thread's question as solved.
//!
//! Every precondition is checked before anything is changed on the platform;
//! the first one that fails is returned as a [`Rejection`] with a stable
//! reason code. Once the solved indicator is applied the question/solution
//! pair is written to the store through the same path the indexer uses.

use serenity::all::Permissions;
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};
use tracing::{info, warn};

use crate::correlate::solution_embed_fields;
use crate::db::{ChannelCommit, Database};
use crate::error::{MarkSolutionError, PlatformError, RejectReason};
use crate::model::{
    ChannelKind, ChannelRecord, RawChannel, RawEmbedField, RawMessage, ServerRecord,
    SOLVED_REACTION,
};
use crate::normalize::normalize_messages;
use crate::platform::ChatPlatform;
use crate::privacy;
use crate::settings::{ChannelSettings, ServerSettings};

/// Platform ceiling on tags applied to one forum thread.
pub const MAX_APPLIED_TAGS: usize = 5;

pub const CONSENT_BUTTON_ID: &str = "consent-button";

#[derive(Debug, Clone)]
pub struct MarkSolutionRequest {
    /// `None` for direct messages.
    pub guild_id: Option<GuildId>,
    /// Channel the candidate solution was posted in.
    pub channel_id: ChannelId,
    pub solution: RawMessage,
    pub actor_id: UserId,
    pub actor_permissions: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvedIndicator {
    Tag(ForumTagId),
    Reaction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEmbed {
    pub description: String,
    pub fields: Vec<RawEmbedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseComponent {
    ConsentButton { custom_id: String, label: String },
    JumpLink { label: String, url: String },
}

#[derive(Debug, Clone)]
pub struct SolutionResponse {
    pub embed: ResponseEmbed,
    pub components: Vec<ResponseComponent>,
    pub question: RawMessage,
    pub solution: RawMessage,
    pub thread: RawChannel,
    pub indicator: SolvedIndicator,
}

struct Validated {
    server_id: GuildId,
    thread: RawChannel,
    parent: RawChannel,
    settings: ChannelSettings,
    server_settings: ServerSettings,
    question: RawMessage,
}

pub struct MarkSolution<'a, P: ChatPlatform + ?Sized> {
    platform: &'a P,
    db: &'a Database,
    site_url: &'a str,
}

impl<'a, P: ChatPlatform + ?Sized> MarkSolution<'a, P> {
    pub fn new(platform: &'a P, db: &'a Database, site_url: &'a str) -> Self {
        Self {
            platform,
            db,
            site_url,
        }
    }

    pub async fn run(&self, request: MarkSolutionRequest) -> Result<SolutionResponse, MarkSolutionError> {
        let mut validated = self.validate(&request).await?;
        let indicator = self.apply_indicator(&validated).await?;
        if let SolvedIndicator::Tag(tag) = indicator {
            validated.thread.applied_tags.push(tag);
        }

        // The response embed is backfilled by the next sweep, so a failed
        // write here only delays the link.
        if let Err(e) = self.persist(&validated, &request.solution).await {
            warn!(
                thread = validated.thread.id.get(),
                "Mark solution: failed to store solution: {}", e
            );
        }

        info!(
            server = validated.server_id.get(),
            thread = validated.thread.id.get(),
            question = validated.question.id.get(),
            solution = request.solution.id.get(),
            ?indicator,
            "Marked solution"
        );
        Ok(self.respond(validated, request.solution, indicator))
    }

    async fn validate(&self, request: &MarkSolutionRequest) -> Result<Validated, MarkSolutionError> {
        let server_id = request.guild_id.ok_or(RejectReason::NotInGuild)?;

        let thread = found(self.platform.fetch_channel(request.channel_id).await)?
            .filter(|c| c.kind.is_thread())
            .ok_or(RejectReason::NotInThread)?;

        let bot_id = self
            .platform
            .bot_user_id()
            .ok_or(MarkSolutionError::MissingBotAccount)?;
        if request.solution.author.id == bot_id {
            return Err(RejectReason::SolutionIsBotMessage.into());
        }

        let parent_id = thread.parent_id.ok_or(RejectReason::NoParentChannel)?;
        let parent = found(self.platform.fetch_channel(parent_id).await)?
            .ok_or(RejectReason::NoParentChannel)?;

        let settings = self
            .db
            .run_blocking(move |db| db.find_channel_settings(parent_id))
            .await?
            .filter(|s| s.mark_solution_enabled)
            .ok_or(RejectReason::MarkSolutionDisabled)?;

        let question = self
            .find_question(&thread, &parent)
            .await?
            .ok_or(RejectReason::QuestionNotFound)?;

        if question.id == request.solution.id {
            return Err(RejectReason::SolutionIsQuestion.into());
        }

        if request.actor_id != question.author.id && !is_moderator(request.actor_permissions) {
            return Err(RejectReason::NoPermission.into());
        }

        if settings
            .solution_tag_id
            .is_some_and(|tag| thread.applied_tags.contains(&tag))
        {
            return Err(RejectReason::AlreadySolvedViaTag.into());
        }
        if question.has_reaction_from_bot(SOLVED_REACTION) {
            return Err(RejectReason::AlreadySolvedViaReaction.into());
        }
        let question_id = question.id;
        let stored = self
            .db
            .run_blocking(move |db| db.find_message_by_id(question_id))
            .await?;
        if stored.is_some_and(|m| !m.solutions.is_empty()) {
            return Err(RejectReason::AlreadySolvedInStore.into());
        }

        let server_settings = self
            .db
            .run_blocking(move |db| db.find_server_settings(server_id))
            .await?;

        Ok(Validated {
            server_id,
            thread,
            parent,
            settings,
            server_settings,
            question,
        })
    }

    /// The thread's root message. It shares its id with the thread and lives in
    /// the parent channel, except for forum posts where it lives in the thread
    /// itself and may have been deleted; then the first remaining message is
    /// the question.
    async fn find_question(
        &self,
        thread: &RawChannel,
        parent: &RawChannel,
    ) -> Result<Option<RawMessage>, PlatformError> {
        let root_id = MessageId::new(thread.id.get());
        if parent.kind != ChannelKind::Forum {
            return found(self.platform.fetch_message(parent.id, root_id).await);
        }
        if let Some(root) = found(self.platform.fetch_message(thread.id, root_id).await)? {
            return Ok(Some(root));
        }
        let first = found(self.platform.fetch_messages_after(thread.id, None, 1).await)?;
        Ok(first.and_then(|page| page.into_iter().next()))
    }

    async fn apply_indicator(&self, v: &Validated) -> Result<SolvedIndicator, PlatformError> {
        if v.parent.kind == ChannelKind::Forum {
            if let Some(tag) = v.settings.solution_tag_id {
                if v.thread.applied_tags.len() < MAX_APPLIED_TAGS {
                    let mut tags = v.thread.applied_tags.clone();
                    tags.push(tag);
                    self.platform.set_thread_tags(v.thread.id, &tags).await?;
                    return Ok(SolvedIndicator::Tag(tag));
                }
            }
        }
        self.platform
            .add_reaction(v.question.channel_id, v.question.id, SOLVED_REACTION)
            .await?;
        Ok(SolvedIndicator::Reaction)
    }

    async fn persist(&self, v: &Validated, solution: &RawMessage) -> anyhow::Result<()> {
        let mut question = v.question.clone();
        let mut solution = solution.clone();
        if question.channel_id == v.thread.id {
            question.parent_channel_id = Some(v.parent.id);
            if question.id.get() == v.thread.id.get() && question.thread.is_none() {
                question.thread = Some(v.thread.clone());
            }
        }
        if solution.channel_id == v.thread.id {
            solution.parent_channel_id = Some(v.parent.id);
        }
        let (question_id, solution_id) = (question.id, solution.id);

        let messages = privacy::filter_messages(self.db, vec![question, solution], v.server_id).await?;
        let mut batch = normalize_messages(&messages, v.server_id);
        if let Some(question) = batch.message_mut(question_id) {
            question.add_solution(solution_id);
        }

        let server = self.platform.fetch_server(v.server_id).await?;
        let parent_id = v.parent.id;
        let existing = self
            .db
            .run_blocking(move |db| db.find_channel(parent_id))
            .await?;
        let mut channel = ChannelRecord::from_raw(&v.parent, v.server_id);
        channel.invite_code = existing.and_then(|c| c.invite_code);

        let commit = ChannelCommit {
            server: ServerRecord::from(&server),
            channel,
            batch,
            watermark: None,
            backlog: None,
        };
        self.db
            .run_blocking(move |db| db.commit_channel_batch(&commit))
            .await
    }

    fn respond(&self, v: Validated, solution: RawMessage, indicator: SolvedIndicator) -> SolutionResponse {
        let mut fields = solution_embed_fields(v.question.id, solution.id);
        fields.push(RawEmbedField {
            name: "Learn more".to_string(),
            value: self.site_url.to_string(),
        });

        let mut components = Vec::new();
        if !v.settings.forum_guidelines_consent_enabled
            && !v.server_settings.consider_all_messages_public
        {
            components.push(ResponseComponent::ConsentButton {
                custom_id: CONSENT_BUTTON_ID.to_string(),
                label: "Publicly display my messages".to_string(),
            });
        }
        components.push(ResponseComponent::JumpLink {
            label: "Jump to solution".to_string(),
            url: message_link(v.server_id, solution.channel_id, solution.id),
        });

        SolutionResponse {
            embed: ResponseEmbed {
                description: format!(
                    "**Thank you for marking this question as solved!**\n\
                     Solved questions are shared on the web so others with the \
                     same problem can find the answer. <@{}>, you can allow your \
                     messages to be shown with the button below.",
                    v.question.author.id
                ),
                fields,
            },
            components,
            question: v.question,
            solution,
            thread: v.thread,
            indicator,
        }
    }
}

fn is_moderator(permissions: Permissions) -> bool {
    permissions.intersects(
        Permissions::MANAGE_THREADS | Permissions::MANAGE_GUILD | Permissions::ADMINISTRATOR,
    )
}

pub fn message_link(server_id: GuildId, channel_id: ChannelId, message_id: MessageId) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        server_id, channel_id, message_id
    )
}

/// 404 as `None`; every other error stays an error.
fn found<T>(result: Result<T, PlatformError>) -> Result<Option<T>, PlatformError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
