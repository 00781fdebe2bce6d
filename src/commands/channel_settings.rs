use crate::indexer::{ChannelOutcome, SkipReason};
use crate::settings::{ChannelSettings, ChannelSettingsChange, ServerSettings};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Configure how a channel is indexed and solved
#[poise::command(
    slash_command,
    rename = "channel-settings",
    subcommands(
        "show",
        "indexing",
        "mark_solution",
        "solution_tag",
        "forum_guidelines_consent",
        "index_now"
    ),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn channel_settings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the settings of a channel
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Channel to inspect (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let settings = ctx
        .data()
        .db
        .run_blocking(move |db| db.find_channel_settings(channel_id))
        .await?
        .unwrap_or_else(|| ChannelSettings::new(channel_id));
    ctx.send(poise::CreateReply::default().embed(settings_embed(&settings)))
        .await?;
    Ok(())
}

/// Turn indexing of a channel on or off
#[poise::command(slash_command)]
pub async fn indexing(
    ctx: Context<'_>,
    #[description = "Index this channel"] enabled: bool,
    #[description = "Channel to configure (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let change = if enabled {
        ChannelSettingsChange::EnableIndexing
    } else {
        ChannelSettingsChange::DisableIndexing
    };
    apply_channel_change(ctx, channel, change).await
}

/// Allow members to mark solutions in a channel's threads
#[poise::command(slash_command, rename = "mark-solution")]
pub async fn mark_solution(
    ctx: Context<'_>,
    #[description = "Allow marking solutions"] enabled: bool,
    #[description = "Channel to configure (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    apply_channel_change(ctx, channel, ChannelSettingsChange::SetMarkSolution(enabled)).await
}

/// Set the forum tag applied to solved posts
#[poise::command(slash_command, rename = "solution-tag")]
pub async fn solution_tag(
    ctx: Context<'_>,
    #[description = "Tag id, leave empty to clear"] tag_id: Option<String>,
    #[description = "Forum channel to configure (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let tag = match tag_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<u64>() {
            Ok(id) if id != 0 => Some(serenity::ForumTagId::new(id)),
            _ => {
                ctx.say("❌ The tag id must be a numeric snowflake.").await?;
                return Ok(());
            }
        },
    };
    apply_channel_change(ctx, channel, ChannelSettingsChange::SetSolutionTag(tag)).await
}

/// Treat posting in a channel as consent to public display
#[poise::command(slash_command, rename = "forum-guidelines-consent")]
pub async fn forum_guidelines_consent(
    ctx: Context<'_>,
    #[description = "Posting implies consent"] enabled: bool,
    #[description = "Channel to configure (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    apply_channel_change(
        ctx,
        channel,
        ChannelSettingsChange::SetForumGuidelinesConsent(enabled),
    )
    .await
}

/// Index a channel right away instead of waiting for the next sweep
#[poise::command(slash_command, rename = "index-now")]
pub async fn index_now(
    ctx: Context<'_>,
    #[description = "Channel to index (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    ctx.defer().await?;
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());

    let reply = match ctx.data().indexer.index_channel_now(channel_id).await {
        Ok(ChannelOutcome::Indexed { messages, .. }) => {
            format!("✅ Indexed **{}** new messages in <#{}>.", messages, channel_id)
        }
        Ok(ChannelOutcome::UpToDate) => format!("✅ <#{}> is already up to date.", channel_id),
        Ok(ChannelOutcome::Skipped(SkipReason::IndexingDisabled)) => format!(
            "❌ Indexing is disabled for <#{}>. Enable it with `/channel-settings indexing`.",
            channel_id
        ),
        Ok(ChannelOutcome::Skipped(SkipReason::UnsupportedKind)) => {
            "❌ Only text, announcement and forum channels can be indexed.".to_string()
        }
        Ok(ChannelOutcome::Skipped(SkipReason::InFlight)) => {
            format!("⏳ <#{}> is being indexed right now.", channel_id)
        }
        Err(e) if e.is_configuration() => format!(
            "❌ <#{}> has no settings yet. Enable indexing with `/channel-settings indexing` first.",
            channel_id
        ),
        Err(e) => return Err(e.into()),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Treat every message in this server as publicly displayable
#[poise::command(
    slash_command,
    rename = "server-settings",
    subcommands("public_messages"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn server_settings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Consider all messages in this server public
#[poise::command(slash_command, rename = "public-messages")]
pub async fn public_messages(
    ctx: Context<'_>,
    #[description = "All messages may be displayed publicly"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = ServerSettings {
        server_id: guild_id,
        consider_all_messages_public: enabled,
    };
    ctx.data()
        .db
        .run_blocking(move |db| db.upsert_server_settings(&settings))
        .await?;
    info!(
        server = guild_id.get(),
        enabled, "Updated consider_all_messages_public"
    );
    ctx.say(if enabled {
        "✅ All messages in this server are now considered public."
    } else {
        "✅ Messages in this server now need their author's consent to be shown publicly."
    })
    .await?;
    Ok(())
}

async fn apply_channel_change(
    ctx: Context<'_>,
    channel: Option<serenity::GuildChannel>,
    change: ChannelSettingsChange,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let settings = ctx
        .data()
        .db
        .run_blocking(move |db| db.update_channel_settings(channel_id, change))
        .await?;
    info!(
        channel = channel_id.get(),
        ?change,
        "Updated channel settings by {}",
        ctx.author().name
    );
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Updated settings for <#{}>.", channel_id))
            .embed(settings_embed(&settings)),
    )
    .await?;
    Ok(())
}

fn settings_embed(settings: &ChannelSettings) -> serenity::CreateEmbed {
    let flag = |on: bool| if on { "Enabled" } else { "Disabled" };
    serenity::CreateEmbed::new()
        .title("⚙️ Channel Settings")
        .description(format!("Settings for <#{}>", settings.channel_id))
        .field("Indexing", flag(settings.indexing_enabled), true)
        .field("Mark solution", flag(settings.mark_solution_enabled), true)
        .field(
            "Forum guidelines consent",
            flag(settings.forum_guidelines_consent_enabled),
            true,
        )
        .field(
            "Solution tag",
            settings
                .solution_tag_id
                .map(|t| format!("`{}`", t))
                .unwrap_or_else(|| "None".to_string()),
            true,
        )
        .field(
            "Last indexed message",
            settings
                .last_indexed_snowflake
                .map(|id| format!("`{}`", id))
                .unwrap_or_else(|| "Never".to_string()),
            true,
        )
        .color(0x5865F2)
}
