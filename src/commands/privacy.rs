use crate::settings::{UserServerSettings, UserSettingsChange};
use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Control how your messages in this server are indexed
#[poise::command(
    slash_command,
    subcommands("show", "indexing", "display_publicly"),
    guild_only
)]
pub async fn privacy(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show your privacy settings for this server
#[poise::command(slash_command, ephemeral)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user_id = ctx.author().id;
    let settings = ctx
        .data()
        .db
        .run_blocking(move |db| db.find_user_server_settings(user_id, guild_id))
        .await?;

    let embed = serenity::CreateEmbed::new()
        .title("🔒 Your Privacy Settings")
        .field(
            "Message indexing",
            if settings.message_indexing_disabled {
                "Disabled"
            } else {
                "Enabled"
            },
            true,
        )
        .field(
            "Display publicly",
            if settings.can_publicly_display_messages {
                "Allowed"
            } else {
                "Not allowed"
            },
            true,
        )
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Allow or stop indexing of your messages in this server
#[poise::command(slash_command, ephemeral)]
pub async fn indexing(
    ctx: Context<'_>,
    #[description = "Index your messages in this server"] enabled: bool,
) -> Result<(), Error> {
    let change = if enabled {
        UserSettingsChange::EnableIndexing
    } else {
        UserSettingsChange::DisableIndexing
    };
    let settings = apply_user_change(ctx.data(), ctx.author().id, ctx.guild_id(), change).await?;
    ctx.say(describe(&settings)).await?;
    Ok(())
}

/// Allow or stop your messages being displayed on the public site
#[poise::command(slash_command, rename = "display-publicly", ephemeral)]
pub async fn display_publicly(
    ctx: Context<'_>,
    #[description = "Show your messages publicly"] enabled: bool,
) -> Result<(), Error> {
    let change = if enabled {
        UserSettingsChange::GrantConsent
    } else {
        UserSettingsChange::RevokeConsent
    };
    let settings = apply_user_change(ctx.data(), ctx.author().id, ctx.guild_id(), change).await?;
    ctx.say(describe(&settings)).await?;
    Ok(())
}

/// Handles a click on the consent button attached to solution messages.
pub async fn handle_consent_button(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let settings = apply_user_change(
        data,
        interaction.user.id,
        interaction.guild_id,
        UserSettingsChange::GrantConsent,
    )
    .await?;

    interaction
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(describe(&settings))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn apply_user_change(
    data: &Data,
    user_id: serenity::UserId,
    guild_id: Option<serenity::GuildId>,
    change: UserSettingsChange,
) -> Result<UserServerSettings, Error> {
    let guild_id = guild_id.ok_or("Must be run in a guild")?;
    let settings = data
        .db
        .run_blocking(move |db| db.update_user_server_settings(user_id, guild_id, change))
        .await?;
    info!(
        user = user_id.get(),
        server = guild_id.get(),
        ?change,
        "Updated user privacy settings"
    );
    Ok(settings)
}

fn describe(settings: &UserServerSettings) -> &'static str {
    match (
        settings.message_indexing_disabled,
        settings.can_publicly_display_messages,
    ) {
        (true, _) => {
            "🔒 Your messages in this server are not indexed, so they can't be displayed publicly. \
Use `/privacy indexing enabled:True` to change that."
        }
        (false, true) => "✅ Your messages in this server are indexed and can be displayed publicly.",
        (false, false) => {
            "✅ Your messages in this server are indexed but are shown anonymously. \
Use `/privacy display-publicly enabled:True` to show them publicly."
        }
    }
}
