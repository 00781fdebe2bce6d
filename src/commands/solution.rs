use crate::error::MarkSolutionError;
use crate::platform::discord::raw_message;
use crate::solution::{MarkSolution, MarkSolutionRequest, ResponseComponent, SolutionResponse};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

/// Mark this message as the solution to the thread's question
#[poise::command(context_menu_command = "✅ Mark Solution", guild_only)]
pub async fn mark_solution(ctx: Context<'_>, message: serenity::Message) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let actor_permissions = match ctx {
        poise::Context::Application(app) => app
            .interaction
            .member
            .as_ref()
            .and_then(|member| member.permissions),
        poise::Context::Prefix(_) => None,
    }
    .unwrap_or_else(serenity::Permissions::empty);

    let request = MarkSolutionRequest {
        guild_id: ctx.guild_id(),
        channel_id: message.channel_id,
        solution: raw_message(&message),
        actor_id: ctx.author().id,
        actor_permissions,
    };

    let data = ctx.data();
    let workflow = MarkSolution::new(data.platform.as_ref(), &data.db, &data.config.site_url);
    match workflow.run(request).await {
        Ok(response) => {
            message
                .channel_id
                .send_message(ctx.http(), solution_message(&response).reference_message(&message))
                .await?;
            ctx.say("✅ Marked as solved.").await?;
        }
        Err(MarkSolutionError::Rejected(rejection)) => {
            info!(
                "Mark solution rejected for user {}: {}",
                ctx.author().id,
                rejection.reason.code()
            );
            ctx.say(format!("❌ {}", rejection.message)).await?;
        }
        Err(e) => {
            error!("Mark solution failed: {}", e);
            ctx.say("❌ Something went wrong while marking the solution. Please try again later.")
                .await?;
        }
    }
    Ok(())
}

/// The public message announcing a solved question.
pub fn solution_message(response: &SolutionResponse) -> serenity::CreateMessage {
    let mut embed = serenity::CreateEmbed::new()
        .description(response.embed.description.clone())
        .color(0x57F287);
    for field in &response.embed.fields {
        embed = embed.field(field.name.clone(), field.value.clone(), true);
    }

    let buttons: Vec<serenity::CreateButton> = response
        .components
        .iter()
        .map(|component| match component {
            ResponseComponent::ConsentButton { custom_id, label } => {
                serenity::CreateButton::new(custom_id.clone())
                    .label(label.clone())
                    .style(serenity::ButtonStyle::Success)
            }
            ResponseComponent::JumpLink { label, url } => {
                serenity::CreateButton::new_link(url.clone()).label(label.clone())
            }
        })
        .collect();

    serenity::CreateMessage::new()
        .embed(embed)
        .components(vec![serenity::CreateActionRow::Buttons(buttons)])
}
