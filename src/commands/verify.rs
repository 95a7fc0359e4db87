use poise::CreateReply;
use poise::serenity_prelude::{
    self as serenity, ChannelId, CreateEmbed, CreateEmbedFooter, CreateInputText, CreateMessage,
    InputTextStyle, RoleId,
};
use tracing::{info, warn};

use crate::commands::{answer_modal, ask, guild_id, review_buttons, truncate};
use crate::config::GuildConfig;
use crate::forms::{FormError, MAX_LABEL_LEN, MAX_QUESTIONS};
use crate::verification::{VerificationError, VerificationRequest};
use crate::{Context, Error};

/// Split `a | b | c` into verification questions
fn parse_questions(input: &str) -> Result<Vec<String>, FormError> {
    let questions: Vec<String> = input
        .split('|')
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .map(ToString::to_string)
        .collect();
    if questions.is_empty() {
        return Err(FormError::LabelTooLong);
    }
    if questions.len() > MAX_QUESTIONS {
        return Err(FormError::TooManyQuestions);
    }
    if questions
        .iter()
        .any(|question| question.chars().count() > MAX_LABEL_LEN)
    {
        return Err(FormError::LabelTooLong);
    }
    Ok(questions)
}

fn request_embed(request: &VerificationRequest) -> CreateEmbed {
    request.answers.iter().fold(
        CreateEmbed::new()
            .title("Verification request")
            .description(format!("<@{}> would like to be verified", request.user_id))
            .footer(CreateEmbedFooter::new(format!("Request {}", request.id))),
        |embed, (question, answer)| embed.field(question, truncate(answer, 1024), false),
    )
}

/// Member verification
#[poise::command(
    slash_command,
    guild_only,
    subcommands("start", "setup", "pending"),
    subcommand_required
)]
pub async fn verify(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Answer the verification questions
#[poise::command(slash_command, guild_only)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let guild = guild_id(ctx)?;
    let config = data
        .get_guild_config(serenity::GuildId::new(guild))
        .unwrap_or_else(|| GuildConfig::new(guild));
    let (role_id, channel_id) = config.verification_target()?;

    if let Some(member) = ctx.author_member().await {
        if member.roles.contains(&RoleId::new(role_id)) {
            return Err(VerificationError::AlreadyVerified.into());
        }
    }

    let inputs = config
        .verification_questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            CreateInputText::new(InputTextStyle::Paragraph, question, format!("v{index}"))
        })
        .collect();
    let Some(response) = ask(ctx, "Verification", inputs).await? else {
        info!(guild_id = %guild, user_id = %ctx.author().id, "Verification modal closed");
        return Ok(());
    };

    let answers = config
        .verification_questions
        .iter()
        .cloned()
        .zip(response.inputs.iter().cloned())
        .collect();
    let request = match data
        .verifications
        .submit(guild, ctx.author().id.get(), answers)
    {
        Ok(request) => request,
        Err(e) => {
            answer_modal(ctx, &response.interaction, format!("{e}.")).await?;
            return Err(e.into());
        }
    };
    data.save().await?;

    let posted = ChannelId::new(channel_id)
        .send_message(
            ctx.http(),
            CreateMessage::new()
                .embed(request_embed(&request))
                .components(review_buttons("verify", &request.id, ("approve", "deny"))),
        )
        .await;
    if let Err(e) = posted {
        warn!(
            request_id = %request.id,
            channel_id = %channel_id,
            error = %e,
            "Failed to post verification request"
        );
    }

    answer_modal(
        ctx,
        &response.interaction,
        "Thanks! A moderator will review your answers soon.",
    )
    .await?;
    Ok(())
}

/// Configure verification for this server
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Role granted on approval"] role: serenity::Role,
    #[description = "Where requests are reviewed"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
    #[description = "Questions separated by |"] questions: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let guild = guild_id(ctx)?;
    let mut config = data
        .get_guild_config(serenity::GuildId::new(guild))
        .unwrap_or_else(|| GuildConfig::new(guild));
    config.verified_role_id = Some(role.id.get());
    config.verification_channel_id = Some(channel.id.get());
    if let Some(questions) = questions {
        config.verification_questions = parse_questions(&questions)?;
    }
    let question_count = config.verification_questions.len();
    data.set_guild_config(config);
    data.save().await?;

    info!(
        guild_id = %guild,
        role_id = %role.id,
        channel_id = %channel.id,
        questions = question_count,
        "Verification configured"
    );
    ctx.send(
        CreateReply::default()
            .content(format!(
                "Verification grants <@&{}> and is reviewed in <#{}> ({question_count} questions).",
                role.id, channel.id
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List requests waiting for review
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn pending(ctx: Context<'_>) -> Result<(), Error> {
    let requests = ctx.data().verifications.pending(guild_id(ctx)?);
    let description = if requests.is_empty() {
        "Nobody is waiting for review.".to_string()
    } else {
        requests
            .iter()
            .map(|request| {
                format!(
                    "<@{}> · <t:{}:R>",
                    request.user_id,
                    request.submitted_at.timestamp()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    ctx.send(
        CreateReply::default()
            .embed(
                CreateEmbed::new()
                    .title("Pending verifications")
                    .description(truncate(&description, 4000)),
            )
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
