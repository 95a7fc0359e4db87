use poise::{ChoiceParameter, CreateReply};
use poise::serenity_prelude::{
    self as serenity, ChannelId, CreateEmbed, CreateEmbedFooter, CreateInputText, CreateMessage,
    InputTextStyle,
};
use tracing::{info, warn};

use crate::commands::{answer_modal, ask, guild_id, review_buttons, truncate};
use crate::forms::{FormError, FormTemplate, Question, QuestionStyle, Submission};
use crate::{Context, Error};

/// Suggest form names from the invoking guild
async fn autocomplete_form<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let partial = partial.to_lowercase();
    let forms = ctx
        .guild_id()
        .map(|id| ctx.data().forms.list(id.get()))
        .unwrap_or_default();
    forms
        .into_iter()
        .map(|form| form.name)
        .filter(move |name| name.to_lowercase().contains(&partial))
}

/// Modal inputs for a form's questions
fn question_inputs(questions: &[Question]) -> Vec<CreateInputText> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let style = match question.style {
                QuestionStyle::Short => InputTextStyle::Short,
                QuestionStyle::Paragraph => InputTextStyle::Paragraph,
            };
            CreateInputText::new(style, &question.label, format!("q{index}"))
                .required(question.required)
        })
        .collect()
}

fn question_lines(form: &FormTemplate) -> String {
    if form.questions.is_empty() {
        return "*No questions yet.*".to_string();
    }
    form.questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let required = if question.required { "" } else { " (optional)" };
            format!(
                "`{}` {} · {}{required}",
                index + 1,
                question.label,
                question.style.name()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Embed posted to reviewers for a submission
fn submission_embed(form: &FormTemplate, submission: &Submission) -> CreateEmbed {
    form.questions
        .iter()
        .zip(&submission.answers)
        .fold(
            CreateEmbed::new()
                .title(format!("{} application", form.title))
                .description(format!("From <@{}>", submission.user_id))
                .footer(CreateEmbedFooter::new(format!(
                    "Submission {}",
                    submission.id
                ))),
            |embed, (question, answer)| {
                let answer = if answer.trim().is_empty() {
                    "*No answer*".to_string()
                } else {
                    truncate(answer, 1024)
                };
                embed.field(&question.label, answer, false)
            },
        )
}

/// Server forms and applications
#[poise::command(
    slash_command,
    guild_only,
    subcommands(
        "create",
        "add_question",
        "remove_question",
        "list",
        "show",
        "delete",
        "apply"
    ),
    subcommand_required
)]
pub async fn form(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a form
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Short name members apply with"] name: String,
    #[description = "Title shown on the modal"] title: Option<String>,
    #[description = "Where submissions are posted"]
    #[channel_types("Text")]
    review_channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let data = ctx.data();
    let form = data.forms.create(
        guild_id(ctx)?,
        &name,
        title.as_deref().unwrap_or_default(),
        review_channel.map(|channel| channel.id.get()),
        ctx.author().id.get(),
    )?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .content(format!(
                "Created form **{}**. Add questions with `/form add_question`.",
                form.name
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Add a question to a form
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn add_question(
    ctx: Context<'_>,
    #[description = "Form name"]
    #[autocomplete = "autocomplete_form"]
    form: String,
    #[description = "Question text"] label: String,
    #[description = "Answer box size"] style: Option<QuestionStyle>,
    #[description = "Whether an answer is required"] required: Option<bool>,
) -> Result<(), Error> {
    let data = ctx.data();
    let form = data.forms.add_question(
        guild_id(ctx)?,
        &form,
        &label,
        style.unwrap_or(QuestionStyle::Short),
        required.unwrap_or(true),
    )?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .embed(CreateEmbed::new().title(&form.name).description(question_lines(&form)))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Remove a question from a form
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn remove_question(
    ctx: Context<'_>,
    #[description = "Form name"]
    #[autocomplete = "autocomplete_form"]
    form: String,
    #[description = "Question number"]
    #[min = 1]
    #[max = 5]
    number: usize,
) -> Result<(), Error> {
    let data = ctx.data();
    let form = data.forms.remove_question(guild_id(ctx)?, &form, number)?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .embed(CreateEmbed::new().title(&form.name).description(question_lines(&form)))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List this server's forms
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let forms = ctx.data().forms.list(guild_id(ctx)?);
    let description = if forms.is_empty() {
        "This server has no forms.".to_string()
    } else {
        forms
            .iter()
            .map(|form| {
                format!(
                    "**{}** · {} · {} question(s)",
                    form.name,
                    form.title,
                    form.questions.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    ctx.send(
        CreateReply::default()
            .embed(CreateEmbed::new().title("Forms").description(description))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show a form's questions
#[poise::command(slash_command, guild_only)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Form name"]
    #[autocomplete = "autocomplete_form"]
    form: String,
) -> Result<(), Error> {
    let form = ctx
        .data()
        .forms
        .find(guild_id(ctx)?, &form)
        .ok_or(FormError::NotFound(form))?;
    let review = form
        .review_channel_id
        .map_or_else(|| "not set".to_string(), |id| format!("<#{id}>"));
    let embed = CreateEmbed::new()
        .title(&form.title)
        .description(question_lines(&form))
        .footer(CreateEmbedFooter::new(format!("{} · reviews: {review}", form.name)));
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Delete a form
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Form name"]
    #[autocomplete = "autocomplete_form"]
    form: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let form = data.forms.delete(guild_id(ctx)?, &form)?;
    data.save().await?;
    ctx.send(
        CreateReply::default()
            .content(format!("Deleted form **{}**.", form.name))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Fill in a form
#[poise::command(slash_command, guild_only)]
pub async fn apply(
    ctx: Context<'_>,
    #[description = "Form name"]
    #[autocomplete = "autocomplete_form"]
    form: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let form = data
        .forms
        .find(guild_id(ctx)?, &form)
        .ok_or(FormError::NotFound(form))?;
    if form.questions.is_empty() {
        return Err(FormError::NoQuestions(form.name).into());
    }

    let Some(response) = ask(ctx, &form.title, question_inputs(&form.questions)).await? else {
        info!(form_id = %form.id, user_id = %ctx.author().id, "Form modal closed");
        return Ok(());
    };

    let submission = match data
        .forms
        .submit(&form.id, ctx.author().id.get(), response.inputs.clone())
    {
        Ok(submission) => submission,
        Err(e) => {
            answer_modal(ctx, &response.interaction, format!("{e}.")).await?;
            return Err(e.into());
        }
    };
    data.save().await?;

    let note = match form.review_channel_id {
        Some(channel_id) => {
            let posted = ChannelId::new(channel_id)
                .send_message(
                    ctx.http(),
                    CreateMessage::new()
                        .embed(submission_embed(&form, &submission))
                        .components(review_buttons(
                            "form",
                            &submission.id,
                            ("accept", "reject"),
                        )),
                )
                .await;
            if let Err(e) = posted {
                warn!(
                    submission_id = %submission.id,
                    channel_id = %channel_id,
                    error = %e,
                    "Failed to post submission for review"
                );
            }
            "Thanks! Your application was sent to the moderators."
        }
        None => "Thanks! Your application was recorded.",
    };
    answer_modal(ctx, &response.interaction, note).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::FormStore;

    fn sample_form() -> (FormStore, FormTemplate) {
        let store = FormStore::new();
        store.create(1, "staff", "Staff", None, 9).unwrap();
        store
            .add_question(1, "staff", "Why?", QuestionStyle::Paragraph, true)
            .unwrap();
        let form = store
            .add_question(1, "staff", "Timezone", QuestionStyle::Short, false)
            .unwrap();
        (store, form)
    }

    #[test]
    fn test_question_lines() {
        let (_, form) = sample_form();
        let lines = question_lines(&form);
        assert_eq!(lines, "`1` Why? · Paragraph\n`2` Timezone · Short (optional)");
    }

    #[test]
    fn test_question_inputs() {
        let (_, form) = sample_form();
        let inputs = question_inputs(&form.questions);
        assert_eq!(inputs.len(), 2);
        let yaml = serde_yaml::to_string(&inputs).expect("inputs should serialize");
        assert!(yaml.contains("q0"));
        assert!(yaml.contains("q1"));
    }

    #[test]
    fn test_submission_embed_marks_blank_answers() {
        let (store, form) = sample_form();
        let submission = store
            .submit(&form.id, 5, vec!["I like forms".to_string(), String::new()])
            .unwrap();
        let yaml = serde_yaml::to_string(&submission_embed(&form, &submission))
            .expect("embed should serialize");
        assert!(yaml.contains("Staff application"));
        assert!(yaml.contains("I like forms"));
        assert!(yaml.contains("No answer"));
    }
}
