//! Slash commands

mod battle;
mod cards;
mod deck;
mod forms;
mod meta;
mod profile;
mod verify;

use poise::serenity_prelude::{
    ButtonStyle, CreateActionRow, CreateButton, CreateInputText, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateQuickModal, ModalInteraction, QuickModalResponse,
};
use std::time::Duration;

use crate::{Context, Data, Error};

/// How long a member may keep a modal open
const MODAL_TIMEOUT: Duration = Duration::from_secs(600);
/// Discord caps modal titles at 45 characters
const MODAL_TITLE_LEN: usize = 45;

pub use battle::challenge;
pub use cards::cards;
pub use deck::deck;
pub use forms::form;
pub use meta::ping;
pub use profile::profile;
pub use verify::verify;

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        ping(),
        cards(),
        deck(),
        challenge(),
        profile(),
        form(),
        verify(),
    ]
}

/// The invoking guild's id
fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|id| id.get())
        .ok_or_else(|| "This command only works in a server".into())
}

/// Accept and reject buttons for a review message
///
/// Custom ids look like `<kind>:<accept>:<id>`; the event handler parses
/// them back.
fn review_buttons(
    kind: &str,
    id: &str,
    (accept, reject): (&str, &str),
) -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{kind}:{accept}:{id}"))
            .label(capitalize(accept))
            .style(ButtonStyle::Success),
        CreateButton::new(format!("{kind}:{reject}:{id}"))
            .label(capitalize(reject))
            .style(ButtonStyle::Danger),
    ])]
}

/// Show a modal in reply to the invoking slash command
///
/// Returns `None` if the member closed it or let it time out.
async fn ask(
    ctx: Context<'_>,
    title: &str,
    inputs: Vec<CreateInputText>,
) -> Result<Option<QuickModalResponse>, Error> {
    let poise::Context::Application(app) = ctx else {
        return Err("This command only works as a slash command".into());
    };
    let modal = inputs.into_iter().fold(
        CreateQuickModal::new(truncate(title, MODAL_TITLE_LEN)).timeout(MODAL_TIMEOUT),
        CreateQuickModal::field,
    );
    Ok(app
        .interaction
        .quick_modal(ctx.serenity_context(), modal)
        .await?)
}

/// Private reply to a submitted modal
async fn answer_modal(
    ctx: Context<'_>,
    interaction: &ModalInteraction,
    content: impl Into<String>,
) -> Result<(), Error> {
    interaction
        .create_response(
            ctx.http(),
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Discord embeds cap field values at 1024 characters
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}
