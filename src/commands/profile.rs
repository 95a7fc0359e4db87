use poise::CreateReply;
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

use crate::profile::{FieldUpdate, Profile, ProfileError, ProfileUpdate};
use crate::tcg::{CardId, CardStore, TcgError};
use crate::{Context, Error};

/// Card number 0 clears the favourite
fn favourite_update(card: Option<u64>) -> FieldUpdate<CardId> {
    match card {
        None => FieldUpdate::Keep,
        Some(0) => FieldUpdate::Clear,
        Some(id) => FieldUpdate::Set(CardId(id)),
    }
}

fn profile_embed(profile: &Profile, user: &serenity::User, store: &CardStore) -> CreateEmbed {
    let name = profile.display_name.as_deref().unwrap_or(&user.name);
    let mut embed = CreateEmbed::new()
        .title(name)
        .thumbnail(user.face())
        .description(profile.bio.as_deref().unwrap_or("*No bio yet.*"));

    if let Some(pronouns) = &profile.pronouns {
        embed = embed.field("Pronouns", pronouns, true);
    }
    if let Some(id) = profile.favourite_card {
        let favourite = store
            .card(id)
            .map_or_else(|| format!("#{id}"), |card| format!("#{id} {}", card.name));
        embed = embed.field("Favourite card", favourite, true);
    }
    let owned = store.collection(profile.user_id).total();
    embed
        .field("Cards owned", owned.to_string(), true)
        .footer(CreateEmbedFooter::new(format!(
            "Member since {}",
            profile.created_at.format("%Y-%m-%d")
        )))
}

/// Member profiles
#[poise::command(
    slash_command,
    subcommands("view", "edit", "delete"),
    subcommand_required
)]
pub async fn profile(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show a profile
#[poise::command(slash_command)]
pub async fn view(
    ctx: Context<'_>,
    #[description = "Whose profile to show"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let data = ctx.data();
    let profile = data
        .profiles
        .get(user.id.get())
        .ok_or(ProfileError::NotFound(user.id.get()))?;
    ctx.send(CreateReply::default().embed(profile_embed(&profile, user, &data.cards)))
        .await?;
    Ok(())
}

/// Create or change your profile; a blank value clears a field
#[poise::command(slash_command)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Name shown on your profile"] display_name: Option<String>,
    #[description = "Your pronouns"] pronouns: Option<String>,
    #[description = "A few words about you"] bio: Option<String>,
    #[description = "Favourite card number (0 to clear)"] favourite_card: Option<u64>,
) -> Result<(), Error> {
    let data = ctx.data();
    let favourite_card = favourite_update(favourite_card);
    if let FieldUpdate::Set(id) = favourite_card {
        if data.cards.card(id).is_none() {
            return Err(TcgError::CardNotFound(id).into());
        }
    }

    let update = ProfileUpdate {
        display_name: FieldUpdate::from_input(display_name),
        pronouns: FieldUpdate::from_input(pronouns),
        bio: FieldUpdate::from_input(bio),
        favourite_card,
    };
    let profile = data.profiles.upsert(ctx.author().id.get(), update)?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .content("Profile saved.")
            .embed(profile_embed(&profile, ctx.author(), &data.cards))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Delete your profile
#[poise::command(slash_command)]
pub async fn delete(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    data.profiles.delete(ctx.author().id.get())?;
    data.save().await?;
    ctx.send(
        CreateReply::default()
            .content("Your profile was deleted. Your cards and decks are kept.")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_favourite_update() {
        assert_eq!(favourite_update(None), FieldUpdate::Keep);
        assert_eq!(favourite_update(Some(0)), FieldUpdate::Clear);
        assert_eq!(favourite_update(Some(12)), FieldUpdate::Set(CardId(12)));
    }
}
