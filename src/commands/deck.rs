use poise::CreateReply;
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter};
use tracing::info;

use crate::tcg::{CardId, CardStore, DECK_SIZE, Deck, MAX_DECKS_PER_USER, TcgError};
use crate::{Context, Error};

/// Suggest the author's deck names
pub(crate) async fn autocomplete_deck<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let partial = partial.to_lowercase();
    ctx.data()
        .cards
        .decks_for(ctx.author().id.get())
        .into_iter()
        .map(|deck| deck.name)
        .filter(move |name| name.to_lowercase().contains(&partial))
}

/// One line per slot, naming the card when the catalog knows it
pub(crate) fn slot_lines(deck: &Deck, store: &CardStore) -> Vec<String> {
    deck.slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let number = index + 1;
            match slot.and_then(|id| store.card(id)) {
                Some(card) => format!(
                    "`{number}` #{} **{}** · 🎲{} · {}",
                    card.id, card.name, card.marker, card.rarity
                ),
                None => match slot {
                    Some(id) => format!("`{number}` #{id} (missing from catalog)"),
                    None => format!("`{number}` empty"),
                },
            }
        })
        .collect()
}

fn deck_embed(deck: &Deck, store: &CardStore) -> CreateEmbed {
    let status = if deck.is_full() {
        "Ready for battle".to_string()
    } else {
        format!("{}/{DECK_SIZE} slots filled", deck.filled())
    };
    CreateEmbed::new()
        .title(&deck.name)
        .description(slot_lines(deck, store).join("\n"))
        .footer(CreateEmbedFooter::new(status))
}

/// Build decks for battles
#[poise::command(
    slash_command,
    subcommands("create", "list", "show", "set", "clear", "delete"),
    subcommand_required
)]
pub async fn deck(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create an empty deck
#[poise::command(slash_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Deck name"]
    #[max_length = 32]
    name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let deck = data.cards.create_deck(ctx.author().id.get(), &name)?;
    data.save().await?;

    info!(user_id = %ctx.author().id, deck = %deck.name, "Deck created");
    ctx.send(
        CreateReply::default()
            .content(format!(
                "Created **{}**. Fill its {DECK_SIZE} slots with `/deck set`.",
                deck.name
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// List your decks
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let decks = ctx.data().cards.decks_for(ctx.author().id.get());
    let description = if decks.is_empty() {
        "You have no decks yet. Create one with `/deck create`.".to_string()
    } else {
        decks
            .iter()
            .map(|deck| format!("**{}** · {}/{DECK_SIZE}", deck.name, deck.filled()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let embed = CreateEmbed::new()
        .title("Your decks")
        .description(description)
        .footer(CreateEmbedFooter::new(format!(
            "{}/{MAX_DECKS_PER_USER} decks",
            decks.len()
        )));
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Show the cards in a deck
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Deck name"]
    #[autocomplete = "autocomplete_deck"]
    name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let deck = data
        .cards
        .find_deck(ctx.author().id.get(), &name)
        .ok_or_else(|| TcgError::DeckNotFound(name.clone()))?;
    ctx.send(
        CreateReply::default()
            .embed(deck_embed(&deck, &data.cards))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Put a card from your collection into a slot
#[poise::command(slash_command)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Deck name"]
    #[autocomplete = "autocomplete_deck"]
    name: String,
    #[description = "Slot number"]
    #[min = 1]
    #[max = 6]
    slot: usize,
    #[description = "Card number"] card: u64,
) -> Result<(), Error> {
    let data = ctx.data();
    let deck = data
        .cards
        .set_slot(ctx.author().id.get(), &name, slot, CardId(card))?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .embed(deck_embed(&deck, &data.cards))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Empty a slot
#[poise::command(slash_command)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Deck name"]
    #[autocomplete = "autocomplete_deck"]
    name: String,
    #[description = "Slot number"]
    #[min = 1]
    #[max = 6]
    slot: usize,
) -> Result<(), Error> {
    let data = ctx.data();
    let deck = data
        .cards
        .clear_slot(ctx.author().id.get(), &name, slot)?;
    data.save().await?;

    ctx.send(
        CreateReply::default()
            .embed(deck_embed(&deck, &data.cards))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Delete a deck
#[poise::command(slash_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Deck name"]
    #[autocomplete = "autocomplete_deck"]
    name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    let deck = data.cards.delete_deck(user_id, &name)?;
    data.save().await?;

    info!(user_id = %user_id, deck = %deck.name, "Deck deleted");
    ctx.send(
        CreateReply::default()
            .content(format!("Deleted **{}**.", deck.name))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::fixtures::full_store;

    #[test]
    fn test_slot_lines() {
        let store = full_store(&[7]);
        let mut deck = store.find_deck(7, "main").unwrap();
        deck.clear_slot(2).unwrap();
        deck.set_slot(3, CardId(99)).unwrap();

        let lines = slot_lines(&deck, &store);
        assert_eq!(lines.len(), DECK_SIZE);
        assert_eq!(lines[0], "`1` #1 **Card 1** · 🎲1 · Common");
        assert_eq!(lines[1], "`2` empty");
        assert_eq!(lines[2], "`3` #99 (missing from catalog)");
    }
}
