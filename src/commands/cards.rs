use chrono::Utc;
use poise::CreateReply;
use poise::serenity_prelude::{self as serenity, Colour, CreateEmbed, CreateEmbedFooter};
use tracing::info;

use crate::commands::truncate;
use crate::tcg::{BoosterPack, Card, CardId, Stat};
use crate::{Context, Error};

const COLLECTION_PAGE: usize = 25;

/// Embed describing one card
pub(crate) fn card_embed(card: &Card) -> CreateEmbed {
    let stats = Stat::ORDER
        .iter()
        .map(|stat| format!("**{stat}** {}", card.stat(*stat)))
        .collect::<Vec<_>>()
        .join(" · ");

    let mut embed = CreateEmbed::new()
        .title(format!("#{} {}", card.id, card.name))
        .description(format!("{} · {}", card.rarity, card.series))
        .colour(Colour::new(card.rarity.colour()))
        .field("Stats", stats, false)
        .field("Die marker", card.marker.to_string(), true)
        .field("Bad roll", card.bad.to_string(), true);
    if let Some(url) = &card.image_url {
        embed = embed.thumbnail(url);
    }
    embed
}

/// One line per owned card
pub(crate) fn collection_lines(owned: &[(Card, u32)]) -> Vec<String> {
    owned
        .iter()
        .map(|(card, copies)| {
            format!(
                "`#{:>3}` **{}** ×{copies} · {} · 🎲{}",
                card.id, card.name, card.rarity, card.marker
            )
        })
        .collect()
}

/// Embed description for a freshly opened pack
fn opened_description(owned: &[(Card, u32)]) -> String {
    truncate(&collection_lines(owned).join("\n"), 4000)
}

fn booster_line(pack: &BoosterPack) -> String {
    let scope = pack.series.as_deref().unwrap_or("all series");
    let description = pack.description.as_deref().unwrap_or_default();
    format!("**{}** · {} cards from {scope}\n{description}", pack.name, pack.size)
}

/// Browse and collect cards
#[poise::command(
    slash_command,
    subcommands("collection", "view", "open", "boosters", "grant", "reload"),
    subcommand_required
)]
pub async fn cards(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the cards you (or another member) own
#[poise::command(slash_command)]
pub async fn collection(
    ctx: Context<'_>,
    #[description = "Whose collection to show"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let owned = ctx.data().cards.owned(user.id.get());

    let embed = if owned.is_empty() {
        CreateEmbed::new()
            .title(format!("{}'s collection", user.name))
            .description("No cards yet. Open a booster with `/cards open`.")
    } else {
        let total: u32 = owned.iter().map(|(_, copies)| copies).sum();
        let lines = collection_lines(&owned);
        let shown = lines.len().min(COLLECTION_PAGE);
        let mut embed = CreateEmbed::new()
            .title(format!("{}'s collection", user.name))
            .description(truncate(&lines[..shown].join("\n"), 4000))
            .footer(CreateEmbedFooter::new(format!(
                "{} distinct cards, {total} total",
                owned.len()
            )));
        if lines.len() > shown {
            embed = embed.field("More", format!("…and {} more", lines.len() - shown), false);
        }
        embed
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show a card from the catalog
#[poise::command(slash_command)]
pub async fn view(
    ctx: Context<'_>,
    #[description = "Card number"] card: u64,
) -> Result<(), Error> {
    let id = CardId(card);
    let card = ctx
        .data()
        .cards
        .card(id)
        .ok_or(crate::tcg::TcgError::CardNotFound(id))?;
    let copies = ctx.data().cards.copies(ctx.author().id.get(), id);
    let embed = card_embed(&card).footer(CreateEmbedFooter::new(format!("You own {copies}")));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Open a booster pack
#[poise::command(slash_command)]
pub async fn open(
    ctx: Context<'_>,
    #[description = "Pack name (defaults to the first pack)"] pack: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let pack_name = match pack {
        Some(name) => name,
        None => data
            .cards
            .boosters()
            .into_iter()
            .next()
            .map(|pack| pack.name)
            .ok_or_else(|| crate::tcg::TcgError::BoosterNotFound("any".to_string()))?,
    };

    let drawn = {
        let mut rng = rand::rng();
        data.cards.open_booster(
            ctx.author().id.get(),
            &pack_name,
            data.config.booster_cooldown(),
            Utc::now(),
            &mut rng,
        )?
    };
    data.save().await?;

    let owned: Vec<(Card, u32)> = drawn
        .iter()
        .map(|card| (card.clone(), data.cards.copies(ctx.author().id.get(), card.id)))
        .collect();
    let best = drawn.iter().map(|card| card.rarity).max();
    let mut embed = CreateEmbed::new()
        .title(format!("{} opened {pack_name}", ctx.author().name))
        .description(opened_description(&owned))
        .footer(CreateEmbedFooter::new("Copy counts include this pack"));
    if let Some(rarity) = best {
        embed = embed.colour(Colour::new(rarity.colour()));
    }
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List the available booster packs
#[poise::command(slash_command)]
pub async fn boosters(ctx: Context<'_>) -> Result<(), Error> {
    let packs = ctx.data().cards.boosters();
    let description = if packs.is_empty() {
        "No booster packs are available.".to_string()
    } else {
        packs.iter().map(booster_line).collect::<Vec<_>>().join("\n\n")
    };
    let embed = CreateEmbed::new()
        .title("Booster packs")
        .description(truncate(&description, 4000));
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Give a member copies of a card
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn grant(
    ctx: Context<'_>,
    #[description = "Member receiving the card"] user: serenity::User,
    #[description = "Card number"] card: u64,
    #[description = "Number of copies"]
    #[min = 1]
    #[max = 100]
    count: Option<u32>,
) -> Result<(), Error> {
    let data = ctx.data();
    let count = count.unwrap_or(1);
    let copies = data.cards.grant(user.id.get(), CardId(card), count)?;
    data.save().await?;

    info!(
        granted_by = %ctx.author().id,
        user_id = %user.id,
        card = card,
        count = count,
        "Card granted"
    );
    ctx.say(format!("Gave <@{}> {count}× card #{card}; they now own {copies}.", user.id))
        .await?;
    Ok(())
}

/// Reload card series and booster files
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn reload(ctx: Context<'_>) -> Result<(), Error> {
    let count = ctx.data().reload_catalog().await;
    let packs = ctx.data().cards.boosters().len();
    ctx.send(
        CreateReply::default()
            .content(format!("Catalog reloaded: {count} cards, {packs} booster packs."))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
