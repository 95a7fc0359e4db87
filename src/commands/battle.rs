//! The `/challenge` flow: answer, deck choice, picks and the report

use chrono::{DateTime, Utc};
use poise::CreateReply;
use poise::serenity_prelude::{
    self as serenity, ButtonStyle, ChannelId, ComponentInteraction,
    ComponentInteractionCollector, ComponentInteractionDataKind, CreateActionRow, CreateButton,
    CreateEmbed, CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseMessage,
    CreateMessage, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, CreateThread,
    MessageId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::commands::deck::autocomplete_deck;
use crate::error::notice_embed;
use crate::logging::log_battle;
use crate::tcg::{
    Battle, BattleEngine, BattleReport, Card, CardId, Challenge, ChallengeRequest, Deck,
    DiscordNotifier, MatchOutcome, RngRolls, Side, StatDecision, StatResult, TcgError,
    WinReason, notify_opponent,
};
use crate::{Context, Error};

const ACCEPT_ID: &str = "challenge:accept";
const DECLINE_ID: &str = "challenge:decline";
const DECK_ID: &str = "battle:deck";
const PICK_ID: &str = "battle:pick";

/// Slack on the challenge deadline so the sweeper never races the pick window
const ROUND_GRACE_SECS: i64 = 30;

type Engine = BattleEngine<RngRolls<StdRng>>;

/// Time left until a deadline, zero once it has passed
fn remaining_until(deadline: DateTime<Utc>) -> Duration {
    (deadline - Utc::now()).to_std().unwrap_or_default()
}

fn answer_buttons() -> Vec<CreateActionRow> {
    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(ACCEPT_ID)
            .label("Accept")
            .style(ButtonStyle::Success),
        CreateButton::new(DECLINE_ID)
            .label("Decline")
            .style(ButtonStyle::Danger),
    ])]
}

fn deck_menu(decks: &[Deck]) -> Vec<CreateActionRow> {
    let options = decks
        .iter()
        .map(|deck| CreateSelectMenuOption::new(&deck.name, &deck.id))
        .collect();
    vec![CreateActionRow::SelectMenu(
        CreateSelectMenu::new(DECK_ID, CreateSelectMenuKind::String { options })
            .placeholder("Choose your deck"),
    )]
}

fn pick_menu(options: &[Card]) -> Vec<CreateActionRow> {
    let options = options
        .iter()
        .map(|card| {
            CreateSelectMenuOption::new(format!("#{} {}", card.id, card.name), card.id.to_string())
                .description(format!(
                    "Battle {} · NSFW {} · SFW {} · 🎲{}",
                    card.stats.battle, card.stats.nsfw, card.stats.sfw, card.marker
                ))
        })
        .collect();
    vec![CreateActionRow::SelectMenu(
        CreateSelectMenu::new(PICK_ID, CreateSelectMenuKind::String { options })
            .placeholder("Pick your card"),
    )]
}

/// First value of a string select
fn selected_value(press: &ComponentInteraction) -> Option<&str> {
    match &press.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => {
            values.first().map(String::as_str)
        }
        _ => None,
    }
}

/// One line describing how a stat was decided
pub(crate) fn describe_stat(result: &StatResult, report: &BattleReport) -> String {
    let rerolls = result.rolls.len().saturating_sub(1);
    let line = match result.decision {
        StatDecision::Won {
            side,
            roll,
            reason:
                WinReason::Closer {
                    challenger_distance,
                    opponent_distance,
                },
        } => format!(
            "rolled {roll}: <@{}> wins ({challenger_distance} vs {opponent_distance} away)",
            report.user_id(side)
        ),
        StatDecision::Won {
            side,
            roll,
            reason: WinReason::Disqualified(loser),
        } => format!(
            "rolled {roll}: <@{}> hit their bad roll, <@{}> wins",
            report.user_id(loser),
            report.user_id(side)
        ),
        StatDecision::Drawn => "drawn".to_string(),
    };
    if rerolls == 0 {
        format!("**{}** {line}", result.stat)
    } else {
        format!("**{}** {line} after {rerolls} reroll(s)", result.stat)
    }
}

fn report_embed(report: &BattleReport) -> CreateEmbed {
    let headline = match report.outcome {
        MatchOutcome::Winner(side) => format!(
            "<@{}> wins {}-{}!",
            report.user_id(side),
            report.wins(side),
            report.wins(side.other())
        ),
        MatchOutcome::Tie => "It's a tie!".to_string(),
    };
    let stats = report
        .stats
        .iter()
        .map(|result| describe_stat(result, report))
        .collect::<Vec<_>>()
        .join("\n");
    let colour = report
        .challenger_card
        .rarity
        .max(report.opponent_card.rarity)
        .colour();

    CreateEmbed::new()
        .title("Battle results")
        .description(headline)
        .colour(colour)
        .field(
            "Cards",
            format!(
                "<@{}>: #{} {}\n<@{}>: #{} {}",
                report.challenger_id,
                report.challenger_card.id,
                report.challenger_card.name,
                report.opponent_id,
                report.opponent_card.id,
                report.opponent_card.name
            ),
            false,
        )
        .field("Stats", stats, false)
        .footer(CreateEmbedFooter::new(format!("Die roll {}", report.die_roll)))
}

/// Private reply to a button or menu press
async fn refuse(ctx: Context<'_>, press: &ComponentInteraction, content: String) -> Result<(), Error> {
    press
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

/// Replace the pressed message's content and drop its components
async fn settle(ctx: Context<'_>, press: &ComponentInteraction, content: String) -> Result<(), Error> {
    press
        .create_response(
            ctx.http(),
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(Vec::new()),
            ),
        )
        .await?;
    Ok(())
}

/// Challenge another member to a card battle
#[poise::command(slash_command, guild_only)]
pub async fn challenge(
    ctx: Context<'_>,
    #[description = "Who to battle"] opponent: serenity::User,
    #[description = "Your deck (defaults to your first full deck)"]
    #[autocomplete = "autocomplete_deck"]
    deck: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let challenge = data.challenges.issue(
        &data.cards,
        ChallengeRequest {
            guild_id: ctx.guild_id().map(|id| id.get()),
            channel_id: ctx.channel_id().get(),
            challenger_id: ctx.author().id.get(),
            opponent_id: opponent.id.get(),
            challenger_deck: deck,
        },
        data.config.challenge_deadline(),
    )?;

    let result = run(ctx, challenge.clone()).await;
    if result.is_err() {
        abandon(ctx, &challenge.id);
    }
    result
}

/// Expire a challenge that could not finish and drop its battle
fn abandon(ctx: Context<'_>, challenge_id: &str) {
    let data = ctx.data();
    data.battles.remove(challenge_id);
    if let Ok(challenge) = data.challenges.expire(&data.cards, challenge_id) {
        info!(challenge_id = %challenge.id, "Challenge expired");
    }
}

async fn run(ctx: Context<'_>, challenge: Challenge) -> Result<(), Error> {
    let data = ctx.data();
    let challenger_id = challenge.challenger.user_id;
    let opponent_id = challenge.opponent.user_id;

    let reply = ctx
        .send(
            CreateReply::default()
                .content(format!(
                    "<@{challenger_id}> challenges <@{opponent_id}> to a card battle! \
                     Answer <t:{}:R>.",
                    challenge.expires_at.timestamp()
                ))
                .components(answer_buttons()),
        )
        .await?;
    let message_id = reply.message().await?.id;

    let challenge = match ctx
        .channel_id()
        .create_thread_from_message(
            ctx.http(),
            message_id,
            CreateThread::new(format!("Battle {}", &challenge.id[..8])),
        )
        .await
    {
        Ok(thread) => data.challenges.set_thread(&challenge.id, thread.id.get())?,
        Err(e) => {
            warn!(challenge_id = %challenge.id, error = %e, "Could not open a challenge thread");
            challenge
        }
    };

    let notifier = DiscordNotifier::new(ctx.serenity_context().http.clone());
    let notice = format!(
        "<@{challenger_id}> challenged you to a card battle in <#{}>.",
        challenge.discussion_channel()
    );
    if let Err(e) = notify_opponent(&notifier, &challenge, &notice).await {
        warn!(challenge_id = %challenge.id, error = %e, "Opponent could not be notified");
    }

    let Some(press) = await_answer(ctx, &challenge, message_id).await? else {
        abandon(ctx, &challenge.id);
        reply
            .edit(
                ctx,
                CreateReply::default()
                    .content(format!(
                        "<@{opponent_id}> did not answer <@{challenger_id}>'s challenge in time."
                    ))
                    .components(Vec::new()),
            )
            .await?;
        return Ok(());
    };

    if press.data.custom_id == DECLINE_ID {
        data.challenges
            .decline(&data.cards, &challenge.id, press.user.id.get())?;
        settle(
            ctx,
            &press,
            format!("<@{}> called off the battle.", press.user.id),
        )
        .await?;
        return Ok(());
    }

    let deck_id = choose_deck(ctx, &challenge, press).await?;
    let Some(deck_id) = deck_id else {
        abandon(ctx, &challenge.id);
        reply
            .edit(
                ctx,
                CreateReply::default()
                    .content(format!("<@{opponent_id}> did not choose a deck in time."))
                    .components(Vec::new()),
            )
            .await?;
        return Ok(());
    };
    data.challenges
        .accept(&data.cards, &challenge.id, opponent_id, &deck_id)?;

    play_round(ctx, &challenge.id).await
}

/// Wait for the opponent to accept, or either side to decline
async fn await_answer(
    ctx: Context<'_>,
    challenge: &Challenge,
    message_id: MessageId,
) -> Result<Option<ComponentInteraction>, Error> {
    loop {
        let remaining = remaining_until(challenge.expires_at);
        if remaining.is_zero() {
            return Ok(None);
        }
        let Some(press) = ComponentInteractionCollector::new(ctx)
            .message_id(message_id)
            .timeout(remaining)
            .filter(|press| {
                press.data.custom_id == ACCEPT_ID || press.data.custom_id == DECLINE_ID
            })
            .await
        else {
            return Ok(None);
        };

        let user_id = press.user.id.get();
        if !challenge.involves(user_id) {
            refuse(ctx, &press, "This challenge isn't yours.".to_string()).await?;
            continue;
        }
        if press.data.custom_id == ACCEPT_ID && user_id != challenge.opponent.user_id {
            refuse(
                ctx,
                &press,
                format!("Only <@{}> can accept.", challenge.opponent.user_id),
            )
            .await?;
            continue;
        }
        return Ok(Some(press));
    }
}

/// The opponent's deck: picked automatically when they have one full deck
async fn choose_deck(
    ctx: Context<'_>,
    challenge: &Challenge,
    press: ComponentInteraction,
) -> Result<Option<String>, Error> {
    let opponent_id = challenge.opponent.user_id;
    let decks = ctx.data().cards.full_decks_for(opponent_id);

    match decks.as_slice() {
        [] => Err(TcgError::NoFullDeck(opponent_id).into()),
        [only] => {
            settle(
                ctx,
                &press,
                format!("<@{opponent_id}> accepted with **{}**!", only.name),
            )
            .await?;
            Ok(Some(only.id.clone()))
        }
        _ => {
            press
                .create_response(
                    ctx.http(),
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .content(format!("<@{opponent_id}>, choose your deck."))
                            .components(deck_menu(&decks)),
                    ),
                )
                .await?;

            loop {
                let remaining = remaining_until(challenge.expires_at);
                if remaining.is_zero() {
                    return Ok(None);
                }
                let Some(choice) = ComponentInteractionCollector::new(ctx)
                    .message_id(press.message.id)
                    .timeout(remaining)
                    .filter(|choice| choice.data.custom_id == DECK_ID)
                    .await
                else {
                    return Ok(None);
                };

                if choice.user.id.get() != opponent_id {
                    refuse(ctx, &choice, "Only the challenged member picks a deck.".to_string())
                        .await?;
                    continue;
                }
                let Some(deck) = selected_value(&choice)
                    .and_then(|id| decks.iter().find(|deck| deck.id == id))
                else {
                    refuse(ctx, &choice, "That deck is no longer available.".to_string()).await?;
                    continue;
                };
                settle(
                    ctx,
                    &choice,
                    format!("<@{opponent_id}> accepted with **{}**!", deck.name),
                )
                .await?;
                return Ok(Some(deck.id.clone()));
            }
        }
    }
}

/// Roll the die, collect both picks and announce the result
async fn play_round(ctx: Context<'_>, challenge_id: &str) -> Result<(), Error> {
    let data = ctx.data();
    data.challenges.begin_round(challenge_id)?;
    let challenge = data.challenges.extend_deadline(
        challenge_id,
        Utc::now() + data.config.pick_deadline() + chrono::Duration::seconds(ROUND_GRACE_SECS),
    )?;
    let channel = ChannelId::new(challenge.discussion_channel());

    let deck_of = |side: Side| -> Result<Vec<Card>, TcgError> {
        let deck_id = challenge
            .player(side)
            .deck_id
            .as_deref()
            .ok_or(TcgError::DeckNotFound(side.to_string()))?;
        data.cards.resolve_deck(deck_id)
    };
    let challenger_deck = deck_of(Side::Challenger)?;
    let opponent_deck = deck_of(Side::Opponent)?;

    let mut engine: Engine = BattleEngine::new(
        RngRolls(StdRng::from_os_rng()),
        data.config.reroll_limit,
    );
    let battle = Battle::start(&challenge, &challenger_deck, &opponent_deck, &mut engine)?;
    data.battles.insert(challenge.id.clone(), battle.clone());

    let mut menus: HashMap<MessageId, u64> = HashMap::new();
    for side in Side::ALL {
        let combatant = battle.combatant(side);
        let message = channel
            .send_message(
                ctx.http(),
                CreateMessage::new()
                    .content(format!(
                        "🎲 The die shows **{}**. <@{}>, pick your card.",
                        battle.die_roll, combatant.user_id
                    ))
                    .components(pick_menu(&combatant.options)),
            )
            .await?;
        menus.insert(message.id, combatant.user_id);
    }

    if !collect_picks(ctx, &challenge.id, &menus).await? {
        let waiting = data
            .battles
            .remove(&challenge.id)
            .map(|(_, battle)| battle.waiting_on())
            .unwrap_or_default();
        abandon(ctx, &challenge.id);
        let names = waiting
            .iter()
            .map(|id| format!("<@{id}>"))
            .collect::<Vec<_>>()
            .join(" and ");
        channel
            .say(
                ctx.http(),
                format!("{names} did not pick in time. The battle is off."),
            )
            .await?;
        return Ok(());
    }

    let battle = data
        .battles
        .remove(&challenge.id)
        .map(|(_, battle)| battle)
        .ok_or_else(|| TcgError::ChallengeNotFound(challenge.id.clone()))?;
    let report = battle.resolve(&mut engine)?;
    data.challenges.resolve(&data.cards, &challenge.id)?;
    log_battle(&report);

    channel
        .send_message(ctx.http(), CreateMessage::new().embed(report_embed(&report)))
        .await?;
    Ok(())
}

/// Gather picks until both sides locked in; `false` on timeout
async fn collect_picks(
    ctx: Context<'_>,
    challenge_id: &str,
    menus: &HashMap<MessageId, u64>,
) -> Result<bool, Error> {
    let data = ctx.data();
    let deadline = Instant::now() + data.config.pick_timeout();
    let message_ids: Vec<MessageId> = menus.keys().copied().collect();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        let ids = message_ids.clone();
        let Some(press) = ComponentInteractionCollector::new(ctx)
            .timeout(remaining)
            .filter(move |press| {
                press.data.custom_id == PICK_ID && ids.contains(&press.message.id)
            })
            .await
        else {
            return Ok(false);
        };

        let user_id = press.user.id.get();
        if menus.get(&press.message.id) != Some(&user_id) {
            refuse(ctx, &press, "That menu belongs to someone else.".to_string()).await?;
            continue;
        }
        let Some(card_id) = selected_value(&press).and_then(|value| value.parse().ok()) else {
            refuse(ctx, &press, "Pick a card from the menu.".to_string()).await?;
            continue;
        };

        // The map guard must not live across an await
        let picked = {
            let mut battle = data
                .battles
                .get_mut(challenge_id)
                .ok_or_else(|| TcgError::ChallengeNotFound(challenge_id.to_string()))?;
            let picked = battle
                .pick(user_id, CardId(card_id))
                .map(|card| card.name.clone());
            picked.map(|name| (name, battle.is_ready()))
        };

        match picked {
            Ok((name, ready)) => {
                press
                    .create_response(
                        ctx.http(),
                        CreateInteractionResponse::UpdateMessage(
                            CreateInteractionResponseMessage::new()
                                .content(format!("<@{user_id}> has locked in a card."))
                                .components(Vec::new()),
                        ),
                    )
                    .await?;
                press
                    .create_followup(
                        ctx.http(),
                        serenity::CreateInteractionResponseFollowup::new()
                            .content(format!("You picked **{name}**."))
                            .ephemeral(true),
                    )
                    .await?;
                if ready {
                    return Ok(true);
                }
            }
            Err(e) => {
                press
                    .create_response(
                        ctx.http(),
                        CreateInteractionResponse::Message(
                            CreateInteractionResponseMessage::new()
                                .embed(notice_embed(&e))
                                .ephemeral(true),
                        ),
                    )
                    .await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::fixtures::{ScriptedRolls, card, full_store};
    use crate::tcg::{ChallengeRegistry, DieMarker, Stat};

    fn report(stats: Vec<StatResult>, outcome: MatchOutcome) -> BattleReport {
        BattleReport {
            battle_id: "b".to_string(),
            die_roll: DieMarker::clamped(3),
            challenger_id: 10,
            opponent_id: 20,
            challenger_card: card(1, 3, 999, [500, 500, 500]),
            opponent_card: card(2, 3, 999, [100, 100, 100]),
            stats,
            outcome,
        }
    }

    #[test]
    fn test_describe_stat() {
        let closer = StatResult {
            stat: Stat::Battle,
            rolls: vec![300, 450],
            decision: StatDecision::Won {
                side: Side::Challenger,
                roll: 450,
                reason: WinReason::Closer {
                    challenger_distance: 50,
                    opponent_distance: 350,
                },
            },
        };
        let disqualified = StatResult {
            stat: Stat::Nsfw,
            rolls: vec![13],
            decision: StatDecision::Won {
                side: Side::Opponent,
                roll: 13,
                reason: WinReason::Disqualified(Side::Challenger),
            },
        };
        let drawn = StatResult {
            stat: Stat::Sfw,
            rolls: vec![1, 2, 3],
            decision: StatDecision::Drawn,
        };
        let report = report(
            vec![closer.clone(), disqualified.clone(), drawn.clone()],
            MatchOutcome::Tie,
        );

        assert_eq!(
            describe_stat(&closer, &report),
            "**Battle** rolled 450: <@10> wins (50 vs 350 away) after 1 reroll(s)"
        );
        assert_eq!(
            describe_stat(&disqualified, &report),
            "**NSFW** rolled 13: <@10> hit their bad roll, <@20> wins"
        );
        assert_eq!(
            describe_stat(&drawn, &report),
            "**SFW** drawn after 2 reroll(s)"
        );
    }

    #[test]
    fn test_report_embed_headline() {
        let won = StatResult {
            stat: Stat::Battle,
            rolls: vec![500],
            decision: StatDecision::Won {
                side: Side::Challenger,
                roll: 500,
                reason: WinReason::Closer {
                    challenger_distance: 0,
                    opponent_distance: 400,
                },
            },
        };
        let report = report(
            vec![won.clone(), won],
            MatchOutcome::Winner(Side::Challenger),
        );
        let yaml = serde_yaml::to_string(&report_embed(&report)).expect("embed should serialize");
        assert!(yaml.contains("<@10> wins 2-0!"));
        assert!(yaml.contains("Die roll 3"));
    }

    #[test]
    fn test_remaining_until_past_deadline() {
        assert!(remaining_until(Utc::now() - chrono::Duration::seconds(5)).is_zero());
        assert!(!remaining_until(Utc::now() + chrono::Duration::seconds(60)).is_zero());
    }

    #[test]
    fn test_pick_menu_values_unique_with_copies() {
        let store = full_store(&[1, 2]);
        let registry = ChallengeRegistry::new();
        let challenge = registry
            .issue(
                &store,
                ChallengeRequest {
                    guild_id: None,
                    channel_id: 10,
                    challenger_id: 1,
                    opponent_id: 2,
                    challenger_deck: None,
                },
                chrono::Duration::minutes(5),
            )
            .unwrap();
        let deck = store.find_deck(2, "Main").unwrap();
        registry.accept(&store, &challenge.id, 2, &deck.id).unwrap();
        let challenge = registry.begin_round(&challenge.id).unwrap();

        // Two copies of card 3 share the die face
        let mut cards = store.resolve_deck(&deck.id).unwrap();
        cards[0] = cards[2].clone();
        let mut engine = BattleEngine::new(ScriptedRolls::new(&[3], &[500]), 10);
        let battle = Battle::start(&challenge, &cards, &cards, &mut engine).unwrap();

        let yaml = serde_yaml::to_string(&pick_menu(&battle.challenger.options))
            .expect("menu should serialize");
        assert_eq!(yaml.matches("value: '3'").count(), 1);
    }

    #[test]
    fn test_pick_menu_lists_options() {
        let rows = pick_menu(&[card(4, 2, 13, [1, 2, 3])]);
        let yaml = serde_yaml::to_string(&rows).expect("menu should serialize");
        assert!(yaml.contains(PICK_ID));
        assert!(yaml.contains("#4 Card 4"));
    }
}
