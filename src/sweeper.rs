//! Background expiry of abandoned challenges

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, Http};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::Data;
use crate::tcg::Challenge;

/// How often stale challenges are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Expire every challenge past its deadline and drop its battle
pub fn sweep(data: &Data, now: DateTime<Utc>) -> Vec<Challenge> {
    let expired = data.challenges.expire_stale(&data.cards, now);
    for challenge in &expired {
        data.battles.remove(&challenge.id);
    }
    if !expired.is_empty() {
        info!(count = expired.len(), "Stale challenges expired");
    }
    expired
}

/// Run [`sweep`] on an interval for the lifetime of the process
pub fn start(data: Data, http: Arc<Http>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for challenge in sweep(&data, Utc::now()) {
                let notice = format!(
                    "The battle between <@{}> and <@{}> expired.",
                    challenge.challenger.user_id, challenge.opponent.user_id
                );
                if let Err(e) = ChannelId::new(challenge.discussion_channel())
                    .say(http.as_ref(), notice)
                    .await
                {
                    warn!(challenge_id = %challenge.id, error = %e, "Failed to announce expiry");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BotConfig;
    use crate::tcg::{Battle, BattleEngine, CardId, ChallengeRequest};
    use crate::tcg::fixtures::{ScriptedRolls, card};

    #[test]
    fn test_sweep_drops_battles() {
        let data = Data::new(BotConfig::default());
        for id in 1..=6 {
            data.cards
                .add_card(card(id, id as u8, 999, [100, 100, 100]))
                .unwrap();
        }
        for user in [1, 2] {
            data.cards.create_deck(user, "Main").unwrap();
            for slot in 1..=6 {
                data.cards.grant(user, CardId(slot as u64), 1).unwrap();
                data.cards
                    .set_slot(user, "Main", slot, CardId(slot as u64))
                    .unwrap();
            }
        }

        let challenge = data
            .challenges
            .issue(
                &data.cards,
                ChallengeRequest {
                    guild_id: Some(1),
                    channel_id: 100,
                    challenger_id: 1,
                    opponent_id: 2,
                    challenger_deck: None,
                },
                chrono::Duration::seconds(30),
            )
            .unwrap();
        let deck = data.cards.find_deck(2, "Main").unwrap();
        data.challenges
            .accept(&data.cards, &challenge.id, 2, &deck.id)
            .unwrap();
        let challenge = data.challenges.begin_round(&challenge.id).unwrap();
        let cards = data.cards.resolve_deck(&deck.id).unwrap();
        let mut engine = BattleEngine::new(ScriptedRolls::new(&[3], &[500]), 10);
        let battle = Battle::start(&challenge, &cards, &cards, &mut engine).unwrap();
        data.battles.insert(challenge.id.clone(), battle);

        assert!(sweep(&data, Utc::now()).is_empty());
        let expired = sweep(&data, Utc::now() + chrono::Duration::minutes(1));
        assert_eq!(expired.len(), 1);
        assert!(data.battles.is_empty());
        assert!(data.challenges.is_empty());
        assert!(data.cards.committed_to(&deck.id).is_none());
    }
}
