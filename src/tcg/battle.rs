//! Card battle resolution
//!
//! A battle rolls one die to decide which cards each side may play, lets
//! both sides pick a card and then plays the three stats best-of-three.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;
use uuid::Uuid;

use crate::BATTLE_TARGET;
use crate::tcg::{
    Card, CardId, Challenge, ChallengeState, DECK_SIZE, DieMarker, STAT_MAX, Stat, TcgError,
    TcgResult, get_matching_cards,
};

/// Stat wins needed to take the match
pub const WINS_NEEDED: usize = 2;
/// Rerolls allowed per stat before it counts as drawn
pub const DEFAULT_REROLL_LIMIT: u32 = 100;

/// One side of a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Challenger,
    Opponent,
}

impl Side {
    pub const ALL: [Self; 2] = [Self::Challenger, Self::Opponent];

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Challenger => Self::Opponent,
            Self::Opponent => Self::Challenger,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Challenger => write!(f, "Challenger"),
            Self::Opponent => write!(f, "Opponent"),
        }
    }
}

/// Source of die and stat rolls
pub trait RollSource {
    /// A six-sided die roll
    fn roll_die(&mut self) -> DieMarker;
    /// A stat roll in `0..=STAT_MAX`
    fn roll_stat(&mut self) -> u16;
}

/// Rolls backed by a random number generator
#[derive(Debug)]
pub struct RngRolls<R>(pub R);

impl<R: Rng> RollSource for RngRolls<R> {
    fn roll_die(&mut self) -> DieMarker {
        DieMarker::clamped(self.0.random_range(DieMarker::MIN..=DieMarker::MAX))
    }

    fn roll_stat(&mut self) -> u16 {
        self.0.random_range(0..=STAT_MAX)
    }
}

/// Why a stat was won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinReason {
    /// The winner's stat was closer to the roll
    Closer {
        challenger_distance: u16,
        opponent_distance: u16,
    },
    /// The losing side's card was disqualified by the roll
    Disqualified(Side),
}

/// How a stat ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatDecision {
    Won {
        side: Side,
        roll: u16,
        reason: WinReason,
    },
    /// Reroll limit reached without a decision
    Drawn,
}

/// Record of one stat, including every reroll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatResult {
    pub stat: Stat,
    pub rolls: Vec<u16>,
    pub decision: StatDecision,
}

impl StatResult {
    #[must_use]
    pub const fn winner(&self) -> Option<Side> {
        match self.decision {
            StatDecision::Won { side, .. } => Some(side),
            StatDecision::Drawn => None,
        }
    }
}

/// Result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Winner(Side),
    /// No side reached two stat wins
    Tie,
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Winner(side) => write!(f, "{side} wins"),
            Self::Tie => write!(f, "Tie"),
        }
    }
}

/// Judge a single roll; `None` means reroll
#[must_use]
pub fn judge(stat: Stat, roll: u16, challenger: &Card, opponent: &Card) -> Option<StatDecision> {
    let won = |side, reason| Some(StatDecision::Won { side, roll, reason });

    match (challenger.is_disqualified(roll), opponent.is_disqualified(roll)) {
        (true, true) => None,
        (true, false) => won(Side::Opponent, WinReason::Disqualified(Side::Challenger)),
        (false, true) => won(Side::Challenger, WinReason::Disqualified(Side::Opponent)),
        (false, false) => {
            let challenger_distance = challenger.distance(stat, roll);
            let opponent_distance = opponent.distance(stat, roll);
            let reason = WinReason::Closer {
                challenger_distance,
                opponent_distance,
            };
            match challenger_distance.cmp(&opponent_distance) {
                Ordering::Less => won(Side::Challenger, reason),
                Ordering::Greater => won(Side::Opponent, reason),
                Ordering::Equal => None,
            }
        }
    }
}

/// Plays stats with a roll source
#[derive(Debug)]
pub struct BattleEngine<S> {
    rolls: S,
    reroll_limit: u32,
}

impl<S: RollSource> BattleEngine<S> {
    pub const fn new(rolls: S, reroll_limit: u32) -> Self {
        Self {
            rolls,
            reroll_limit,
        }
    }

    pub fn roll_die(&mut self) -> DieMarker {
        self.rolls.roll_die()
    }

    /// Roll until one side wins the stat or the reroll limit runs out
    pub fn resolve_stat(&mut self, stat: Stat, challenger: &Card, opponent: &Card) -> StatResult {
        let mut rolls = Vec::new();
        loop {
            let roll = self.rolls.roll_stat();
            rolls.push(roll);

            if let Some(decision) = judge(stat, roll, challenger, opponent) {
                return StatResult {
                    stat,
                    rolls,
                    decision,
                };
            }

            if rolls.len() > self.reroll_limit as usize {
                return StatResult {
                    stat,
                    rolls,
                    decision: StatDecision::Drawn,
                };
            }
        }
    }

    /// Play stats in order until a side has two wins
    pub fn best_of_three(
        &mut self,
        challenger: &Card,
        opponent: &Card,
    ) -> (Vec<StatResult>, MatchOutcome) {
        let mut results = Vec::with_capacity(Stat::ORDER.len());

        for stat in Stat::ORDER {
            results.push(self.resolve_stat(stat, challenger, opponent));

            let leader = Side::ALL
                .into_iter()
                .find(|side| count_wins(&results, *side) >= WINS_NEEDED);
            if let Some(side) = leader {
                return (results, MatchOutcome::Winner(side));
            }
        }

        (results, MatchOutcome::Tie)
    }
}

fn count_wins(results: &[StatResult], side: Side) -> usize {
    results
        .iter()
        .filter(|result| result.winner() == Some(side))
        .count()
}

/// A member's state inside a battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub user_id: u64,
    /// Cards eligible for this round's die roll
    pub options: Vec<Card>,
    pub pick: Option<Card>,
}

/// A battle waiting for picks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: String,
    pub challenge_id: String,
    pub die_roll: DieMarker,
    pub challenger: Combatant,
    pub opponent: Combatant,
    pub started_at: DateTime<Utc>,
}

impl Battle {
    /// Roll the die and work out each side's options
    ///
    /// # Errors
    /// Returns an error unless the challenge has a round in progress, or
    /// if either deck is empty or short of a full deck
    pub fn start<S: RollSource>(
        challenge: &Challenge,
        challenger_deck: &[Card],
        opponent_deck: &[Card],
        engine: &mut BattleEngine<S>,
    ) -> TcgResult<Self> {
        if challenge.state != ChallengeState::RoundInProgress {
            return Err(TcgError::InvalidStateTransition {
                from: challenge.state,
                action: "start a battle for",
            });
        }
        if challenger_deck.is_empty() || opponent_deck.is_empty() {
            return Err(TcgError::EmptyDeck);
        }
        for (side, deck) in [
            (Side::Challenger, challenger_deck),
            (Side::Opponent, opponent_deck),
        ] {
            if deck.len() < DECK_SIZE {
                return Err(TcgError::DeckNotFull(format!("{side} deck")));
            }
        }

        let die_roll = engine.roll_die();
        // Copies of a card collapse into one option
        let options = |deck: &[Card]| -> Vec<Card> {
            let mut options: Vec<Card> = Vec::new();
            for card in get_matching_cards(deck, die_roll) {
                if !options.iter().any(|option| option.id == card.id) {
                    options.push(card.clone());
                }
            }
            options
        };

        let battle = Self {
            id: Uuid::new_v4().to_string(),
            challenge_id: challenge.id.clone(),
            die_roll,
            challenger: Combatant {
                user_id: challenge.challenger.user_id,
                options: options(challenger_deck),
                pick: None,
            },
            opponent: Combatant {
                user_id: challenge.opponent.user_id,
                options: options(opponent_deck),
                pick: None,
            },
            started_at: Utc::now(),
        };

        info!(
            target: BATTLE_TARGET,
            battle_id = %battle.id,
            challenge_id = %battle.challenge_id,
            die_roll = %die_roll,
            challenger_options = battle.challenger.options.len(),
            opponent_options = battle.opponent.options.len(),
            event = "battle_started",
            "Battle started"
        );

        Ok(battle)
    }

    #[must_use]
    pub const fn combatant(&self, side: Side) -> &Combatant {
        match side {
            Side::Challenger => &self.challenger,
            Side::Opponent => &self.opponent,
        }
    }

    fn combatant_mut(&mut self, side: Side) -> &mut Combatant {
        match side {
            Side::Challenger => &mut self.challenger,
            Side::Opponent => &mut self.opponent,
        }
    }

    #[must_use]
    pub fn side_of(&self, user_id: u64) -> Option<Side> {
        Side::ALL
            .into_iter()
            .find(|side| self.combatant(*side).user_id == user_id)
    }

    /// Lock in a member's card
    ///
    /// # Errors
    /// Returns an error for non-participants, repeated picks or cards that
    /// are not among the member's options
    pub fn pick(&mut self, user_id: u64, card_id: CardId) -> TcgResult<&Card> {
        let side = self.side_of(user_id).ok_or(TcgError::NotAParticipant)?;
        let combatant = self.combatant_mut(side);
        if combatant.pick.is_some() {
            return Err(TcgError::AlreadyPicked);
        }
        let card = combatant
            .options
            .iter()
            .find(|card| card.id == card_id)
            .cloned()
            .ok_or(TcgError::CardNotEligible(card_id))?;
        Ok(combatant.pick.insert(card))
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.challenger.pick.is_some() && self.opponent.pick.is_some()
    }

    /// Members that still need to pick
    #[must_use]
    pub fn waiting_on(&self) -> Vec<u64> {
        Side::ALL
            .into_iter()
            .map(|side| self.combatant(side))
            .filter(|combatant| combatant.pick.is_none())
            .map(|combatant| combatant.user_id)
            .collect()
    }

    /// Play the picked cards against each other
    ///
    /// # Errors
    /// Returns `TcgError::PicksIncomplete` until both sides picked
    pub fn resolve<S: RollSource>(&self, engine: &mut BattleEngine<S>) -> TcgResult<BattleReport> {
        let (Some(challenger_card), Some(opponent_card)) =
            (&self.challenger.pick, &self.opponent.pick)
        else {
            return Err(TcgError::PicksIncomplete);
        };

        let (stats, outcome) = engine.best_of_three(challenger_card, opponent_card);

        let report = BattleReport {
            battle_id: self.id.clone(),
            die_roll: self.die_roll,
            challenger_id: self.challenger.user_id,
            opponent_id: self.opponent.user_id,
            challenger_card: challenger_card.clone(),
            opponent_card: opponent_card.clone(),
            stats,
            outcome,
        };

        info!(
            target: BATTLE_TARGET,
            battle_id = %report.battle_id,
            challenger_id = %report.challenger_id,
            opponent_id = %report.opponent_id,
            challenger_card = %report.challenger_card.id,
            opponent_card = %report.opponent_card.id,
            outcome = %report.outcome,
            rolls = report.stats.iter().map(|s| s.rolls.len()).sum::<usize>(),
            event = "battle_resolved",
            "Battle resolved"
        );

        Ok(report)
    }
}

/// Everything needed to announce a battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    pub battle_id: String,
    pub die_roll: DieMarker,
    pub challenger_id: u64,
    pub opponent_id: u64,
    pub challenger_card: Card,
    pub opponent_card: Card,
    pub stats: Vec<StatResult>,
    pub outcome: MatchOutcome,
}

impl BattleReport {
    #[must_use]
    pub fn wins(&self, side: Side) -> usize {
        count_wins(&self.stats, side)
    }

    #[must_use]
    pub const fn user_id(&self, side: Side) -> u64 {
        match side {
            Side::Challenger => self.challenger_id,
            Side::Opponent => self.opponent_id,
        }
    }

    #[must_use]
    pub const fn winner_id(&self) -> Option<u64> {
        match self.outcome {
            MatchOutcome::Winner(side) => Some(self.user_id(side)),
            MatchOutcome::Tie => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::fixtures::{ScriptedRolls, card};
    use crate::tcg::{ChallengeRegistry, ChallengeRequest, fixtures::full_store};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn engine(stats: &[u16]) -> BattleEngine<ScriptedRolls> {
        BattleEngine::new(ScriptedRolls::new(&[3], stats), DEFAULT_REROLL_LIMIT)
    }

    #[test]
    fn test_closer_stat_wins() {
        let a = card(1, 1, 123, [500, 0, 0]);
        let b = card(2, 1, 999, [700, 0, 0]);
        let decision = judge(Stat::Battle, 499, &a, &b);
        assert_eq!(
            decision,
            Some(StatDecision::Won {
                side: Side::Challenger,
                roll: 499,
                reason: WinReason::Closer {
                    challenger_distance: 1,
                    opponent_distance: 201,
                },
            })
        );
    }

    #[test]
    fn test_disqualification() {
        let a = card(1, 1, 400, [400, 0, 0]);
        let b = card(2, 1, 999, [0, 0, 0]);
        // A would be closest but the roll hits its bad value
        let decision = judge(Stat::Battle, 400, &a, &b);
        assert!(matches!(
            decision,
            Some(StatDecision::Won {
                side: Side::Opponent,
                reason: WinReason::Disqualified(Side::Challenger),
                ..
            })
        ));
    }

    #[test]
    fn test_double_disqualification_rerolls() {
        let a = card(1, 1, 42, [10, 10, 10]);
        let b = card(2, 1, 42, [900, 900, 900]);
        assert_eq!(judge(Stat::Battle, 42, &a, &b), None);

        let mut engine = engine(&[42, 42, 20]);
        let result = engine.resolve_stat(Stat::Battle, &a, &b);
        assert_eq!(result.rolls, vec![42, 42, 20]);
        assert_eq!(result.winner(), Some(Side::Challenger));
    }

    #[test]
    fn test_equal_distance_rerolls() {
        let a = card(1, 1, 999, [400, 0, 0]);
        let b = card(2, 1, 999, [600, 0, 0]);
        let mut engine = engine(&[500, 610]);
        let result = engine.resolve_stat(Stat::Battle, &a, &b);
        assert_eq!(result.rolls, vec![500, 610]);
        assert_eq!(result.winner(), Some(Side::Opponent));
    }

    #[test]
    fn test_reroll_limit_draws() {
        let a = card(1, 1, 7, [0, 0, 0]);
        let b = card(2, 1, 7, [0, 0, 0]);
        let mut engine = BattleEngine::new(ScriptedRolls::new(&[1], &[7]), 3);
        let result = engine.resolve_stat(Stat::Sfw, &a, &b);
        assert_eq!(result.decision, StatDecision::Drawn);
        assert_eq!(result.rolls.len(), 4);
    }

    #[test]
    fn test_two_wins_end_the_match() {
        let a = card(1, 1, 999, [100, 100, 900]);
        let b = card(2, 1, 999, [900, 900, 100]);
        let mut engine = engine(&[50, 50, 950]);
        let (stats, outcome) = engine.best_of_three(&a, &b);
        assert_eq!(outcome, MatchOutcome::Winner(Side::Challenger));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].stat, Stat::Battle);
        assert_eq!(stats[1].stat, Stat::Nsfw);
    }

    #[test]
    fn test_third_stat_decides() {
        let a = card(1, 1, 999, [100, 900, 900]);
        let b = card(2, 1, 999, [900, 100, 100]);
        let mut engine = engine(&[50, 50, 60]);
        let (stats, outcome) = engine.best_of_three(&a, &b);
        assert_eq!(stats.len(), 3);
        assert_eq!(outcome, MatchOutcome::Winner(Side::Opponent));
    }

    #[test]
    fn test_tie_without_majority() {
        let a = card(1, 1, 5, [100, 900, 5]);
        let b = card(2, 1, 5, [900, 100, 5]);
        // Battle to A, NSFW to B, SFW never decided
        let mut engine = BattleEngine::new(ScriptedRolls::new(&[1], &[50, 50, 5, 5, 5]), 2);
        let (stats, outcome) = engine.best_of_three(&a, &b);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[2].decision, StatDecision::Drawn);
        assert_eq!(outcome, MatchOutcome::Tie);
    }

    #[test]
    fn test_winner_always_has_majority() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut stats = || -> [u16; 3] {
            [
                rng.random_range(0..=STAT_MAX),
                rng.random_range(0..=STAT_MAX),
                rng.random_range(0..=STAT_MAX),
            ]
        };
        for seed in 0..200_u64 {
            let a = card(1, 1, (seed * 7 % 1000) as u16, stats());
            let b = card(2, 1, (seed * 13 % 1000) as u16, stats());
            let mut engine =
                BattleEngine::new(RngRolls(StdRng::seed_from_u64(seed)), DEFAULT_REROLL_LIMIT);
            let (stats, outcome) = engine.best_of_three(&a, &b);
            if let MatchOutcome::Winner(side) = outcome {
                assert!(count_wins(&stats, side) >= WINS_NEEDED);
                assert!(count_wins(&stats, side.other()) < WINS_NEEDED);
            }
        }
    }

    #[test]
    fn test_rng_rolls_stay_in_range() {
        let mut rolls = RngRolls(StdRng::seed_from_u64(8));
        for _ in 0..1000 {
            let die = rolls.roll_die().get();
            assert!((1..=6).contains(&die));
            assert!(rolls.roll_stat() <= STAT_MAX);
        }
    }

    fn running_challenge() -> (crate::tcg::CardStore, Challenge) {
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
        let deck = store.full_decks_for(2).remove(0);
        registry.accept(&store, &challenge.id, 2, &deck.id).unwrap();
        let challenge = registry.begin_round(&challenge.id).unwrap();
        (store, challenge)
    }

    #[test]
    fn test_battle_flow() {
        let (store, challenge) = running_challenge();
        let challenger_deck = store
            .resolve_deck(challenge.challenger.deck_id.as_deref().unwrap())
            .unwrap();
        let opponent_deck = store
            .resolve_deck(challenge.opponent.deck_id.as_deref().unwrap())
            .unwrap();

        // Die shows 4; fixture decks hold one card per marker
        let mut engine = BattleEngine::new(
            ScriptedRolls::new(&[4], &[10, 20, 30]),
            DEFAULT_REROLL_LIMIT,
        );
        let mut battle =
            Battle::start(&challenge, &challenger_deck, &opponent_deck, &mut engine).unwrap();
        assert_eq!(battle.die_roll.get(), 4);
        assert_eq!(battle.challenger.options.len(), 1);
        assert_eq!(battle.challenger.options[0].marker.get(), 4);
        assert_eq!(battle.waiting_on(), vec![1, 2]);

        assert!(matches!(battle.resolve(&mut engine), Err(TcgError::PicksIncomplete)));
        assert!(matches!(battle.pick(3, CardId(4)), Err(TcgError::NotAParticipant)));
        assert!(matches!(
            battle.pick(1, CardId(1)),
            Err(TcgError::CardNotEligible(CardId(1)))
        ));

        let option = battle.challenger.options[0].id;
        battle.pick(1, option).unwrap();
        assert!(matches!(battle.pick(1, option), Err(TcgError::AlreadyPicked)));
        assert!(!battle.is_ready());

        let option = battle.opponent.options[0].id;
        battle.pick(2, option).unwrap();
        assert!(battle.is_ready());
        assert!(battle.waiting_on().is_empty());

        let report = battle.resolve(&mut engine).unwrap();
        assert_eq!(report.challenger_id, 1);
        assert_eq!(report.opponent_id, 2);
        // Same card on both sides: every roll ties until the limit
        assert_eq!(report.outcome, MatchOutcome::Tie);
        assert_eq!(report.winner_id(), None);
    }

    #[test]
    fn test_battle_requires_running_round() {
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
        let deck = store.cards();
        let mut engine = engine(&[1]);
        assert!(matches!(
            Battle::start(&challenge, &deck, &deck, &mut engine),
            Err(TcgError::InvalidStateTransition { .. })
        ));

        let (_, running) = running_challenge();
        assert!(matches!(
            Battle::start(&running, &[], &deck, &mut engine),
            Err(TcgError::EmptyDeck)
        ));
        assert!(matches!(
            Battle::start(&running, &deck, &deck[..5], &mut engine),
            Err(TcgError::DeckNotFull(_))
        ));
    }

    #[test]
    fn test_copies_collapse_into_one_option() {
        let (_, running) = running_challenge();
        let twin = card(7, 3, 999, [100, 100, 100]);
        let deck = vec![
            twin.clone(),
            twin,
            card(2, 1, 999, [1, 1, 1]),
            card(3, 2, 999, [1, 1, 1]),
            card(4, 4, 999, [1, 1, 1]),
            card(5, 5, 999, [1, 1, 1]),
        ];
        let mut engine = engine(&[1]);
        let mut battle = Battle::start(&running, &deck, &deck, &mut engine).unwrap();
        assert_eq!(battle.die_roll.get(), 3);
        assert_eq!(battle.challenger.options.len(), 1);
        assert_eq!(battle.challenger.options[0].id, CardId(7));
        assert_eq!(battle.pick(1, CardId(7)).unwrap().id, CardId(7));
    }
}
