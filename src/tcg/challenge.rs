//! Challenge lifecycle and registry
//!
//! A challenge pairs two members for a battle. It moves through
//! `Challenged -> Accepted -> RoundInProgress -> Resolved`, or ends early
//! as `Declined` or `Expired`. Terminal challenges leave the registry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

use crate::TCG_TARGET;
use crate::tcg::{CardStore, Side, TcgError, TcgResult};

/// Challenge lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeState {
    /// Waiting for the opponent to answer
    Challenged,
    /// Opponent accepted and picked a deck
    Accepted,
    /// Die rolled, players are picking cards
    RoundInProgress,
    /// Battle finished
    Resolved,
    /// Opponent turned it down
    Declined,
    /// Nobody answered in time
    Expired,
}

impl ChallengeState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Declined | Self::Expired)
    }
}

impl std::fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Challenged => write!(f, "Challenged"),
            Self::Accepted => write!(f, "Accepted"),
            Self::RoundInProgress => write!(f, "RoundInProgress"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Declined => write!(f, "Declined"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

/// A member taking part in a challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: u64,
    /// Deck selected for the battle
    pub deck_id: Option<String>,
}

impl Player {
    #[must_use]
    pub const fn new(user_id: u64) -> Self {
        Self {
            user_id,
            deck_id: None,
        }
    }
}

/// Parameters for issuing a challenge
#[derive(Debug, Clone)]
pub struct ChallengeRequest {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub challenger_id: u64,
    pub opponent_id: u64,
    /// Deck name; the challenger's first full deck when absent
    pub challenger_deck: Option<String>,
}

/// A pending or running challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub guild_id: Option<u64>,
    /// Channel the challenge was issued in
    pub channel_id: u64,
    /// Discussion thread, once created
    pub thread_id: Option<u64>,
    pub challenger: Player,
    pub opponent: Player,
    pub state: ChallengeState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    #[must_use]
    pub fn involves(&self, user_id: u64) -> bool {
        self.challenger.user_id == user_id || self.opponent.user_id == user_id
    }

    #[must_use]
    pub fn side_of(&self, user_id: u64) -> Option<Side> {
        if self.challenger.user_id == user_id {
            Some(Side::Challenger)
        } else if self.opponent.user_id == user_id {
            Some(Side::Opponent)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn player(&self, side: Side) -> &Player {
        match side {
            Side::Challenger => &self.challenger,
            Side::Opponent => &self.opponent,
        }
    }

    /// Channel to talk in: the thread if there is one
    #[must_use]
    pub fn discussion_channel(&self) -> u64 {
        self.thread_id.unwrap_or(self.channel_id)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.expires_at <= now
    }

    fn transition(
        &mut self,
        allowed: &[ChallengeState],
        to: ChallengeState,
        action: &'static str,
    ) -> TcgResult<()> {
        if !allowed.contains(&self.state) {
            return Err(TcgError::InvalidStateTransition {
                from: self.state,
                action,
            });
        }
        info!(
            target: TCG_TARGET,
            challenge_id = %self.id,
            challenger_id = %self.challenger.user_id,
            opponent_id = %self.opponent.user_id,
            from = %self.state,
            to = %to,
            "Challenge state changed"
        );
        self.state = to;
        Ok(())
    }

    /// Opponent accepts with the given deck
    ///
    /// # Errors
    /// Returns an error unless the challenge is `Challenged`
    pub fn accept(&mut self, deck_id: impl Into<String>) -> TcgResult<()> {
        self.transition(&[ChallengeState::Challenged], ChallengeState::Accepted, "accept")?;
        self.opponent.deck_id = Some(deck_id.into());
        Ok(())
    }

    /// Move into card selection
    ///
    /// # Errors
    /// Returns an error unless the challenge is `Accepted`
    pub fn begin_round(&mut self) -> TcgResult<()> {
        self.transition(
            &[ChallengeState::Accepted],
            ChallengeState::RoundInProgress,
            "start a round for",
        )
    }

    /// Mark the battle as finished
    ///
    /// # Errors
    /// Returns an error unless the challenge is `RoundInProgress`
    pub fn resolve(&mut self) -> TcgResult<()> {
        self.transition(
            &[ChallengeState::RoundInProgress],
            ChallengeState::Resolved,
            "resolve",
        )
    }

    /// # Errors
    /// Returns an error unless the challenge is `Challenged`
    pub fn decline(&mut self) -> TcgResult<()> {
        self.transition(&[ChallengeState::Challenged], ChallengeState::Declined, "decline")
    }

    /// # Errors
    /// Returns an error if the challenge already ended
    pub fn expire(&mut self) -> TcgResult<()> {
        self.transition(
            &[
                ChallengeState::Challenged,
                ChallengeState::Accepted,
                ChallengeState::RoundInProgress,
            ],
            ChallengeState::Expired,
            "expire",
        )
    }
}

/// Registry of live challenges keyed by id
#[derive(Clone, Default)]
pub struct ChallengeRegistry {
    challenges: Arc<DashMap<String, Challenge>>,
    /// Serializes the check-then-insert in `issue`
    issue_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for ChallengeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeRegistry")
            .field("challenges", &self.challenges.len())
            .finish()
    }
}

impl ChallengeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a challenge
    ///
    /// # Errors
    /// - `SelfChallenge` if both sides are the same member
    /// - `AlreadyInChallenge` if either side has a live challenge
    /// - `DeckNotFound`/`DeckNotFull` for a bad challenger deck choice
    /// - `NoFullDeck` if either side owns no full deck
    pub fn issue(
        &self,
        store: &CardStore,
        request: ChallengeRequest,
        timeout: Duration,
    ) -> TcgResult<Challenge> {
        if request.challenger_id == request.opponent_id {
            return Err(TcgError::SelfChallenge);
        }

        let _guard = self
            .issue_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for user_id in [request.challenger_id, request.opponent_id] {
            if self.active_for(user_id).is_some() {
                return Err(TcgError::AlreadyInChallenge(user_id));
            }
        }

        let challenger_deck = match request.challenger_deck.as_deref() {
            Some(name) => {
                let deck = store
                    .find_deck(request.challenger_id, name)
                    .ok_or_else(|| TcgError::DeckNotFound(name.to_string()))?;
                if !deck.is_full() {
                    return Err(TcgError::DeckNotFull(deck.name));
                }
                deck
            }
            None => store
                .full_decks_for(request.challenger_id)
                .into_iter()
                .next()
                .ok_or(TcgError::NoFullDeck(request.challenger_id))?,
        };

        if !store.has_full_deck(request.opponent_id) {
            return Err(TcgError::NoFullDeck(request.opponent_id));
        }

        let id = Uuid::new_v4().to_string();
        let challenger_deck =
            store.commit_deck(&challenger_deck.id, request.challenger_id, &id)?;

        let now = Utc::now();
        let challenge = Challenge {
            id,
            guild_id: request.guild_id,
            channel_id: request.channel_id,
            thread_id: None,
            challenger: Player {
                user_id: request.challenger_id,
                deck_id: Some(challenger_deck.id),
            },
            opponent: Player::new(request.opponent_id),
            state: ChallengeState::Challenged,
            created_at: now,
            expires_at: now + timeout,
        };

        self.challenges
            .insert(challenge.id.clone(), challenge.clone());

        info!(
            target: TCG_TARGET,
            challenge_id = %challenge.id,
            challenger_id = %challenge.challenger.user_id,
            opponent_id = %challenge.opponent.user_id,
            "Challenge issued"
        );

        Ok(challenge)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Challenge> {
        self.challenges.get(id).map(|entry| entry.value().clone())
    }

    /// The live challenge a member takes part in, if any
    #[must_use]
    pub fn active_for(&self, user_id: u64) -> Option<Challenge> {
        self.challenges
            .iter()
            .find(|entry| entry.involves(user_id) && !entry.state.is_terminal())
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    /// Record the discussion thread
    ///
    /// # Errors
    /// Returns `ChallengeNotFound` for unknown ids
    pub fn set_thread(&self, id: &str, thread_id: u64) -> TcgResult<Challenge> {
        let mut challenge = self
            .challenges
            .get_mut(id)
            .ok_or_else(|| TcgError::ChallengeNotFound(id.to_string()))?;
        challenge.thread_id = Some(thread_id);
        Ok(challenge.clone())
    }

    /// Move the deadline of a live challenge, e.g. when a round starts
    ///
    /// # Errors
    /// Returns `ChallengeNotFound` for unknown ids
    pub fn extend_deadline(&self, id: &str, expires_at: DateTime<Utc>) -> TcgResult<Challenge> {
        self.update(id, |challenge| {
            challenge.expires_at = expires_at;
            Ok(())
        })
    }

    fn update<F>(&self, id: &str, apply: F) -> TcgResult<Challenge>
    where
        F: FnOnce(&mut Challenge) -> TcgResult<()>,
    {
        let mut challenge = self
            .challenges
            .get_mut(id)
            .ok_or_else(|| TcgError::ChallengeNotFound(id.to_string()))?;
        apply(&mut *challenge)?;
        Ok(challenge.clone())
    }

    /// Apply a terminal transition, drop the challenge and free its decks
    fn finish<F>(&self, store: &CardStore, id: &str, apply: F) -> TcgResult<Challenge>
    where
        F: FnOnce(&mut Challenge) -> TcgResult<()>,
    {
        let challenge = self.update(id, apply)?;
        self.challenges.remove(id);
        store.release_decks(id);
        Ok(challenge)
    }

    /// Opponent accepts with one of their full decks
    ///
    /// # Errors
    /// Returns an error if the member is not the opponent, the deck is not
    /// theirs or not full, or the challenge is not waiting for an answer
    pub fn accept(
        &self,
        store: &CardStore,
        id: &str,
        user_id: u64,
        deck_id: &str,
    ) -> TcgResult<Challenge> {
        self.update(id, |challenge| {
            if challenge.opponent.user_id != user_id {
                return Err(TcgError::NotAParticipant);
            }
            if challenge.state != ChallengeState::Challenged {
                return Err(TcgError::InvalidStateTransition {
                    from: challenge.state,
                    action: "accept",
                });
            }
            let deck = store.commit_deck(deck_id, user_id, &challenge.id)?;
            challenge.accept(deck.id)
        })
    }

    /// Either side backs out before the opponent accepted
    ///
    /// # Errors
    /// Returns an error for non-participants or answered challenges
    pub fn decline(&self, store: &CardStore, id: &str, user_id: u64) -> TcgResult<Challenge> {
        self.finish(store, id, |challenge| {
            if !challenge.involves(user_id) {
                return Err(TcgError::NotAParticipant);
            }
            challenge.decline()
        })
    }

    /// # Errors
    /// Returns an error for unknown ids or challenges not yet accepted
    pub fn begin_round(&self, id: &str) -> TcgResult<Challenge> {
        self.update(id, Challenge::begin_round)
    }

    /// # Errors
    /// Returns an error for unknown ids or challenges without a round
    pub fn resolve(&self, store: &CardStore, id: &str) -> TcgResult<Challenge> {
        self.finish(store, id, Challenge::resolve)
    }

    /// # Errors
    /// Returns an error for unknown ids
    pub fn expire(&self, store: &CardStore, id: &str) -> TcgResult<Challenge> {
        self.finish(store, id, Challenge::expire)
    }

    /// Expire every challenge whose deadline has passed
    pub fn expire_stale(&self, store: &CardStore, now: DateTime<Utc>) -> Vec<Challenge> {
        let stale: Vec<String> = self
            .challenges
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.expire(store, id).ok())
            .collect()
    }
}
