//! Error types for the trading card game
//!
//! Every variant maps onto a short notice that is shown to the member who
//! triggered it.

use thiserror::Error;

use crate::error::UserFacing;
use crate::tcg::{CardId, ChallengeState};

/// Errors that can occur in the card game
#[derive(Debug, Error)]
pub enum TcgError {
    /// Card id not present in the catalog
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    /// Card definition carries a value outside of the stat domain
    #[error("Card {card} has an out of range value: {value}")]
    InvalidStat { card: CardId, value: u16 },

    /// Die marker outside of 1-6
    #[error("Invalid die marker: {0}")]
    InvalidDieMarker(u8),

    /// Deck lookup failed
    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    /// Owner already has the maximum number of decks
    #[error("Deck limit reached ({0} decks)")]
    DeckLimitReached(usize),

    /// Owner already has a deck with this name
    #[error("Deck name already taken: {0}")]
    DeckNameTaken(String),

    /// Deck slot outside of 1-6
    #[error("Invalid deck slot: {0}")]
    InvalidSlot(usize),

    /// Deck is not complete
    #[error("Deck is not full: {0}")]
    DeckNotFull(String),

    /// Deck is in use by a live challenge
    #[error("Deck {0} is in use by a running challenge")]
    DeckCommitted(String),

    /// Deck has no cards to battle with
    #[error("Deck is empty")]
    EmptyDeck,

    /// Card is not in the member's collection
    #[error("Card not owned: {0}")]
    CardNotOwned(CardId),

    /// Deck would hold more copies than owned
    #[error("Not enough copies of card {card} (owned {owned})")]
    NotEnoughCopies { card: CardId, owned: u32 },

    /// Booster definition lookup failed
    #[error("Booster not found: {0}")]
    BoosterNotFound(String),

    /// No card can be drawn for this booster
    #[error("No cards available for booster: {0}")]
    EmptyPool(String),

    /// Member opened a booster too recently
    #[error("Booster on cooldown for {remaining_secs} more seconds")]
    BoosterCooldown { remaining_secs: i64 },

    /// Member tried to challenge themselves
    #[error("Cannot challenge yourself")]
    SelfChallenge,

    /// Member already takes part in a challenge
    #[error("User {0} already has a pending challenge")]
    AlreadyInChallenge(u64),

    /// Member owns no complete deck
    #[error("User {0} has no full deck")]
    NoFullDeck(u64),

    /// Challenge lookup failed
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    /// Member is not part of this challenge or battle
    #[error("Not a participant")]
    NotAParticipant,

    /// Challenge state machine rejected the move
    #[error("Cannot {action} a challenge in state {from}")]
    InvalidStateTransition {
        from: ChallengeState,
        action: &'static str,
    },

    /// Picked card is not among the round's options
    #[error("Card {0} is not eligible this round")]
    CardNotEligible(CardId),

    /// Member already locked in a card
    #[error("Card already picked")]
    AlreadyPicked,

    /// Resolution requested before both picks
    #[error("Both players must pick a card first")]
    PicksIncomplete,

    /// Delivering a notice failed
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Catalog data could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for TcgError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Result type for card game operations
pub type TcgResult<T> = Result<T, TcgError>;

impl UserFacing for TcgError {
    fn title(&self) -> String {
        match self {
            Self::CardNotFound(_) | Self::CardNotOwned(_) | Self::NotEnoughCopies { .. } => {
                "Card unavailable"
            }
            Self::DeckNotFound(_)
            | Self::DeckLimitReached(_)
            | Self::DeckNameTaken(_)
            | Self::InvalidSlot(_)
            | Self::DeckNotFull(_)
            | Self::DeckCommitted(_)
            | Self::EmptyDeck => "Deck problem",
            Self::BoosterNotFound(_) | Self::EmptyPool(_) | Self::BoosterCooldown { .. } => {
                "Booster unavailable"
            }
            Self::SelfChallenge
            | Self::AlreadyInChallenge(_)
            | Self::NoFullDeck(_)
            | Self::ChallengeNotFound(_)
            | Self::NotAParticipant
            | Self::InvalidStateTransition { .. } => "Challenge failed",
            Self::CardNotEligible(_) | Self::AlreadyPicked | Self::PicksIncomplete => {
                "Invalid pick"
            }
            Self::InvalidStat { .. }
            | Self::InvalidDieMarker(_)
            | Self::Notification(_)
            | Self::Catalog(_)
            | Self::DiscordApi(_) => "Something went wrong",
        }
        .to_string()
    }

    fn message(&self) -> String {
        match self {
            Self::NoFullDeck(user_id) => format!("<@{user_id}> does not have a full deck."),
            Self::AlreadyInChallenge(user_id) => {
                format!("<@{user_id}> is already part of a challenge.")
            }
            Self::BoosterCooldown { remaining_secs } => {
                let hours = remaining_secs / 3600;
                let minutes = (remaining_secs % 3600) / 60;
                format!("You can open your next booster in {hours}h {minutes}m.")
            }
            other => format!("{other}."),
        }
    }

    fn remedy(&self) -> Option<String> {
        match self {
            Self::NoFullDeck(_) | Self::DeckNotFull(_) => Some(
                "Fill all six slots with `/deck set` before battling.".to_string(),
            ),
            Self::DeckLimitReached(_) => {
                Some("Delete an old deck with `/deck delete` first.".to_string())
            }
            Self::CardNotOwned(_) | Self::NotEnoughCopies { .. } => {
                Some("Check your cards with `/cards collection`.".to_string())
            }
            Self::BoosterNotFound(_) => {
                Some("See the available packs with `/cards boosters`.".to_string())
            }
            Self::AlreadyInChallenge(_) => {
                Some("Finish or wait out the current challenge.".to_string())
            }
            Self::InvalidSlot(_) => Some("Slots are numbered 1 to 6.".to_string()),
            Self::DeckCommitted(_) => {
                Some("Edit it once the battle is over, or use another deck.".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TcgError::CardNotFound(CardId(42));
        assert_eq!(error.to_string(), "Card not found: 42");

        let error = TcgError::InvalidStateTransition {
            from: ChallengeState::Resolved,
            action: "accept",
        };
        assert_eq!(error.to_string(), "Cannot accept a challenge in state Resolved");
    }

    #[test]
    fn test_user_facing_notice() {
        let error = TcgError::NoFullDeck(1234);
        assert_eq!(error.title(), "Challenge failed");
        assert_eq!(error.message(), "<@1234> does not have a full deck.");
        assert!(error.remedy().unwrap().contains("/deck set"));

        let error = TcgError::BoosterCooldown {
            remaining_secs: 3 * 3600 + 25 * 60,
        };
        assert_eq!(error.message(), "You can open your next booster in 3h 25m.");
        assert!(TcgError::PicksIncomplete.remedy().is_none());
    }
}
