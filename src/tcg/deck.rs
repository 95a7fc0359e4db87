//! Decks and per-round card eligibility

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tcg::{Card, CardId, DieMarker, TcgError, TcgResult};

/// Number of slots in a deck
pub const DECK_SIZE: usize = 6;
/// Maximum number of decks a member may keep
pub const MAX_DECKS_PER_USER: usize = 3;

/// A named selection of up to six cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub owner_id: u64,
    pub name: String,
    pub slots: [Option<CardId>; DECK_SIZE],
    pub created_at: DateTime<Utc>,
}

impl Deck {
    /// Create an empty deck
    pub fn new(owner_id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            name: name.into(),
            slots: [None; DECK_SIZE],
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Number of occupied slots
    #[must_use]
    pub fn filled(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn card_ids(&self) -> impl Iterator<Item = CardId> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// How many slots hold this card
    #[must_use]
    pub fn count_of(&self, card: CardId) -> usize {
        self.card_ids().filter(|id| *id == card).count()
    }

    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// Slot numbers are 1-6
    fn index(slot: usize) -> TcgResult<usize> {
        if (1..=DECK_SIZE).contains(&slot) {
            Ok(slot - 1)
        } else {
            Err(TcgError::InvalidSlot(slot))
        }
    }

    /// Current occupant of a slot
    ///
    /// # Errors
    /// Returns `TcgError::InvalidSlot` for slots outside of 1-6
    pub fn slot(&self, slot: usize) -> TcgResult<Option<CardId>> {
        Ok(self.slots[Self::index(slot)?])
    }

    /// Put a card into a slot, returning the card it replaced
    ///
    /// # Errors
    /// Returns `TcgError::InvalidSlot` for slots outside of 1-6
    pub fn set_slot(&mut self, slot: usize, card: CardId) -> TcgResult<Option<CardId>> {
        let index = Self::index(slot)?;
        Ok(self.slots[index].replace(card))
    }

    /// Empty a slot, returning the card it held
    ///
    /// # Errors
    /// Returns `TcgError::InvalidSlot` for slots outside of 1-6
    pub fn clear_slot(&mut self, slot: usize) -> TcgResult<Option<CardId>> {
        let index = Self::index(slot)?;
        Ok(self.slots[index].take())
    }
}

/// Cards of a deck that are eligible for a die roll
///
/// Exact marker matches win. Otherwise the tolerance widens one step at a
/// time until something matches. Five steps cover every marker, so a
/// non-empty deck always yields at least one card.
#[must_use]
pub fn get_matching_cards(cards: &[Card], roll: DieMarker) -> Vec<&Card> {
    let widest = DieMarker::MAX - DieMarker::MIN;
    for tolerance in 0..=widest {
        let matches: Vec<&Card> = cards
            .iter()
            .filter(|card| card.marker.distance(roll) <= tolerance)
            .collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}
