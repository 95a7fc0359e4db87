//! Card store
//!
//! Holds the catalog, booster definitions, member collections and decks.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::TCG_TARGET;
use crate::tcg::{
    BoosterPack, Card, CardId, Deck, MAX_DECKS_PER_USER, Rarity, Series, TcgError, TcgResult,
    booster,
};

/// Cards a member owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub user_id: u64,
    /// Card id -> number of copies
    pub cards: BTreeMap<CardId, u32>,
    pub last_booster_at: Option<DateTime<Utc>>,
}

impl Collection {
    #[must_use]
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn copies(&self, card: CardId) -> u32 {
        self.cards.get(&card).copied().unwrap_or_default()
    }

    /// Total number of cards including duplicates
    #[must_use]
    pub fn total(&self) -> u32 {
        self.cards.values().sum()
    }
}

/// Store for everything card related
#[derive(Clone, Default)]
pub struct CardStore {
    cards: Arc<DashMap<CardId, Card>>,
    /// Keyed by lowercase pack name
    boosters: Arc<DashMap<String, BoosterPack>>,
    collections: Arc<DashMap<u64, Collection>>,
    decks: Arc<DashMap<String, Deck>>,
    /// Deck id -> id of the live challenge holding it
    committed: Arc<DashMap<String, String>>,
    /// Serializes the limit and name checks in `create_deck`
    deck_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStore")
            .field("cards", &self.cards.len())
            .field("boosters", &self.boosters.len())
            .field("collections", &self.collections.len())
            .field("decks", &self.decks.len())
            .field("committed", &self.committed.len())
            .finish()
    }
}

impl CardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Catalog

    /// Add a card to the catalog, replacing any card with the same id
    ///
    /// # Errors
    /// Returns `TcgError::InvalidStat` if the card fails validation
    pub fn add_card(&self, card: Card) -> TcgResult<()> {
        card.validate()?;
        self.cards.insert(card.id, card);
        Ok(())
    }

    /// Add every card of a series
    ///
    /// # Errors
    /// Returns the first validation error; nothing is added in that case
    pub fn load_series(&self, series: Series) -> TcgResult<usize> {
        let name = series.name.clone();
        let cards = series.into_cards()?;
        let count = cards.len();
        for card in cards {
            self.cards.insert(card.id, card);
        }
        info!(target: TCG_TARGET, series = %name, cards = count, "Loaded card series");
        Ok(count)
    }

    /// Forget all cards and booster definitions before a reload
    pub fn clear_catalog(&self) {
        self.cards.clear();
        self.boosters.clear();
    }

    #[must_use]
    pub fn card(&self, id: CardId) -> Option<Card> {
        self.cards.get(&id).map(|entry| entry.value().clone())
    }

    /// All catalog cards ordered by id
    #[must_use]
    pub fn cards(&self) -> Vec<Card> {
        let mut cards: Vec<Card> = self.cards.iter().map(|e| e.value().clone()).collect();
        cards.sort_by_key(|card| card.id);
        cards
    }

    #[must_use]
    pub fn cards_in_series(&self, series: &str) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .cards
            .iter()
            .filter(|entry| entry.value().series.eq_ignore_ascii_case(series))
            .map(|entry| entry.value().clone())
            .collect();
        cards.sort_by_key(|card| card.id);
        cards
    }

    #[must_use]
    pub fn cards_of_rarity(&self, rarity: Rarity) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .cards
            .iter()
            .filter(|entry| entry.value().rarity == rarity)
            .map(|entry| entry.value().clone())
            .collect();
        cards.sort_by_key(|card| card.id);
        cards
    }

    #[must_use]
    pub fn series_names(&self) -> Vec<String> {
        self.cards
            .iter()
            .map(|entry| entry.value().series.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub fn catalog_size(&self) -> usize {
        self.cards.len()
    }

    // Boosters

    pub fn add_booster(&self, pack: BoosterPack) {
        self.boosters.insert(pack.name.to_lowercase(), pack);
    }

    #[must_use]
    pub fn booster(&self, name: &str) -> Option<BoosterPack> {
        self.boosters
            .get(&name.trim().to_lowercase())
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn boosters(&self) -> Vec<BoosterPack> {
        let mut packs: Vec<BoosterPack> =
            self.boosters.iter().map(|e| e.value().clone()).collect();
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        packs
    }

    /// Open a booster for a member and add the cards to their collection
    ///
    /// # Errors
    /// Returns an error if the pack is unknown, the member is on cooldown or
    /// the pack has nothing to draw from
    pub fn open_booster<R: Rng>(
        &self,
        user_id: u64,
        pack_name: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> TcgResult<Vec<Card>> {
        let pack = self
            .booster(pack_name)
            .ok_or_else(|| TcgError::BoosterNotFound(pack_name.to_string()))?;

        let pool = self.cards();

        // The entry stays locked from the cooldown check to the grant
        let mut collection = self
            .collections
            .entry(user_id)
            .or_insert_with(|| Collection::new(user_id));
        if let Some(last) = collection.last_booster_at {
            let ready_at = last + cooldown;
            if ready_at > now {
                return Err(TcgError::BoosterCooldown {
                    remaining_secs: (ready_at - now).num_seconds(),
                });
            }
        }

        let drawn = booster::draw(&pack, &pool, rng)?;
        for card in &drawn {
            *collection.cards.entry(card.id).or_default() += 1;
        }
        collection.last_booster_at = Some(now);
        drop(collection);

        info!(
            target: TCG_TARGET,
            user_id = %user_id,
            pack = %pack.name,
            cards = ?drawn.iter().map(|card| card.id.0).collect::<Vec<_>>(),
            "Booster opened"
        );

        Ok(drawn)
    }

    // Collections

    #[must_use]
    pub fn collection(&self, user_id: u64) -> Collection {
        self.collections
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Collection::new(user_id))
    }

    #[must_use]
    pub fn copies(&self, user_id: u64, card: CardId) -> u32 {
        self.collections
            .get(&user_id)
            .map(|entry| entry.copies(card))
            .unwrap_or_default()
    }

    /// Owned catalog cards with their copy counts, ordered by id
    #[must_use]
    pub fn owned(&self, user_id: u64) -> Vec<(Card, u32)> {
        self.collection(user_id)
            .cards
            .into_iter()
            .filter(|(_, copies)| *copies > 0)
            .filter_map(|(id, copies)| self.card(id).map(|card| (card, copies)))
            .collect()
    }

    /// Give a member copies of a card, returning their new copy count
    ///
    /// # Errors
    /// Returns `TcgError::CardNotFound` for unknown cards
    pub fn grant(&self, user_id: u64, card: CardId, count: u32) -> TcgResult<u32> {
        if !self.cards.contains_key(&card) {
            return Err(TcgError::CardNotFound(card));
        }
        let mut collection = self
            .collections
            .entry(user_id)
            .or_insert_with(|| Collection::new(user_id));
        let copies = collection.cards.entry(card).or_default();
        *copies = copies.saturating_add(count);
        Ok(*copies)
    }

    #[must_use]
    pub fn all_collections(&self) -> Vec<Collection> {
        self.collections.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_collection(&self, collection: Collection) {
        self.collections.insert(collection.user_id, collection);
    }

    // Decks

    /// Create an empty deck for a member
    ///
    /// # Errors
    /// Returns an error if the name is taken or the member has too many decks
    pub fn create_deck(&self, owner_id: u64, name: &str) -> TcgResult<Deck> {
        let name = name.trim();
        let _guard = self.deck_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = self.decks_for(owner_id);
        if existing.iter().any(|deck| deck.matches_name(name)) {
            return Err(TcgError::DeckNameTaken(name.to_string()));
        }
        if existing.len() >= MAX_DECKS_PER_USER {
            return Err(TcgError::DeckLimitReached(MAX_DECKS_PER_USER));
        }

        let deck = Deck::new(owner_id, name);
        self.decks.insert(deck.id.clone(), deck.clone());
        Ok(deck)
    }

    #[must_use]
    pub fn deck(&self, id: &str) -> Option<Deck> {
        self.decks.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn find_deck(&self, owner_id: u64, name: &str) -> Option<Deck> {
        self.decks
            .iter()
            .find(|entry| entry.owner_id == owner_id && entry.matches_name(name))
            .map(|entry| entry.value().clone())
    }

    /// Decks of a member, oldest first
    #[must_use]
    pub fn decks_for(&self, owner_id: u64) -> Vec<Deck> {
        let mut decks: Vec<Deck> = self
            .decks
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        decks.sort_by_key(|deck| deck.created_at);
        decks
    }

    #[must_use]
    pub fn full_decks_for(&self, owner_id: u64) -> Vec<Deck> {
        self.decks_for(owner_id)
            .into_iter()
            .filter(Deck::is_full)
            .collect()
    }

    #[must_use]
    pub fn has_full_deck(&self, owner_id: u64) -> bool {
        self.decks
            .iter()
            .any(|entry| entry.owner_id == owner_id && entry.is_full())
    }

    fn owned_deck_id(&self, owner_id: u64, name: &str) -> TcgResult<String> {
        self.find_deck(owner_id, name)
            .map(|deck| deck.id)
            .ok_or_else(|| TcgError::DeckNotFound(name.to_string()))
    }

    /// Place a card into a deck slot
    ///
    /// The deck may never hold more copies of a card than the owner has.
    ///
    /// # Errors
    /// Returns an error if the deck, slot or card is invalid or not owned
    pub fn set_slot(&self, owner_id: u64, deck_name: &str, slot: usize, card: CardId) -> TcgResult<Deck> {
        if !self.cards.contains_key(&card) {
            return Err(TcgError::CardNotFound(card));
        }
        let owned = self.copies(owner_id, card);
        if owned == 0 {
            return Err(TcgError::CardNotOwned(card));
        }

        let deck_id = self.owned_deck_id(owner_id, deck_name)?;
        let mut deck = self
            .decks
            .get_mut(&deck_id)
            .ok_or_else(|| TcgError::DeckNotFound(deck_name.to_string()))?;
        self.ensure_uncommitted(&deck)?;

        let replacing_same = deck.slot(slot)? == Some(card);
        let used = deck.count_of(card) - usize::from(replacing_same);
        if used >= owned as usize {
            return Err(TcgError::NotEnoughCopies { card, owned });
        }

        deck.set_slot(slot, card)?;
        Ok(deck.clone())
    }

    /// Empty a deck slot
    ///
    /// # Errors
    /// Returns an error if the deck or slot is invalid
    pub fn clear_slot(&self, owner_id: u64, deck_name: &str, slot: usize) -> TcgResult<Deck> {
        let deck_id = self.owned_deck_id(owner_id, deck_name)?;
        let mut deck = self
            .decks
            .get_mut(&deck_id)
            .ok_or_else(|| TcgError::DeckNotFound(deck_name.to_string()))?;
        self.ensure_uncommitted(&deck)?;
        deck.clear_slot(slot)?;
        Ok(deck.clone())
    }

    /// Delete a member's deck
    ///
    /// # Errors
    /// Returns `TcgError::DeckNotFound` if the member has no such deck and
    /// `TcgError::DeckCommitted` while a live challenge holds it
    pub fn delete_deck(&self, owner_id: u64, name: &str) -> TcgResult<Deck> {
        let deck_id = self.owned_deck_id(owner_id, name)?;
        match self
            .decks
            .remove_if(&deck_id, |id, _| !self.committed.contains_key(id))
        {
            Some((_, deck)) => Ok(deck),
            None => match self.deck(&deck_id) {
                Some(deck) => Err(TcgError::DeckCommitted(deck.name)),
                None => Err(TcgError::DeckNotFound(name.to_string())),
            },
        }
    }

    fn ensure_uncommitted(&self, deck: &Deck) -> TcgResult<()> {
        if self.committed.contains_key(&deck.id) {
            return Err(TcgError::DeckCommitted(deck.name.clone()));
        }
        Ok(())
    }

    /// Reserve a full deck for a challenge
    ///
    /// Until [`CardStore::release_decks`] runs, the deck can be neither
    /// edited nor deleted.
    ///
    /// # Errors
    /// Returns `TcgError::DeckNotFound` if the member owns no such deck and
    /// `TcgError::DeckNotFull` if a slot is empty
    pub fn commit_deck(&self, deck_id: &str, owner_id: u64, challenge_id: &str) -> TcgResult<Deck> {
        // Holding the entry keeps edits out until the commitment is recorded
        let deck = self
            .decks
            .get(deck_id)
            .filter(|deck| deck.owner_id == owner_id)
            .ok_or_else(|| TcgError::DeckNotFound(deck_id.to_string()))?;
        if !deck.is_full() {
            return Err(TcgError::DeckNotFull(deck.name.clone()));
        }
        self.committed
            .insert(deck_id.to_string(), challenge_id.to_string());
        info!(
            target: TCG_TARGET,
            deck_id = %deck_id,
            challenge_id = %challenge_id,
            "Deck committed"
        );
        Ok(deck.value().clone())
    }

    /// Free every deck held by a challenge
    pub fn release_decks(&self, challenge_id: &str) {
        self.committed.retain(|_, holder| holder != challenge_id);
    }

    /// The challenge holding a deck, if any
    #[must_use]
    pub fn committed_to(&self, deck_id: &str) -> Option<String> {
        self.committed.get(deck_id).map(|entry| entry.value().clone())
    }

    /// Catalog cards held by a deck, in slot order
    ///
    /// # Errors
    /// Returns an error if the deck is unknown or references a missing card
    pub fn resolve_deck(&self, deck_id: &str) -> TcgResult<Vec<Card>> {
        let deck = self
            .deck(deck_id)
            .ok_or_else(|| TcgError::DeckNotFound(deck_id.to_string()))?;
        deck.card_ids()
            .map(|id| self.card(id).ok_or(TcgError::CardNotFound(id)))
            .collect()
    }

    #[must_use]
    pub fn all_decks(&self) -> Vec<Deck> {
        self.decks.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_deck(&self, deck: Deck) {
        self.decks.insert(deck.id.clone(), deck);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::fixtures::{card, full_store};
    use crate::tcg::{DECK_SIZE, Rarity, RarityWeight};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn store_with_cards(count: u64) -> CardStore {
        let store = CardStore::new();
        for id in 1..=count {
            store.add_card(card(id, 1, 0, [1, 1, 1])).unwrap();
        }
        store
    }

    #[test]
    fn test_add_card_validates() {
        let store = CardStore::new();
        let mut bad = card(1, 1, 0, [1, 1, 1]);
        bad.bad = 5000;
        assert!(store.add_card(bad).is_err());
        assert_eq!(store.catalog_size(), 0);
    }

    #[test]
    fn test_grant_and_copies() {
        let store = store_with_cards(2);
        assert_eq!(store.grant(10, CardId(1), 2).unwrap(), 2);
        assert_eq!(store.grant(10, CardId(1), 1).unwrap(), 3);
        assert_eq!(store.copies(10, CardId(1)), 3);
        assert_eq!(store.copies(10, CardId(2)), 0);
        assert!(matches!(
            store.grant(10, CardId(99), 1),
            Err(TcgError::CardNotFound(CardId(99)))
        ));
        assert_eq!(store.collection(10).total(), 3);
    }

    #[test]
    fn test_owned_and_rarity_lookup() {
        let store = store_with_cards(3);
        let mut rare = card(4, 2, 0, [1, 1, 1]);
        rare.rarity = Rarity::Rare;
        store.add_card(rare).unwrap();

        assert_eq!(store.cards_of_rarity(Rarity::Rare).len(), 1);
        assert_eq!(store.cards_of_rarity(Rarity::Common).len(), 3);
        assert!(store.cards_of_rarity(Rarity::Legendary).is_empty());

        store.grant(7, CardId(4), 2).unwrap();
        store.grant(7, CardId(1), 1).unwrap();
        let owned: Vec<(u64, u32)> = store
            .owned(7)
            .into_iter()
            .map(|(card, copies)| (card.id.0, copies))
            .collect();
        assert_eq!(owned, vec![(1, 1), (4, 2)]);
        assert!(store.owned(8).is_empty());
    }

    #[test]
    fn test_deck_limits() {
        let store = CardStore::new();
        store.create_deck(1, "One").unwrap();
        assert!(matches!(
            store.create_deck(1, " one "),
            Err(TcgError::DeckNameTaken(_))
        ));
        store.create_deck(1, "Two").unwrap();
        store.create_deck(1, "Three").unwrap();
        assert!(matches!(
            store.create_deck(1, "Four"),
            Err(TcgError::DeckLimitReached(MAX_DECKS_PER_USER))
        ));
        // Other members are unaffected
        assert!(store.create_deck(2, "One").is_ok());
    }

    #[test]
    fn test_set_slot_respects_ownership() {
        let store = store_with_cards(3);
        store.create_deck(5, "Main").unwrap();

        assert!(matches!(
            store.set_slot(5, "Main", 1, CardId(1)),
            Err(TcgError::CardNotOwned(CardId(1)))
        ));

        store.grant(5, CardId(1), 2).unwrap();
        store.set_slot(5, "Main", 1, CardId(1)).unwrap();
        store.set_slot(5, "Main", 2, CardId(1)).unwrap();
        assert!(matches!(
            store.set_slot(5, "Main", 3, CardId(1)),
            Err(TcgError::NotEnoughCopies { owned: 2, .. })
        ));
        // Re-placing a card on its own slot does not need another copy
        assert!(store.set_slot(5, "Main", 2, CardId(1)).is_ok());

        assert!(matches!(
            store.set_slot(5, "Missing", 1, CardId(1)),
            Err(TcgError::DeckNotFound(_))
        ));
        assert!(matches!(
            store.set_slot(6, "Main", 1, CardId(1)),
            Err(TcgError::CardNotOwned(_))
        ));
    }

    #[test]
    fn test_full_decks_and_resolve() {
        let store = full_store(&[1, 2]);
        assert!(store.has_full_deck(1));
        assert!(store.has_full_deck(2));
        assert!(!store.has_full_deck(3));

        let deck = store.full_decks_for(1).remove(0);
        let cards = store.resolve_deck(&deck.id).unwrap();
        assert_eq!(cards.len(), DECK_SIZE);

        let cleared = store.clear_slot(1, &deck.name, 4).unwrap();
        assert!(!cleared.is_full());
        assert!(store.full_decks_for(1).is_empty());
    }

    #[test]
    fn test_delete_deck() {
        let store = CardStore::new();
        store.create_deck(1, "Main").unwrap();
        assert!(store.delete_deck(2, "Main").is_err());
        assert_eq!(store.delete_deck(1, "main").unwrap().name, "Main");
        assert!(store.decks_for(1).is_empty());
    }

    #[test]
    fn test_open_booster_and_cooldown() {
        let store = store_with_cards(4);
        store.add_booster(BoosterPack {
            name: "Daily".to_string(),
            description: None,
            series: None,
            size: 3,
            weights: vec![RarityWeight {
                rarity: Rarity::Common,
                weight: 1,
            }],
        });
        let mut rng = StdRng::seed_from_u64(5);
        let now = Utc::now();
        let cooldown = Duration::hours(24);

        let drawn = store.open_booster(9, "daily", cooldown, now, &mut rng).unwrap();
        assert_eq!(drawn.len(), 3);
        assert_eq!(store.collection(9).total(), 3);

        let later = now + Duration::hours(23);
        assert!(matches!(
            store.open_booster(9, "Daily", cooldown, later, &mut rng),
            Err(TcgError::BoosterCooldown { remaining_secs: 3600 })
        ));

        let tomorrow = now + Duration::hours(24);
        assert!(store.open_booster(9, "Daily", cooldown, tomorrow, &mut rng).is_ok());
        assert_eq!(store.collection(9).total(), 6);

        assert!(matches!(
            store.open_booster(9, "Nope", cooldown, tomorrow, &mut rng),
            Err(TcgError::BoosterNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_opens_share_one_cooldown() {
        let store = store_with_cards(4);
        store.add_booster(BoosterPack {
            name: "Daily".to_string(),
            description: None,
            series: None,
            size: 5,
            weights: vec![RarityWeight {
                rarity: Rarity::Common,
                weight: 1,
            }],
        });
        let now = Utc::now();
        let barrier = std::sync::Barrier::new(8);

        let opened = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u64)
                .map(|seed| {
                    let (store, barrier) = (&store, &barrier);
                    scope.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(seed);
                        barrier.wait();
                        store
                            .open_booster(9, "Daily", Duration::hours(24), now, &mut rng)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(opened, 1);
        assert_eq!(store.collection(9).total(), 5);
    }

    #[test]
    fn test_delete_committed_deck() {
        let store = full_store(&[1]);
        let deck = store.find_deck(1, "Main").unwrap();
        store.commit_deck(&deck.id, 1, "c1").unwrap();
        assert!(matches!(
            store.delete_deck(1, "Main"),
            Err(TcgError::DeckCommitted(_))
        ));
        assert!(matches!(
            store.commit_deck(&deck.id, 2, "c2"),
            Err(TcgError::DeckNotFound(_))
        ));

        store.release_decks("c1");
        assert!(store.committed_to(&deck.id).is_none());
        assert_eq!(store.delete_deck(1, "Main").unwrap().id, deck.id);
    }

    #[test]
    fn test_collection_yaml() {
        let mut collection = Collection::new(77);
        collection.cards.insert(CardId(3), 2);
        let yaml = serde_yaml::to_string(&collection).expect("Failed to serialize");
        assert!(yaml.contains("user_id: 77"));
        let back: Collection = serde_yaml::from_str(&yaml).expect("Failed to deserialize");
        assert_eq!(back.copies(CardId(3)), 2);
    }
}
