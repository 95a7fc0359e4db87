//! Booster packs and weighted rarity draws

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::tcg::{Card, Rarity, TcgError, TcgResult};

/// Relative chance of drawing a rarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarityWeight {
    pub rarity: Rarity,
    pub weight: u32,
}

/// A booster definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterPack {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Restrict draws to one series
    #[serde(default)]
    pub series: Option<String>,
    pub size: usize,
    pub weights: Vec<RarityWeight>,
}

impl BoosterPack {
    /// The pack offered when no booster file exists
    #[must_use]
    pub fn standard() -> Self {
        let weights = [
            (Rarity::Common, 60),
            (Rarity::Uncommon, 25),
            (Rarity::Rare, 10),
            (Rarity::Epic, 4),
            (Rarity::Legendary, 1),
        ]
        .into_iter()
        .map(|(rarity, weight)| RarityWeight { rarity, weight })
        .collect();

        Self {
            name: "Standard".to_string(),
            description: Some("Five cards from any series".to_string()),
            series: None,
            size: 5,
            weights,
        }
    }

    fn admits(&self, card: &Card) -> bool {
        self.series
            .as_deref()
            .is_none_or(|series| card.series.eq_ignore_ascii_case(series))
    }
}

/// Draw a booster from a card pool
///
/// Each slot first picks a rarity by weight, then a card of that rarity
/// uniformly. Rarities with no card in the pool are left out of the draw.
///
/// # Errors
/// Returns `TcgError::EmptyPool` if no weighted rarity has a card
pub fn draw<R: Rng>(pack: &BoosterPack, pool: &[Card], rng: &mut R) -> TcgResult<Vec<Card>> {
    let buckets: Vec<(u32, Vec<&Card>)> = pack
        .weights
        .iter()
        .filter(|weight| weight.weight > 0)
        .filter_map(|weight| {
            let cards: Vec<&Card> = pool
                .iter()
                .filter(|card| card.rarity == weight.rarity && pack.admits(card))
                .collect();
            (!cards.is_empty()).then_some((weight.weight, cards))
        })
        .collect();

    if buckets.is_empty() {
        return Err(TcgError::EmptyPool(pack.name.clone()));
    }

    let rarity_index = WeightedIndex::new(buckets.iter().map(|(weight, _)| *weight))
        .map_err(|e| TcgError::Catalog(format!("Invalid weights for {}: {e}", pack.name)))?;

    let drawn = (0..pack.size)
        .map(|_| {
            let (_, cards) = &buckets[rarity_index.sample(rng)];
            cards[rng.random_range(0..cards.len())].clone()
        })
        .collect();

    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::fixtures::card;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn with_rarity(id: u64, rarity: Rarity, series: &str) -> Card {
        let mut card = card(id, 1, 0, [1, 1, 1]);
        card.rarity = rarity;
        card.series = series.to_string();
        card
    }

    fn pack(weights: &[(Rarity, u32)], size: usize) -> BoosterPack {
        BoosterPack {
            name: "Test".to_string(),
            description: None,
            series: None,
            size,
            weights: weights
                .iter()
                .map(|(rarity, weight)| RarityWeight {
                    rarity: *rarity,
                    weight: *weight,
                })
                .collect(),
        }
    }

    #[test]
    fn test_draw_size() {
        let pool = vec![with_rarity(1, Rarity::Common, "A")];
        let mut rng = StdRng::seed_from_u64(7);
        let drawn = draw(&BoosterPack::standard(), &pool, &mut rng).unwrap();
        assert_eq!(drawn.len(), 5);
        assert!(drawn.iter().all(|card| card.id.0 == 1));
    }

    #[test]
    fn test_weighted_ratio_converges() {
        let pool = vec![
            with_rarity(1, Rarity::Common, "A"),
            with_rarity(2, Rarity::Common, "A"),
            with_rarity(3, Rarity::Rare, "A"),
        ];
        let pack = pack(&[(Rarity::Common, 70), (Rarity::Rare, 30)], 20_000);
        let mut rng = StdRng::seed_from_u64(1234);

        let drawn = draw(&pack, &pool, &mut rng).unwrap();
        let commons = drawn
            .iter()
            .filter(|card| card.rarity == Rarity::Common)
            .count();
        let ratio = commons as f64 / drawn.len() as f64;
        assert!((0.68..=0.72).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn test_missing_rarities_are_skipped() {
        let pool = vec![with_rarity(1, Rarity::Rare, "A")];
        let pack = pack(&[(Rarity::Common, 99), (Rarity::Rare, 1)], 50);
        let mut rng = StdRng::seed_from_u64(3);
        let drawn = draw(&pack, &pool, &mut rng).unwrap();
        assert!(drawn.iter().all(|card| card.rarity == Rarity::Rare));
    }

    #[test]
    fn test_series_restriction() {
        let pool = vec![
            with_rarity(1, Rarity::Common, "Founders"),
            with_rarity(2, Rarity::Common, "Summer"),
        ];
        let mut pack = pack(&[(Rarity::Common, 1)], 40);
        pack.series = Some("summer".to_string());
        let mut rng = StdRng::seed_from_u64(11);
        let drawn = draw(&pack, &pool, &mut rng).unwrap();
        assert!(drawn.iter().all(|card| card.id.0 == 2));
    }

    #[test]
    fn test_empty_pool() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = draw(&BoosterPack::standard(), &[], &mut rng);
        assert!(matches!(result, Err(TcgError::EmptyPool(name)) if name == "Standard"));

        let pool = vec![with_rarity(1, Rarity::Common, "A")];
        let zero = pack(&[(Rarity::Common, 0)], 1);
        assert!(matches!(draw(&zero, &pool, &mut rng), Err(TcgError::EmptyPool(_))));
    }

    #[test]
    fn test_booster_yaml() {
        let yaml = r"
- name: Founders Pack
  series: Founders
  size: 3
  weights:
    - { rarity: Common, weight: 70 }
    - { rarity: Rare, weight: 30 }
";
        let packs: Vec<BoosterPack> = serde_yaml::from_str(yaml).expect("Failed to deserialize");
        assert_eq!(packs[0].size, 3);
        assert_eq!(packs[0].series.as_deref(), Some("Founders"));
        assert_eq!(packs[0].weights[1].rarity, Rarity::Rare);
    }
}
