//! Card catalog types
//!
//! Cards are immutable once loaded. A series file groups the cards of one
//! set and is the unit the catalog is loaded in.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tcg::{TcgError, TcgResult};

/// Upper bound for stats, disqualifier values and stat rolls
pub const STAT_MAX: u16 = 999;

/// Catalog id of a card
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct CardId(pub u64);

/// Card rarity, used by booster weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Self; 5] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
    ];

    /// Embed colour for this rarity
    #[must_use]
    pub const fn colour(self) -> u32 {
        match self {
            Self::Common => 0x9E_9E_9E,
            Self::Uncommon => 0x4C_AF_50,
            Self::Rare => 0x21_96_F3,
            Self::Epic => 0x9C_27_B0,
            Self::Legendary => 0xFF_C1_07,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common => write!(f, "Common"),
            Self::Uncommon => write!(f, "Uncommon"),
            Self::Rare => write!(f, "Rare"),
            Self::Epic => write!(f, "Epic"),
            Self::Legendary => write!(f, "Legendary"),
        }
    }
}

/// The three stats compared in a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Battle,
    Nsfw,
    Sfw,
}

impl Stat {
    /// Order in which stats are played
    pub const ORDER: [Self; 3] = [Self::Battle, Self::Nsfw, Self::Sfw];
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Battle => write!(f, "Battle"),
            Self::Nsfw => write!(f, "NSFW"),
            Self::Sfw => write!(f, "SFW"),
        }
    }
}

/// Die face a card is bucketed under (1-6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DieMarker(u8);

impl DieMarker {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    /// Create a marker, rejecting values outside of 1-6
    ///
    /// # Errors
    /// Returns `TcgError::InvalidDieMarker` for out of range values
    pub fn new(value: u8) -> TcgResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TcgError::InvalidDieMarker(value))
        }
    }

    /// Create a marker, clamping into 1-6
    #[must_use]
    pub fn clamped(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn distance(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<u8> for DieMarker {
    type Error = TcgError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DieMarker> for u8 {
    fn from(marker: DieMarker) -> Self {
        marker.0
    }
}

impl fmt::Display for DieMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comparable stats of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStats {
    pub battle: u16,
    pub nsfw: u16,
    pub sfw: u16,
}

/// A catalog card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    /// Filled in from the series file the card was loaded from
    #[serde(default)]
    pub series: String,
    pub rarity: Rarity,
    pub stats: CardStats,
    /// A stat roll equal to this value disqualifies the card
    pub bad: u16,
    pub marker: DieMarker,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Card {
    #[must_use]
    pub const fn stat(&self, stat: Stat) -> u16 {
        match stat {
            Stat::Battle => self.stats.battle,
            Stat::Nsfw => self.stats.nsfw,
            Stat::Sfw => self.stats.sfw,
        }
    }

    /// Distance between a stat and a roll
    #[must_use]
    pub const fn distance(&self, stat: Stat, roll: u16) -> u16 {
        self.stat(stat).abs_diff(roll)
    }

    #[must_use]
    pub const fn is_disqualified(&self, roll: u16) -> bool {
        self.bad == roll
    }

    /// Check that every value is inside the stat domain
    ///
    /// # Errors
    /// Returns `TcgError::InvalidStat` naming the first offending value
    pub fn validate(&self) -> TcgResult<()> {
        let values = [
            self.stats.battle,
            self.stats.nsfw,
            self.stats.sfw,
            self.bad,
        ];
        match values.into_iter().find(|value| *value > STAT_MAX) {
            Some(value) => Err(TcgError::InvalidStat {
                card: self.id,
                value,
            }),
            None => Ok(()),
        }
    }
}

/// A set of cards loaded from one catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cards: Vec<Card>,
}

impl Series {
    /// Stamp the series name onto each card and validate it
    ///
    /// # Errors
    /// Returns the first validation error
    pub fn into_cards(self) -> TcgResult<Vec<Card>> {
        let name = self.name;
        self.cards
            .into_iter()
            .map(|mut card| {
                card.series.clone_from(&name);
                card.validate()?;
                Ok(card)
            })
            .collect()
    }
}
