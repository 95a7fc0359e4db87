//! Trading card game
//!
//! Cards, collections, decks and boosters live in [`CardStore`]; challenges
//! move through [`ChallengeRegistry`]; a [`Battle`] plays one round.

mod battle;
mod booster;
mod card;
mod challenge;
mod deck;
mod error;
mod notify;
mod store;

pub use battle::*;
pub use booster::*;
pub use card::*;
pub use challenge::*;
pub use deck::*;
pub use error::*;
pub use notify::*;
pub use store::*;
