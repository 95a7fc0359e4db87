pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod logging;
pub mod profile;
pub mod sweeper;
pub mod tcg;
pub mod verification;

pub const BOT_NAME: &str = "rent_a_ra";
pub const COMMAND_TARGET: &str = "rent_a_ra::command";
pub const ERROR_TARGET: &str = "rent_a_ra::error";
pub const EVENT_TARGET: &str = "rent_a_ra::handlers";
pub const BATTLE_TARGET: &str = "rent_a_ra::battle";
pub const TCG_TARGET: &str = "rent_a_ra::tcg";
pub const CONSOLE_TARGET: &str = "rent_a_ra";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
