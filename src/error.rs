//! Notices shown to members when a command fails

use poise::serenity_prelude::{Colour, CreateEmbed};

use crate::config::ConfigError;
use crate::forms::FormError;
use crate::profile::ProfileError;
use crate::tcg::TcgError;
use crate::verification::VerificationError;

/// An error that can be explained to the member who caused it
pub trait UserFacing {
    /// Short embed title
    fn title(&self) -> String;

    /// One sentence describing what went wrong
    fn message(&self) -> String;

    /// What the member can do about it
    fn remedy(&self) -> Option<String> {
        None
    }
}

/// Build the ephemeral embed for a failure notice
#[must_use]
pub fn notice_embed(error: &dyn UserFacing) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(error.title())
        .description(error.message())
        .colour(Colour::RED);
    if let Some(remedy) = error.remedy() {
        embed = embed.field("What now?", remedy, false);
    }
    embed
}

/// Find the domain error behind a framework error, if there is one
#[must_use]
pub fn as_user_facing(error: &crate::Error) -> Option<&dyn UserFacing> {
    if let Some(e) = error.downcast_ref::<TcgError>() {
        return Some(e);
    }
    if let Some(e) = error.downcast_ref::<ProfileError>() {
        return Some(e);
    }
    if let Some(e) = error.downcast_ref::<FormError>() {
        return Some(e);
    }
    if let Some(e) = error.downcast_ref::<VerificationError>() {
        return Some(e);
    }
    error
        .downcast_ref::<ConfigError>()
        .map(|e| e as &dyn UserFacing)
}
