//! Challenge notices with a channel fallback

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, CreateMessage, Http, UserId};
use std::sync::Arc;
use tracing::warn;

use crate::TCG_TARGET;
use crate::tcg::{Challenge, TcgError, TcgResult};

/// Delivers challenge notices to members
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChallengeNotifier: Send + Sync {
    /// Send a direct message
    async fn direct(&self, user_id: u64, content: String) -> TcgResult<()>;

    /// Post into a channel or thread
    async fn in_channel(&self, channel_id: u64, content: String) -> TcgResult<()>;
}

/// Where a notice ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeDelivery {
    Direct,
    InChannel,
}

/// Tell the opponent about a challenge
///
/// Members with closed DMs get a mention in the challenge thread instead.
///
/// # Errors
/// Returns an error only if the channel fallback fails too
pub async fn notify_opponent(
    notifier: &dyn ChallengeNotifier,
    challenge: &Challenge,
    content: &str,
) -> TcgResult<NoticeDelivery> {
    let opponent_id = challenge.opponent.user_id;
    match notifier.direct(opponent_id, content.to_string()).await {
        Ok(()) => Ok(NoticeDelivery::Direct),
        Err(e) => {
            warn!(
                target: TCG_TARGET,
                challenge_id = %challenge.id,
                opponent_id = %opponent_id,
                error = %e,
                "Direct message failed, falling back to channel"
            );
            notifier
                .in_channel(
                    challenge.discussion_channel(),
                    format!("<@{opponent_id}> {content}"),
                )
                .await?;
            Ok(NoticeDelivery::InChannel)
        }
    }
}

/// Notifier backed by the Discord HTTP client
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChallengeNotifier for DiscordNotifier {
    async fn direct(&self, user_id: u64, content: String) -> TcgResult<()> {
        UserId::new(user_id)
            .direct_message(self.http.as_ref(), CreateMessage::new().content(content))
            .await
            .map_err(|e| TcgError::Notification(e.to_string()))?;
        Ok(())
    }

    async fn in_channel(&self, channel_id: u64, content: String) -> TcgResult<()> {
        ChannelId::new(channel_id)
            .say(self.http.as_ref(), content)
            .await?;
        Ok(())
    }
}
