use poise::serenity_prelude::{
    self as serenity, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage, EventHandler, GuildId, Interaction, Permissions, Ready,
    RoleId, UserId,
};
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::error::{as_user_facing, notice_embed};
use crate::logging::log_interaction;
use crate::tcg::{ChallengeNotifier, DiscordNotifier};
use crate::verification::{VerificationError, VerificationState};
use crate::{Data, EVENT_TARGET, Error};

/// A moderator's answer to a review message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    ApproveVerification(String),
    DenyVerification(String),
    AcceptSubmission(String),
    RejectSubmission(String),
}

impl ReviewAction {
    /// Parse `<kind>:<verb>:<id>` button ids
    ///
    /// Challenge and battle components are handled by collectors and come
    /// back as `None`.
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.splitn(3, ':');
        let (kind, verb, id) = (parts.next()?, parts.next()?, parts.next()?);
        if id.is_empty() {
            return None;
        }
        let id = id.to_string();
        match (kind, verb) {
            ("verify", "approve") => Some(Self::ApproveVerification(id)),
            ("verify", "deny") => Some(Self::DenyVerification(id)),
            ("form", "accept") => Some(Self::AcceptSubmission(id)),
            ("form", "reject") => Some(Self::RejectSubmission(id)),
            _ => None,
        }
    }
}

/// Members allowed to press review buttons
fn can_review(permissions: Option<Permissions>) -> bool {
    permissions.is_some_and(|p| p.administrator() || p.manage_roles() || p.manage_guild())
}

pub struct Handler {
    pub data: Data,
}

impl Handler {
    #[must_use]
    pub const fn new(data: Data) -> Self {
        Self { data }
    }

    /// Apply a review and return the text that replaces the review message
    async fn review(
        &self,
        ctx: &Context,
        reviewer: u64,
        action: ReviewAction,
    ) -> Result<String, Error> {
        let notifier = DiscordNotifier::new(ctx.http.clone());

        let (member_id, summary, notice) = match action {
            ReviewAction::ApproveVerification(id) => {
                let request = self
                    .data
                    .verifications
                    .get(&id)
                    .ok_or_else(|| VerificationError::NotFound(id.clone()))?;
                if request.state != VerificationState::Pending {
                    return Err(VerificationError::InvalidStateTransition {
                        from: request.state,
                        action: "approve",
                    }
                    .into());
                }
                let (role_id, _) = self
                    .data
                    .get_guild_config(GuildId::new(request.guild_id))
                    .ok_or(ConfigError::VerificationNotConfigured)?
                    .verification_target()?;
                ctx.http
                    .add_member_role(
                        GuildId::new(request.guild_id),
                        UserId::new(request.user_id),
                        RoleId::new(role_id),
                        Some("Verification approved"),
                    )
                    .await
                    .map_err(VerificationError::from)?;
                let request = self.data.verifications.approve(&id, reviewer)?;
                (
                    request.user_id,
                    format!("✅ <@{}> was verified by <@{reviewer}>.", request.user_id),
                    "Your verification was approved. Welcome!".to_string(),
                )
            }
            ReviewAction::DenyVerification(id) => {
                let request = self.data.verifications.deny(&id, reviewer)?;
                (
                    request.user_id,
                    format!("❌ <@{}>'s verification was denied by <@{reviewer}>.", request.user_id),
                    "Your verification was not approved.".to_string(),
                )
            }
            ReviewAction::AcceptSubmission(id) => self.review_submission(&id, reviewer, true)?,
            ReviewAction::RejectSubmission(id) => self.review_submission(&id, reviewer, false)?,
        };

        self.data.save().await?;
        if let Err(e) = notifier.direct(member_id, notice).await {
            warn!(target: EVENT_TARGET, user_id = %member_id, error = %e, "Could not tell the member");
        }
        Ok(summary)
    }

    fn review_submission(
        &self,
        id: &str,
        reviewer: u64,
        accept: bool,
    ) -> Result<(u64, String, String), Error> {
        let submission = self.data.forms.review(id, reviewer, accept)?;
        let title = self
            .data
            .forms
            .get(&submission.form_id)
            .map_or_else(|| "application".to_string(), |form| form.title);
        let verb = if accept { "accepted" } else { "rejected" };
        Ok((
            submission.user_id,
            format!(
                "<@{}>'s {title} was {verb} by <@{reviewer}>.",
                submission.user_id
            ),
            format!("Your {title} was {verb}."),
        ))
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Review buttons on verification requests and form submissions
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(press) = interaction else {
            return;
        };
        let Some(action) = ReviewAction::parse(&press.data.custom_id) else {
            return;
        };
        let user_id = press.user.id.get();

        let permissions = press.member.as_ref().and_then(|member| member.permissions);
        let (response, outcome) = if !can_review(permissions) {
            (
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("Only moderators can review this.")
                        .ephemeral(true),
                ),
                "refused",
            )
        } else {
            match self.review(&ctx, user_id, action).await {
                Ok(summary) => (
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .content(summary)
                            .components(Vec::new()),
                    ),
                    "reviewed",
                ),
                Err(e) => {
                    warn!(target: EVENT_TARGET, custom_id = %press.data.custom_id, error = %e, "Review failed");
                    let message = CreateInteractionResponseMessage::new().ephemeral(true);
                    let message = match as_user_facing(&e) {
                        Some(notice) => message.embed(notice_embed(notice)),
                        None => message.content("Something went wrong while handling that."),
                    };
                    (CreateInteractionResponse::Message(message), "failed")
                }
            }
        };

        if let Err(e) = press.create_response(&ctx.http, response).await {
            warn!(target: EVENT_TARGET, error = %e, "Failed to answer component interaction");
        }
        log_interaction(&press.data.custom_id, user_id, outcome);
    }
}
