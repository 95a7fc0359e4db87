//! Member verification
//!
//! A member answers the guild's verification questions; a moderator then
//! approves (granting the verified role) or denies the request.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::UserFacing;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("You already have a verification request waiting for review")]
    AlreadyPending,

    #[error("You are already verified")]
    AlreadyVerified,

    #[error("Verification request not found: {0}")]
    NotFound(String),

    /// Invalid state transition attempted
    #[error("Cannot {action} a request in state {from}")]
    InvalidStateTransition {
        from: VerificationState,
        action: &'static str,
    },

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for VerificationError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl UserFacing for VerificationError {
    fn title(&self) -> String {
        match self {
            Self::AlreadyPending | Self::AlreadyVerified => "Verification",
            Self::NotFound(_) | Self::InvalidStateTransition { .. } => "Review failed",
            Self::DiscordApi(_) => "Something went wrong",
        }
        .to_string()
    }

    fn message(&self) -> String {
        format!("{self}.")
    }

    fn remedy(&self) -> Option<String> {
        matches!(self, Self::AlreadyPending)
            .then(|| "A moderator will get to it soon.".to_string())
    }
}

/// Verification request lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationState {
    #[default]
    Pending,
    Approved,
    Denied,
}

impl std::fmt::Display for VerificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Approved => write!(f, "Approved"),
            Self::Denied => write!(f, "Denied"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: String,
    pub guild_id: u64,
    pub user_id: u64,
    /// Question and answer pairs as asked at submission time
    pub answers: Vec<(String, String)>,
    pub state: VerificationState,
    pub submitted_at: DateTime<Utc>,
    pub reviewer_id: Option<u64>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    #[must_use]
    pub fn new(guild_id: u64, user_id: u64, answers: Vec<(String, String)>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            guild_id,
            user_id,
            answers,
            state: VerificationState::Pending,
            submitted_at: Utc::now(),
            reviewer_id: None,
            reviewed_at: None,
        }
    }

    /// # Errors
    /// Returns an error unless the request is pending
    pub fn approve(&mut self, reviewer_id: u64) -> Result<(), VerificationError> {
        self.review(reviewer_id, VerificationState::Approved, "approve")
    }

    /// # Errors
    /// Returns an error unless the request is pending
    pub fn deny(&mut self, reviewer_id: u64) -> Result<(), VerificationError> {
        self.review(reviewer_id, VerificationState::Denied, "deny")
    }

    fn review(
        &mut self,
        reviewer_id: u64,
        to: VerificationState,
        action: &'static str,
    ) -> Result<(), VerificationError> {
        if self.state != VerificationState::Pending {
            return Err(VerificationError::InvalidStateTransition {
                from: self.state,
                action,
            });
        }
        self.state = to;
        self.reviewer_id = Some(reviewer_id);
        self.reviewed_at = Some(Utc::now());

        info!(
            request_id = %self.id,
            guild_id = %self.guild_id,
            user_id = %self.user_id,
            reviewer_id = %reviewer_id,
            from = %VerificationState::Pending,
            to = %to,
            "Verification state transition"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct VerificationStore {
    requests: Arc<DashMap<String, VerificationRequest>>,
    submit_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for VerificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationStore")
            .field("requests", &self.requests.len())
            .finish()
    }
}

impl VerificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn has_request_in(&self, guild_id: u64, user_id: u64, state: VerificationState) -> bool {
        self.requests.iter().any(|entry| {
            entry.guild_id == guild_id && entry.user_id == user_id && entry.state == state
        })
    }

    /// Open a pending request
    ///
    /// # Errors
    /// Returns an error if the member already waits for review or was
    /// approved before
    pub fn submit(
        &self,
        guild_id: u64,
        user_id: u64,
        answers: Vec<(String, String)>,
    ) -> Result<VerificationRequest, VerificationError> {
        // Held until the new request is visible to other submitters
        let _guard = self.submit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.has_request_in(guild_id, user_id, VerificationState::Approved) {
            return Err(VerificationError::AlreadyVerified);
        }
        if self.has_request_in(guild_id, user_id, VerificationState::Pending) {
            return Err(VerificationError::AlreadyPending);
        }

        let request = VerificationRequest::new(guild_id, user_id, answers);
        self.requests.insert(request.id.clone(), request.clone());

        info!(
            request_id = %request.id,
            guild_id = %guild_id,
            user_id = %user_id,
            "Verification submitted"
        );
        Ok(request)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<VerificationRequest> {
        self.requests.get(id).map(|entry| entry.value().clone())
    }

    fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&mut VerificationRequest) -> Result<(), VerificationError>,
    ) -> Result<VerificationRequest, VerificationError> {
        let mut request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| VerificationError::NotFound(id.to_string()))?;
        apply(&mut *request)?;
        Ok(request.clone())
    }

    /// # Errors
    /// Returns an error for unknown or already reviewed requests
    pub fn approve(&self, id: &str, reviewer_id: u64) -> Result<VerificationRequest, VerificationError> {
        self.update(id, |request| request.approve(reviewer_id))
    }

    /// # Errors
    /// Returns an error for unknown or already reviewed requests
    pub fn deny(&self, id: &str, reviewer_id: u64) -> Result<VerificationRequest, VerificationError> {
        self.update(id, |request| request.deny(reviewer_id))
    }

    /// Requests waiting for review in a guild, oldest first
    #[must_use]
    pub fn pending(&self, guild_id: u64) -> Vec<VerificationRequest> {
        let mut pending: Vec<VerificationRequest> = self
            .requests
            .iter()
            .filter(|e| e.guild_id == guild_id && e.state == VerificationState::Pending)
            .map(|e| e.value().clone())
            .collect();
        pending.sort_by_key(|request| request.submitted_at);
        pending
    }

    #[must_use]
    pub fn all(&self) -> Vec<VerificationRequest> {
        self.requests.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert(&self, request: VerificationRequest) {
        self.requests.insert(request.id.clone(), request);
    }
}
