//! Member profiles

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::UserFacing;
use crate::tcg::CardId;

pub const MAX_DISPLAY_NAME_LEN: usize = 64;
pub const MAX_PRONOUNS_LEN: usize = 32;
pub const MAX_BIO_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("No profile for user {0}")]
    NotFound(u64),

    #[error("{field} is too long ({len}/{max} characters)")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl UserFacing for ProfileError {
    fn title(&self) -> String {
        match self {
            Self::NotFound(_) => "No profile",
            Self::TooLong { .. } => "Profile not saved",
        }
        .to_string()
    }

    fn message(&self) -> String {
        match self {
            Self::NotFound(user_id) => format!("<@{user_id}> has no profile yet."),
            Self::TooLong { .. } => format!("{self}."),
        }
    }

    fn remedy(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("Create one with `/profile edit`.".to_string()),
            Self::TooLong { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: u64,
    pub display_name: Option<String>,
    pub pronouns: Option<String>,
    pub bio: Option<String>,
    pub favourite_card: Option<CardId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A change to one profile field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> FieldUpdate<T> {
    fn apply(self, field: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *field = Some(value),
            Self::Clear => *field = None,
        }
    }
}

impl FieldUpdate<String> {
    /// Blank input clears the field
    #[must_use]
    pub fn from_input(input: Option<String>) -> Self {
        match input {
            None => Self::Keep,
            Some(value) if value.trim().is_empty() => Self::Clear,
            Some(value) => Self::Set(value.trim().to_string()),
        }
    }

    fn check(&self, field: &'static str, max: usize) -> Result<(), ProfileError> {
        match self {
            Self::Set(value) if value.chars().count() > max => Err(ProfileError::TooLong {
                field,
                len: value.chars().count(),
                max,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: FieldUpdate<String>,
    pub pronouns: FieldUpdate<String>,
    pub bio: FieldUpdate<String>,
    pub favourite_card: FieldUpdate<CardId>,
}

impl ProfileUpdate {
    fn validate(&self) -> Result<(), ProfileError> {
        self.display_name
            .check("Display name", MAX_DISPLAY_NAME_LEN)?;
        self.pronouns.check("Pronouns", MAX_PRONOUNS_LEN)?;
        self.bio.check("Bio", MAX_BIO_LEN)
    }
}

#[derive(Clone, Default)]
pub struct ProfileStore {
    profiles: Arc<DashMap<u64, Profile>>,
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("profiles", &self.profiles.len())
            .finish()
    }
}

impl ProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, user_id: u64) -> Option<Profile> {
        self.profiles.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Create or change a profile
    ///
    /// # Errors
    /// Returns `ProfileError::TooLong` if a field exceeds its limit; nothing
    /// is stored in that case
    pub fn upsert(&self, user_id: u64, update: ProfileUpdate) -> Result<Profile, ProfileError> {
        update.validate()?;

        let now = Utc::now();
        let mut entry = self.profiles.entry(user_id).or_insert_with(|| Profile {
            user_id,
            display_name: None,
            pronouns: None,
            bio: None,
            favourite_card: None,
            created_at: now,
            updated_at: now,
        });
        let profile = entry.value_mut();
        update.display_name.apply(&mut profile.display_name);
        update.pronouns.apply(&mut profile.pronouns);
        update.bio.apply(&mut profile.bio);
        update.favourite_card.apply(&mut profile.favourite_card);
        profile.updated_at = now;
        let profile = profile.clone();
        drop(entry);

        info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    /// # Errors
    /// Returns `ProfileError::NotFound` if the member has no profile
    pub fn delete(&self, user_id: u64) -> Result<Profile, ProfileError> {
        let (_, profile) = self
            .profiles
            .remove(&user_id)
            .ok_or(ProfileError::NotFound(user_id))?;
        info!(user_id = %user_id, "Profile deleted");
        Ok(profile)
    }

    #[must_use]
    pub fn all(&self) -> Vec<Profile> {
        self.profiles.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_and_updates() {
        let store = ProfileStore::new();
        assert!(store.get(1).is_none());

        let created = store
            .upsert(
                1,
                ProfileUpdate {
                    display_name: FieldUpdate::Set("Ra".to_string()),
                    pronouns: FieldUpdate::Set("they/them".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.display_name.as_deref(), Some("Ra"));
        assert!(created.bio.is_none());

        let updated = store
            .upsert(
                1,
                ProfileUpdate {
                    pronouns: FieldUpdate::Clear,
                    bio: FieldUpdate::Set("Sun enjoyer".to_string()),
                    favourite_card: FieldUpdate::Set(CardId(7)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ra"));
        assert!(updated.pronouns.is_none());
        assert_eq!(updated.favourite_card, Some(CardId(7)));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn test_length_limits() {
        let store = ProfileStore::new();
        let result = store.upsert(
            1,
            ProfileUpdate {
                pronouns: FieldUpdate::Set("x".repeat(MAX_PRONOUNS_LEN + 1)),
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(ProfileError::TooLong { field: "Pronouns", len: 33, max: 32 })
        ));
        assert!(store.get(1).is_none());

        // Limits count characters, not bytes
        let name = "é".repeat(MAX_DISPLAY_NAME_LEN);
        assert!(store
            .upsert(
                1,
                ProfileUpdate {
                    display_name: FieldUpdate::Set(name),
                    ..Default::default()
                },
            )
            .is_ok());
    }

    #[test]
    fn test_field_input() {
        assert_eq!(FieldUpdate::from_input(None), FieldUpdate::Keep);
        assert_eq!(FieldUpdate::from_input(Some("  ".to_string())), FieldUpdate::Clear);
        assert_eq!(
            FieldUpdate::from_input(Some(" hi ".to_string())),
            FieldUpdate::Set("hi".to_string())
        );
    }

    #[test]
    fn test_delete() {
        let store = ProfileStore::new();
        assert!(matches!(store.delete(3), Err(ProfileError::NotFound(3))));
        store.upsert(3, ProfileUpdate::default()).unwrap();
        assert_eq!(store.delete(3).unwrap().user_id, 3);
        assert!(store.get(3).is_none());
    }
}
