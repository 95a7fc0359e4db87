use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::Error;
use crate::config::{BotConfig, GuildConfig};
use crate::forms::{FormStore, FormTemplate, Submission};
use crate::profile::{Profile, ProfileStore};
use crate::tcg::{Battle, BoosterPack, CardStore, ChallengeRegistry, Collection, Deck, Series};
use crate::verification::{VerificationRequest, VerificationStore};

const CARDS_DIR: &str = "cards";
const BOOSTERS_FILE: &str = "boosters.yaml";
const COLLECTIONS_FILE: &str = "collections.yaml";
const DECKS_FILE: &str = "decks.yaml";
const PROFILES_FILE: &str = "profiles.yaml";
const FORMS_FILE: &str = "forms.yaml";
const SUBMISSIONS_FILE: &str = "submissions.yaml";
const VERIFICATIONS_FILE: &str = "verifications.yaml";
const GUILD_CONFIGS_FILE: &str = "guild_configs.yaml";

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config.data_dir)
            .field("guild_configs", &self.guild_configs.len())
            .field("cards", &self.cards)
            .field("challenges", &self.challenges)
            .field("battles", &self.battles.len())
            .field("profiles", &self.profiles)
            .field("forms", &self.forms)
            .field("verifications", &self.verifications)
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create empty stores for a configuration
    #[must_use]
    pub fn new(config: BotConfig) -> Self {
        Self(Arc::new(DataInner::new(config)))
    }

    /// Load everything found under the data directory
    pub async fn load(config: BotConfig) -> Self {
        Self(Arc::new(DataInner::load(config).await))
    }

    /// Get the guild configuration for a specific guild
    #[must_use]
    pub fn get_guild_config(&self, guild_id: serenity::GuildId) -> Option<GuildConfig> {
        self.guild_configs
            .get(&guild_id)
            .map(|entry| entry.value().clone())
    }

    /// Store a guild configuration
    pub fn set_guild_config(&self, config: GuildConfig) {
        self.guild_configs
            .insert(serenity::GuildId::new(config.guild_id), config);
    }
}

/// Main centralized data structure for the bot
pub struct DataInner {
    pub config: BotConfig,
    // Map of guild_id -> guild configuration
    pub guild_configs: DashMap<serenity::GuildId, GuildConfig>,
    pub cards: CardStore,
    pub challenges: ChallengeRegistry,
    // Map of challenge_id -> battle waiting for picks
    pub battles: Arc<DashMap<String, Battle>>,
    pub profiles: ProfileStore,
    pub forms: FormStore,
    pub verifications: VerificationStore,
    save_lock: Mutex<()>,
}

impl DataInner {
    #[must_use]
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            guild_configs: DashMap::new(),
            cards: CardStore::new(),
            challenges: ChallengeRegistry::new(),
            battles: Arc::new(DashMap::new()),
            profiles: ProfileStore::new(),
            forms: FormStore::new(),
            verifications: VerificationStore::new(),
            save_lock: Mutex::new(()),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.config.data_dir.join(file)
    }

    /// Load data from the YAML files
    ///
    /// Missing files leave their store empty; unreadable ones are logged
    /// and skipped.
    pub async fn load(config: BotConfig) -> Self {
        let data = Self::new(config);

        data.reload_catalog().await;

        if let Some(configs) = read_yaml::<Vec<GuildConfig>>(&data.path(GUILD_CONFIGS_FILE)).await
        {
            for config in configs {
                data.guild_configs
                    .insert(serenity::GuildId::new(config.guild_id), config);
            }
        }

        if let Some(collections) = read_yaml::<Vec<Collection>>(&data.path(COLLECTIONS_FILE)).await
        {
            for collection in collections {
                data.cards.insert_collection(collection);
            }
        }

        if let Some(decks) = read_yaml::<Vec<Deck>>(&data.path(DECKS_FILE)).await {
            for deck in decks {
                data.cards.insert_deck(deck);
            }
        }

        if let Some(profiles) = read_yaml::<Vec<Profile>>(&data.path(PROFILES_FILE)).await {
            for profile in profiles {
                data.profiles.insert(profile);
            }
        }

        if let Some(forms) = read_yaml::<Vec<FormTemplate>>(&data.path(FORMS_FILE)).await {
            for form in forms {
                data.forms.insert_template(form);
            }
        }

        if let Some(submissions) = read_yaml::<Vec<Submission>>(&data.path(SUBMISSIONS_FILE)).await
        {
            for submission in submissions {
                data.forms.insert_submission(submission);
            }
        }

        if let Some(requests) =
            read_yaml::<Vec<VerificationRequest>>(&data.path(VERIFICATIONS_FILE)).await
        {
            for request in requests {
                data.verifications.insert(request);
            }
        }

        info!(
            data_dir = %data.config.data_dir.display(),
            cards = data.cards.catalog_size(),
            guilds = data.guild_configs.len(),
            "Data loaded"
        );
        data
    }

    /// Re-read card series and booster definitions
    ///
    /// Returns the number of cards in the new catalog.
    pub async fn reload_catalog(&self) -> usize {
        self.cards.clear_catalog();

        let pattern = self.path(CARDS_DIR).join("*.yaml");
        let paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %pattern.display(), error = %e, "Invalid card file pattern");
                return 0;
            }
        };

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Unreadable card file");
                    continue;
                }
            };
            let Some(series) = read_yaml::<Series>(&path).await else {
                continue;
            };
            if let Err(e) = self.cards.load_series(series) {
                warn!(file = %path.display(), error = %e, "Invalid card series");
            }
        }

        match read_yaml::<Vec<BoosterPack>>(&self.path(BOOSTERS_FILE)).await {
            Some(packs) if !packs.is_empty() => {
                for pack in packs {
                    self.cards.add_booster(pack);
                }
            }
            _ => self.cards.add_booster(BoosterPack::standard()),
        }

        self.cards.catalog_size()
    }

    /// Save data to the YAML files
    ///
    /// # Errors
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - A store cannot be serialized to YAML
    /// - A file cannot be written
    pub async fn save(&self) -> Result<(), Error> {
        let _guard = self.save_lock.lock().await;

        if !self.config.data_dir.exists() {
            tokio::fs::create_dir_all(&self.config.data_dir).await?;
        }

        let configs: Vec<GuildConfig> = self
            .guild_configs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        write_yaml(&self.path(GUILD_CONFIGS_FILE), &configs).await?;
        write_yaml(&self.path(COLLECTIONS_FILE), &self.cards.all_collections()).await?;
        write_yaml(&self.path(DECKS_FILE), &self.cards.all_decks()).await?;
        write_yaml(&self.path(PROFILES_FILE), &self.profiles.all()).await?;
        write_yaml(&self.path(FORMS_FILE), &self.forms.all_templates()).await?;
        write_yaml(&self.path(SUBMISSIONS_FILE), &self.forms.all_submissions()).await?;
        write_yaml(&self.path(VERIFICATIONS_FILE), &self.verifications.all()).await?;

        info!(data_dir = %self.config.data_dir.display(), "Data saved");
        Ok(())
    }
}

async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to read data file");
            return None;
        }
    };
    match serde_yaml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to parse data file");
            None
        }
    }
}

async fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let yaml = serde_yaml::to_string(value)?;
    tokio::fs::write(path, yaml).await?;
    Ok(())
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FieldUpdate, ProfileUpdate};
    use crate::tcg::CardId;

    fn temp_config() -> BotConfig {
        BotConfig {
            data_dir: std::env::temp_dir().join(format!("rent-a-ra-{}", uuid::Uuid::new_v4())),
            ..BotConfig::default()
        }
    }

    const SERIES: &str = r"
name: Founders
cards:
  - id: 1
    name: Ra
    rarity: Legendary
    stats: { battle: 900, nsfw: 120, sfw: 640 }
    bad: 13
    marker: 6
";

    #[test]
    fn test_data_debug_impl() {
        let data = Data::new(BotConfig::default());
        let debug_output = format!("{data:?}");
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("guild_configs"));
        assert!(debug_output.contains("challenges"));
    }

    #[tokio::test]
    async fn test_load_empty_dir() {
        let data = Data::load(temp_config()).await;
        assert_eq!(data.cards.catalog_size(), 0);
        // Without a booster file the standard pack is offered
        assert_eq!(data.cards.boosters().len(), 1);
        assert!(data.cards.booster("standard").is_some());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let config = temp_config();
        let cards_dir = config.data_dir.join(CARDS_DIR);
        tokio::fs::create_dir_all(&cards_dir).await.unwrap();
        tokio::fs::write(cards_dir.join("founders.yaml"), SERIES).await.unwrap();
        tokio::fs::write(cards_dir.join("broken.yaml"), "cards: [").await.unwrap();

        let data = Data::load(config.clone()).await;
        assert_eq!(data.cards.catalog_size(), 1);

        data.cards.grant(7, CardId(1), 2).unwrap();
        data.cards.create_deck(7, "Main").unwrap();
        data.profiles
            .upsert(
                7,
                ProfileUpdate {
                    bio: FieldUpdate::Set("hello".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        data.set_guild_config(GuildConfig::new(42));
        data.save().await.unwrap();

        let reloaded = Data::load(config.clone()).await;
        assert_eq!(reloaded.cards.copies(7, CardId(1)), 2);
        assert!(reloaded.cards.find_deck(7, "main").is_some());
        assert_eq!(
            reloaded.profiles.get(7).and_then(|p| p.bio).as_deref(),
            Some("hello")
        );
        assert!(reloaded.get_guild_config(serenity::GuildId::new(42)).is_some());

        tokio::fs::remove_dir_all(&config.data_dir).await.unwrap();
    }
}
