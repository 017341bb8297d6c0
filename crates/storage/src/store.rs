use async_trait::async_trait;
use serde::de::DeserializeOwned;
use spendiq_core::CategorySet;
use spendiq_engine::util::mask_identity;
use spendiq_engine::{OverrideStore, SavingsAccounts};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::cache::{CacheError, CacheStore};
use crate::db::DbPool;

/// Settings key holding the configured savings accounts as a JSON array.
pub const SAVINGS_ACCOUNTS_SETTING: &str = "savings_accounts";

pub type Settings = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Per-user categories, overrides and settings. Every `put_*` replaces the
/// whole collection.
#[async_trait]
pub trait UserDataStore: Send + Sync {
    async fn get_categories(&self) -> Result<CategorySet, StoreError>;
    async fn put_categories(&self, categories: &CategorySet) -> Result<(), StoreError>;
    async fn get_overrides(&self) -> Result<OverrideStore, StoreError>;
    async fn put_overrides(&self, overrides: &OverrideStore) -> Result<(), StoreError>;
    async fn get_settings(&self) -> Result<Settings, StoreError>;
    async fn put_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Default categories back, overrides and settings gone.
    async fn reset_data(&self, defaults: &CategorySet) -> Result<(), StoreError> {
        self.put_overrides(&OverrideStore::new()).await?;
        self.put_settings(&Settings::new()).await?;
        self.put_categories(defaults).await
    }
}

/// Savings accounts stored in `settings`; unreadable values read as none.
pub fn savings_accounts_from(settings: &Settings) -> SavingsAccounts {
    settings
        .get(SAVINGS_ACCOUNTS_SETTING)
        .and_then(|raw| match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => Some(list.into_iter().collect()),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed savings account setting");
                None
            }
        })
        .unwrap_or_default()
}

pub fn set_savings_accounts(settings: &mut Settings, accounts: &SavingsAccounts) -> Result<(), StoreError> {
    let list: Vec<&str> = accounts.iter().collect();
    settings.insert(SAVINGS_ACCOUNTS_SETTING.to_string(), serde_json::to_string(&list)?);
    Ok(())
}

fn clean_settings(settings: &Settings) -> impl Iterator<Item = (&str, &str)> {
    settings
        .iter()
        .map(|(k, v)| (k.trim(), v.as_str()))
        .filter(|(k, _)| !k.is_empty())
}

// ── Local store (anonymous mode) ──────────────────────────────────────────────

const LOCAL_CATEGORIES_KEY: &str = "spendiq.categories";
const LOCAL_OVERRIDES_KEY: &str = "spendiq.overrides";
const LOCAL_SETTINGS_KEY: &str = "spendiq.settings";

/// JSON blobs in a [`CacheStore`]. Malformed blobs read as defaults.
pub struct LocalUserStore<S> {
    cache: S,
    default_categories: CategorySet,
}

impl<S: CacheStore> LocalUserStore<S> {
    pub fn new(cache: S) -> Self {
        Self {
            cache,
            default_categories: CategorySet::defaults(),
        }
    }

    pub fn with_default_categories(mut self, categories: CategorySet) -> Self {
        self.default_categories = categories;
        self
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.cache.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key, error = %err, "malformed stored value, using defaults");
                Ok(None)
            }
        }
    }

    fn write<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.cache.set(key, &json)?;
        Ok(())
    }
}

#[async_trait]
impl<S: CacheStore> UserDataStore for LocalUserStore<S> {
    async fn get_categories(&self) -> Result<CategorySet, StoreError> {
        Ok(self
            .read::<CategorySet>(LOCAL_CATEGORIES_KEY)?
            .unwrap_or_else(|| self.default_categories.clone()))
    }

    async fn put_categories(&self, categories: &CategorySet) -> Result<(), StoreError> {
        self.write(LOCAL_CATEGORIES_KEY, categories)
    }

    async fn get_overrides(&self) -> Result<OverrideStore, StoreError> {
        Ok(self.read(LOCAL_OVERRIDES_KEY)?.unwrap_or_default())
    }

    async fn put_overrides(&self, overrides: &OverrideStore) -> Result<(), StoreError> {
        self.write(LOCAL_OVERRIDES_KEY, overrides)
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.read(LOCAL_SETTINGS_KEY)?.unwrap_or_default())
    }

    async fn put_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let cleaned: Settings = clean_settings(settings)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.write(LOCAL_SETTINGS_KEY, &cleaned)
    }
}

// ── SQLite store (account mode) ───────────────────────────────────────────────

/// Rows scoped to one lower-cased account identity.
pub struct SqliteUserStore {
    pool: DbPool,
    identity: String,
    default_categories: CategorySet,
}

impl SqliteUserStore {
    pub fn new(pool: DbPool, identity: &str) -> Self {
        Self {
            pool,
            identity: identity.trim().to_lowercase(),
            default_categories: CategorySet::defaults(),
        }
    }

    pub fn with_default_categories(mut self, categories: CategorySet) -> Self {
        self.default_categories = categories;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait]
impl UserDataStore for SqliteUserStore {
    async fn get_categories(&self) -> Result<CategorySet, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT name FROM user_categories WHERE identity = ? ORDER BY position, id",
        )
        .bind(&self.identity)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            tracing::info!(identity = %mask_identity(&self.identity), "seeding default categories");
            self.put_categories(&self.default_categories).await?;
            return Ok(self.default_categories.clone());
        }
        Ok(CategorySet::from_names(rows.into_iter().map(|r| r.0)))
    }

    async fn put_categories(&self, categories: &CategorySet) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_categories WHERE identity = ?")
            .bind(&self.identity)
            .execute(&mut *tx)
            .await?;
        for (position, name) in categories.iter().enumerate() {
            sqlx::query("INSERT INTO user_categories (identity, position, name) VALUES (?, ?, ?)")
                .bind(&self.identity)
                .bind(position as i64)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_overrides(&self) -> Result<OverrideStore, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT override_key, category FROM user_overrides WHERE identity = ? ORDER BY position, id",
        )
        .bind(&self.identity)
        .fetch_all(&self.pool)
        .await?;
        Ok(OverrideStore::from_wire_pairs(rows))
    }

    async fn put_overrides(&self, overrides: &OverrideStore) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_overrides WHERE identity = ?")
            .bind(&self.identity)
            .execute(&mut *tx)
            .await?;
        for (position, (key, category)) in overrides.to_wire_pairs().into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO user_overrides (identity, position, override_key, category, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&self.identity)
            .bind(position as i64)
            .bind(key)
            .bind(category)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM user_settings WHERE identity = ?",
        )
        .bind(&self.identity)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn put_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_settings WHERE identity = ?")
            .bind(&self.identity)
            .execute(&mut *tx)
            .await?;
        for (key, value) in clean_settings(settings) {
            sqlx::query("INSERT INTO user_settings (identity, key, value, updated_at) VALUES (?, ?, ?, ?)")
                .bind(&self.identity)
                .bind(key)
                .bind(value)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
