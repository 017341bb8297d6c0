pub mod cache;
pub mod dashboard;
pub mod db;
pub mod store;

pub use cache::{CacheError, CacheStore, FileCacheStore, MemoryCacheStore};
pub use dashboard::{DashboardCache, DashboardSnapshot, IdentityContext};
pub use db::{create_db, DbPool};
pub use store::{
    savings_accounts_from, set_savings_accounts, LocalUserStore, Settings, SqliteUserStore, StoreError,
    UserDataStore, SAVINGS_ACCOUNTS_SETTING,
};
