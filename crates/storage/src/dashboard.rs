use serde::{de::DeserializeOwned, Deserialize, Serialize};
use spendiq_core::{StatementDetails, Transaction};
use spendiq_engine::util::mask_identity;

use crate::cache::CacheStore;

const KEY_PREFIX: &str = "spendiq.dashboard.v2";
const LEGACY_TRANSACTIONS_KEY: &str = "spendiq.dashboard.transactions";
const LEGACY_DETAILS_KEY: &str = "spendiq.dashboard.statementDetails";

/// Who the cached dashboard belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityContext {
    Anonymous,
    Account(String),
}

impl IdentityContext {
    /// Account identities compare case-insensitively.
    pub fn account(id: &str) -> Self {
        IdentityContext::Account(id.trim().to_lowercase())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, IdentityContext::Anonymous)
    }

    fn scope(&self) -> String {
        match self {
            IdentityContext::Anonymous => "anonymous".to_string(),
            IdentityContext::Account(id) => format!("account.{id}"),
        }
    }

    fn label(&self) -> String {
        match self {
            IdentityContext::Anonymous => "anonymous".to_string(),
            IdentityContext::Account(id) => mask_identity(id),
        }
    }
}

/// The last view built for an identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub transactions: Vec<Transaction>,
    pub statement_details: Option<StatementDetails>,
}

/// Identity-scoped dashboard persistence over a [`CacheStore`].
///
/// Every operation is best effort: store failures are logged and otherwise
/// ignored, and unreadable entries load as an empty snapshot.
pub struct DashboardCache<S> {
    store: S,
}

impl<S: CacheStore> DashboardCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn load(&self, identity: &IdentityContext) -> DashboardSnapshot {
        let (tx_key, details_key) = keys(identity);
        let raw_transactions = self.read(&tx_key);

        if raw_transactions.is_none() && identity.is_anonymous() {
            if let Some(snapshot) = self.migrate_legacy(&tx_key, &details_key) {
                return snapshot;
            }
        }

        let transactions = raw_transactions
            .and_then(|raw| decode::<Vec<Transaction>>(&raw, &tx_key))
            .unwrap_or_default();
        let statement_details = self
            .read(&details_key)
            .and_then(|raw| decode::<Option<StatementDetails>>(&raw, &details_key))
            .flatten();
        DashboardSnapshot {
            transactions,
            statement_details,
        }
    }

    pub fn save(&self, identity: &IdentityContext, snapshot: &DashboardSnapshot) {
        let (tx_key, details_key) = keys(identity);
        match serde_json::to_string(&snapshot.transactions) {
            Ok(json) => self.write(&tx_key, &json),
            Err(err) => tracing::warn!(error = %err, "failed to encode cached transactions"),
        }
        match &snapshot.statement_details {
            Some(details) => match serde_json::to_string(details) {
                Ok(json) => self.write(&details_key, &json),
                Err(err) => tracing::warn!(error = %err, "failed to encode cached statement details"),
            },
            None => self.delete(&details_key),
        }
        tracing::debug!(
            identity = %identity.label(),
            transactions = snapshot.transactions.len(),
            "dashboard cached"
        );
    }

    pub fn clear(&self, identity: &IdentityContext) {
        let (tx_key, details_key) = keys(identity);
        self.delete(&tx_key);
        self.delete(&details_key);
        tracing::debug!(identity = %identity.label(), "dashboard cache cleared");
    }

    /// Moves the unversioned entries into the versioned keys and deletes them,
    /// so they are read at most once.
    fn migrate_legacy(&self, tx_key: &str, details_key: &str) -> Option<DashboardSnapshot> {
        let raw = self.read(LEGACY_TRANSACTIONS_KEY)?;
        let transactions = decode::<Vec<Transaction>>(&raw, LEGACY_TRANSACTIONS_KEY);
        let statement_details = self
            .read(LEGACY_DETAILS_KEY)
            .and_then(|raw| decode::<Option<StatementDetails>>(&raw, LEGACY_DETAILS_KEY))
            .flatten();
        self.delete(LEGACY_TRANSACTIONS_KEY);
        self.delete(LEGACY_DETAILS_KEY);

        let snapshot = DashboardSnapshot {
            transactions: transactions?,
            statement_details,
        };
        if let Ok(json) = serde_json::to_string(&snapshot.transactions) {
            self.write(tx_key, &json);
        }
        if let Some(details) = &snapshot.statement_details {
            if let Ok(json) = serde_json::to_string(details) {
                self.write(details_key, &json);
            }
        }
        tracing::info!(
            transactions = snapshot.transactions.len(),
            "migrated legacy dashboard cache"
        );
        Some(snapshot)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "dashboard cache read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            tracing::warn!(key, error = %err, "dashboard cache write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            tracing::warn!(key, error = %err, "dashboard cache delete failed");
        }
    }
}

fn keys(identity: &IdentityContext) -> (String, String) {
    let scope = identity.scope();
    (
        format!("{KEY_PREFIX}.{scope}.transactions"),
        format!("{KEY_PREFIX}.{scope}.statementDetails"),
    )
}

fn decode<T: DeserializeOwned>(raw: &str, key: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "ignoring unreadable dashboard cache entry");
            None
        }
    }
}
