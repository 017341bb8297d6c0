use async_trait::async_trait;
use spendiq_core::{Transaction, FALLBACK_CATEGORY};
use std::sync::Arc;
use thiserror::Error;

use crate::overrides::OverrideStore;
use crate::savings::SavingsAccounts;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CategorizeError {
    #[error("Categorizer unavailable: {0}")]
    Unavailable(String),
    #[error("Categorizer rejected the request: {0}")]
    Rejected(String),
    #[error("Categorizer returned {returned} transactions for {sent}")]
    LengthMismatch { sent: usize, returned: usize },
}

/// First-pass categorization authority.
///
/// Implementations must honor merchant+type and single-transaction overrides
/// from `overrides` (see [`OverrideStore::lookup`]) and return one transaction
/// per input, in order.
#[async_trait]
pub trait BaseCategorizer: Send + Sync {
    async fn categorize(
        &self,
        transactions: Vec<Transaction>,
        overrides: &OverrideStore,
        savings_accounts: &SavingsAccounts,
    ) -> Result<Vec<Transaction>, CategorizeError>;
}

#[async_trait]
impl<T: BaseCategorizer + ?Sized> BaseCategorizer for Arc<T> {
    async fn categorize(
        &self,
        transactions: Vec<Transaction>,
        overrides: &OverrideStore,
        savings_accounts: &SavingsAccounts,
    ) -> Result<Vec<Transaction>, CategorizeError> {
        (**self)
            .categorize(transactions, overrides, savings_accounts)
            .await
    }
}

// ── Mock categorizer (always available, used for tests) ───────────────────────

/// Assigns categories from a fixed merchant table after honoring overrides.
/// Can be told to fail, to exercise collaborator-error paths.
#[derive(Debug, Clone, Default)]
pub struct MockCategorizer {
    pub by_merchant: Vec<(String, String)>,
    pub failure: Option<CategorizeError>,
}

impl MockCategorizer {
    pub fn new<I, M, C>(by_merchant: I) -> Self
    where
        I: IntoIterator<Item = (M, C)>,
        M: Into<String>,
        C: Into<String>,
    {
        Self {
            by_merchant: by_merchant
                .into_iter()
                .map(|(m, c)| (m.into(), c.into()))
                .collect(),
            failure: None,
        }
    }

    pub fn failing(error: CategorizeError) -> Self {
        Self {
            by_merchant: Vec::new(),
            failure: Some(error),
        }
    }
}

#[async_trait]
impl BaseCategorizer for MockCategorizer {
    async fn categorize(
        &self,
        mut transactions: Vec<Transaction>,
        overrides: &OverrideStore,
        _savings_accounts: &SavingsAccounts,
    ) -> Result<Vec<Transaction>, CategorizeError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        for tx in &mut transactions {
            let category = overrides.lookup(tx).map(str::to_string).or_else(|| {
                self.by_merchant
                    .iter()
                    .find(|(m, _)| m == tx.merchant.trim())
                    .map(|(_, c)| c.clone())
            });
            tx.category = Some(category.unwrap_or_else(|| FALLBACK_CATEGORY.to_string()));
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::OverrideKey;
    use spendiq_core::Direction;

    fn tx(merchant: &str) -> Transaction {
        Transaction::new("2024-01-01", "POS", merchant, Some(-3.0), Direction::Debit)
    }

    #[tokio::test]
    async fn mock_uses_table_then_fallback() {
        let mock = MockCategorizer::new([("Lidl", "Groceries")]);
        let out = mock
            .categorize(vec![tx("Lidl"), tx("Unknown")], &OverrideStore::new(), &SavingsAccounts::new())
            .await
            .unwrap();
        assert_eq!(out[0].category.as_deref(), Some("Groceries"));
        assert_eq!(out[1].category.as_deref(), Some("Other"));
    }

    #[tokio::test]
    async fn mock_honors_overrides() {
        let mock = MockCategorizer::new([("Lidl", "Groceries")]);
        let mut overrides = OverrideStore::new();
        overrides.set(OverrideKey::merchant_type("Lidl", "POS"), "Fees");
        let out = mock
            .categorize(vec![tx("Lidl")], &overrides, &SavingsAccounts::new())
            .await
            .unwrap();
        assert_eq!(out[0].category.as_deref(), Some("Fees"));
    }

    #[tokio::test]
    async fn failing_mock_propagates() {
        let mock = MockCategorizer::failing(CategorizeError::Unavailable("offline".into()));
        let err = mock
            .categorize(vec![tx("Lidl")], &OverrideStore::new(), &SavingsAccounts::new())
            .await
            .unwrap_err();
        assert_eq!(err, CategorizeError::Unavailable("offline".into()));
    }

    #[tokio::test]
    async fn arc_dyn_delegates() {
        let shared: Arc<dyn BaseCategorizer> = Arc::new(MockCategorizer::new([("Lidl", "Groceries")]));
        let out = shared
            .categorize(vec![tx("Lidl")], &OverrideStore::new(), &SavingsAccounts::new())
            .await
            .unwrap();
        assert_eq!(out[0].category.as_deref(), Some("Groceries"));
    }
}
