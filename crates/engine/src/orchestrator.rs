use spendiq_core::{migrate_legacy_name, CategorySet, Transaction};

use crate::alias::{apply_aliases, AliasResolver, InferenceStrategy, SubstringInference};
use crate::categorizer::{BaseCategorizer, CategorizeError};
use crate::overrides::OverrideStore;
use crate::savings::SavingsAccounts;

/// Everything one categorization pass reads. Borrowed, so a pass never
/// mutates caller state.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub transactions: &'a [Transaction],
    pub categories: &'a CategorySet,
    pub overrides: &'a OverrideStore,
    pub savings_accounts: &'a SavingsAccounts,
}

/// Runs the base categorizer and reconciles its output with the user's
/// category set, overrides and recorded renames.
pub struct Orchestrator<C, S = SubstringInference> {
    categorizer: C,
    resolver: AliasResolver<S>,
}

impl<C: BaseCategorizer> Orchestrator<C> {
    pub fn new(categorizer: C) -> Self {
        Self {
            categorizer,
            resolver: AliasResolver::new(),
        }
    }
}

impl<C: BaseCategorizer, S: InferenceStrategy> Orchestrator<C, S> {
    pub fn with_resolver(categorizer: C, resolver: AliasResolver<S>) -> Self {
        Self { categorizer, resolver }
    }

    /// One full pass. Either every transaction comes back categorized within
    /// `input.categories`, or the collaborator's error is returned.
    pub async fn run(&self, input: PassInput<'_>) -> Result<Vec<Transaction>, CategorizeError> {
        let stripped: Vec<Transaction> = input
            .transactions
            .iter()
            .cloned()
            .map(|mut tx| {
                tx.category = None;
                tx
            })
            .collect();
        let sent = stripped.len();

        let mut categorized = self
            .categorizer
            .categorize(stripped, input.overrides, input.savings_accounts)
            .await?;
        if categorized.len() != sent {
            return Err(CategorizeError::LengthMismatch {
                sent,
                returned: categorized.len(),
            });
        }

        // Aliases come from what the transactions were labelled before this pass.
        let aliases = self
            .resolver
            .resolve(input.transactions, input.overrides, input.categories);

        let mut clamped = 0usize;
        for tx in &mut categorized {
            let base = tx.category.as_deref().unwrap_or_default().trim();
            let legacy = migrate_legacy_name(base);
            let resolved = apply_aliases(legacy, &aliases, input.categories);
            if resolved != legacy {
                clamped += 1;
            }
            tx.category = Some(resolved);
        }
        tracing::debug!(
            transactions = categorized.len(),
            aliases = aliases.len(),
            remapped = clamped,
            "categorization pass complete"
        );
        Ok(categorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::MockCategorizer;
    use crate::overrides::OverrideKey;
    use spendiq_core::Direction;

    fn tx(merchant: &str) -> Transaction {
        Transaction::new("02/01/2026", "POS", merchant, Some(-10.0), Direction::Debit)
    }

    fn set(names: &[&str]) -> CategorySet {
        CategorySet::from_names(names.iter().copied())
    }

    async fn run(
        orchestrator: &Orchestrator<MockCategorizer>,
        txs: &[Transaction],
        categories: &CategorySet,
        overrides: &OverrideStore,
    ) -> Vec<Transaction> {
        orchestrator
            .run(PassInput {
                transactions: txs,
                categories,
                overrides,
                savings_accounts: &SavingsAccounts::new(),
            })
            .await
            .unwrap()
    }

    fn categories_of(txs: &[Transaction]) -> Vec<&str> {
        txs.iter().filter_map(Transaction::category_name).collect()
    }

    #[tokio::test]
    async fn merchant_type_override_scenario() {
        let orchestrator = Orchestrator::new(MockCategorizer::new([("Shop", "Shopping")]));
        let mut overrides = OverrideStore::new();
        overrides.set(OverrideKey::merchant_type("Shop", "POS"), "Groceries");
        let out = run(&orchestrator, &[tx("Shop")], &set(&["Groceries", "Shopping"]), &overrides).await;
        assert_eq!(categories_of(&out), vec!["Groceries"]);
    }

    #[tokio::test]
    async fn every_category_lands_in_the_set() {
        let orchestrator = Orchestrator::new(MockCategorizer::new([
            ("A", "Dining"),
            ("B", "Unknown"),
            ("C", "Fees"),
        ]));
        let categories = set(&["Restaurants", "Fees"]);
        let out = run(&orchestrator, &[tx("A"), tx("B"), tx("C")], &categories, &OverrideStore::new()).await;
        assert_eq!(categories_of(&out), vec!["Restaurants", "Other", "Fees"]);
        assert!(out.iter().all(|t| categories.contains(t.category_name().unwrap())));
    }

    #[tokio::test]
    async fn stale_base_category_follows_recorded_rename() {
        let orchestrator = Orchestrator::new(MockCategorizer::new([("Lidl", "Groceries")]));
        let mut overrides = OverrideStore::new();
        overrides.set(OverrideKey::alias("Groceries"), "Food");
        let previous = vec![tx("Lidl").with_category("Food")];
        let out = run(&orchestrator, &previous, &set(&["Food"]), &overrides).await;
        assert_eq!(categories_of(&out), vec!["Food"]);
    }

    #[tokio::test]
    async fn inferred_alias_from_previous_labels() {
        let orchestrator = Orchestrator::new(MockCategorizer::new([("Lidl", "Grocery")]));
        let previous = vec![tx("Lidl").with_category("Grocery")];
        let out = run(&orchestrator, &previous, &set(&["Grocery Store"]), &OverrideStore::new()).await;
        assert_eq!(categories_of(&out), vec!["Grocery Store"]);
    }

    #[tokio::test]
    async fn idempotent_on_unchanged_inputs() {
        let orchestrator = Orchestrator::new(MockCategorizer::new([("Lidl", "Groceries"), ("KFC", "Dining")]));
        let categories = set(&["Groceries", "Restaurants"]);
        let overrides = OverrideStore::new();
        let first = run(&orchestrator, &[tx("Lidl"), tx("KFC"), tx("X")], &categories, &overrides).await;
        let second = run(&orchestrator, &first, &categories, &overrides).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn collaborator_failure_propagates() {
        let orchestrator = Orchestrator::new(MockCategorizer::failing(CategorizeError::Rejected("bad".into())));
        let err = orchestrator
            .run(PassInput {
                transactions: &[tx("A")],
                categories: &CategorySet::defaults(),
                overrides: &OverrideStore::new(),
                savings_accounts: &SavingsAccounts::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, CategorizeError::Rejected("bad".into()));
    }

    #[tokio::test]
    async fn length_mismatch_is_rejected() {
        use async_trait::async_trait;

        struct Dropper;
        #[async_trait]
        impl BaseCategorizer for Dropper {
            async fn categorize(
                &self,
                mut transactions: Vec<Transaction>,
                _overrides: &OverrideStore,
                _savings: &SavingsAccounts,
            ) -> Result<Vec<Transaction>, CategorizeError> {
                transactions.pop();
                Ok(transactions)
            }
        }

        let orchestrator = Orchestrator::new(Dropper);
        let err = orchestrator
            .run(PassInput {
                transactions: &[tx("A"), tx("B")],
                categories: &CategorySet::defaults(),
                overrides: &OverrideStore::new(),
                savings_accounts: &SavingsAccounts::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, CategorizeError::LengthMismatch { sent: 2, returned: 1 });
    }
}
