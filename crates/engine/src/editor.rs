use serde::{Deserialize, Serialize};
use spendiq_core::{CategoryError, CategorySet, Transaction, FALLBACK_CATEGORY};
use thiserror::Error;

use crate::overrides::{OverrideKey, OverrideStore};

/// The user-editable categorization state a session owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryState {
    pub categories: CategorySet,
    pub overrides: OverrideStore,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Editing(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("'{0}' is reserved and cannot be edited")]
    Reserved(String),
    #[error("Already renaming '{0}'")]
    Busy(String),
    #[error("No rename in progress")]
    NotEditing,
    #[error(transparent)]
    Category(#[from] CategoryError),
}

/// What the caller has to do after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing changed; no persistence needed.
    Unchanged,
    /// State changed in place; persist it.
    Applied,
    /// State changed; persist it and run a categorization pass.
    Recategorize,
}

impl EditOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, EditOutcome::Unchanged)
    }
}

/// Category rename/delete state machine.
#[derive(Debug, Clone, Default)]
pub struct CategoryEditor {
    state: EditState,
}

impl CategoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn start_rename(&mut self, state: &CategoryState, name: &str) -> Result<(), EditError> {
        if let EditState::Editing(current) = &self.state {
            return Err(EditError::Busy(current.clone()));
        }
        let name = name.trim();
        if name == FALLBACK_CATEGORY {
            return Err(EditError::Reserved(FALLBACK_CATEGORY.to_string()));
        }
        if !state.categories.contains(name) {
            return Err(CategoryError::NotFound(name.to_string()).into());
        }
        self.state = EditState::Editing(name.to_string());
        Ok(())
    }

    pub fn cancel_rename(&mut self) {
        self.state = EditState::Idle;
    }

    /// Finishes the pending rename. Blank or identical names just end editing.
    ///
    /// Renaming onto an existing name (case-insensitive) merges the two.
    pub fn apply_rename(&mut self, state: &mut CategoryState, new_name: &str) -> Result<EditOutcome, EditError> {
        let old = match std::mem::take(&mut self.state) {
            EditState::Editing(old) => old,
            EditState::Idle => return Err(EditError::NotEditing),
        };
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == old {
            return Ok(EditOutcome::Unchanged);
        }

        let survivor = state.categories.rename(&old, new_name)?;
        let rewritten = state.overrides.rename_values(&old, &survivor);
        // A recorded rename away from the survivor would now hide it.
        state.overrides.remove(&OverrideKey::alias(&survivor));
        state.overrides.set(OverrideKey::alias(&old), &survivor);
        let moved = relabel(&mut state.transactions, &old, &survivor);

        tracing::info!(
            from = %old,
            to = %survivor,
            overrides = rewritten,
            transactions = moved,
            "category renamed"
        );
        Ok(EditOutcome::Recategorize)
    }

    pub fn delete_category(&mut self, state: &mut CategoryState, name: &str) -> Result<EditOutcome, EditError> {
        if let EditState::Editing(current) = &self.state {
            return Err(EditError::Busy(current.clone()));
        }
        let name = name.trim();
        if name == FALLBACK_CATEGORY {
            return Err(EditError::Reserved(FALLBACK_CATEGORY.to_string()));
        }
        state.categories.remove(name)?;
        state.overrides.delete_category(name);
        let moved = relabel(&mut state.transactions, name, FALLBACK_CATEGORY);
        tracing::info!(category = %name, transactions = moved, "category deleted");
        Ok(EditOutcome::Recategorize)
    }

    pub fn add_category(&mut self, state: &mut CategoryState, name: &str) -> Result<EditOutcome, EditError> {
        let added = state.categories.add(name)?;
        tracing::info!(category = %added, "category added");
        Ok(EditOutcome::Recategorize)
    }
}

/// Overrides every transaction with the same merchant and type as `tx`.
/// `category` must name an existing category (case-insensitive).
pub fn override_merchant_type(
    state: &mut CategoryState,
    tx: &Transaction,
    category: &str,
) -> Result<EditOutcome, EditError> {
    let category = resolve_category(&state.categories, category)?;
    let key = OverrideKey::for_type_of(tx);
    state.overrides.set(key.clone(), &category);
    let mut moved = 0;
    for other in state
        .transactions
        .iter_mut()
        .filter(|t| OverrideKey::for_type_of(t) == key)
    {
        other.category = Some(category.clone());
        moved += 1;
    }
    tracing::info!(key = %key, category = %category, transactions = moved, "merchant override set");
    Ok(EditOutcome::Applied)
}

/// Overrides exactly one transaction.
pub fn override_single_transaction(
    state: &mut CategoryState,
    tx: &Transaction,
    category: &str,
) -> Result<EditOutcome, EditError> {
    let category = resolve_category(&state.categories, category)?;
    let key = OverrideKey::single_transaction(tx);
    state.overrides.set(key.clone(), &category);
    for other in state
        .transactions
        .iter_mut()
        .filter(|t| OverrideKey::single_transaction(t) == key)
    {
        other.category = Some(category.clone());
    }
    tracing::info!(key = %key, category = %category, "transaction override set");
    Ok(EditOutcome::Applied)
}

fn resolve_category(categories: &CategorySet, raw: &str) -> Result<String, EditError> {
    categories
        .find(raw)
        .map(str::to_string)
        .ok_or_else(|| CategoryError::NotFound(raw.trim().to_string()).into())
}

fn relabel(transactions: &mut [Transaction], from: &str, to: &str) -> usize {
    let mut moved = 0;
    for tx in transactions
        .iter_mut()
        .filter(|t| t.category_name().map(str::trim) == Some(from))
    {
        tx.category = Some(to.to_string());
        moved += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendiq_core::Direction;

    fn tx(merchant: &str, category: &str) -> Transaction {
        Transaction::new("02/01/2026", "POS", merchant, Some(-4.0), Direction::Debit).with_category(category)
    }

    fn state(categories: &[&str], txs: Vec<Transaction>) -> CategoryState {
        CategoryState {
            categories: CategorySet::from_names(categories.iter().copied()),
            overrides: OverrideStore::new(),
            transactions: txs,
        }
    }

    #[test]
    fn fallback_cannot_be_renamed_or_deleted() {
        let mut st = state(&["Fees"], vec![]);
        let mut editor = CategoryEditor::new();
        assert_eq!(
            editor.start_rename(&st, "Other"),
            Err(EditError::Reserved("Other".into()))
        );
        assert_eq!(
            editor.delete_category(&mut st, " Other "),
            Err(EditError::Reserved("Other".into()))
        );
        assert!(st.categories.contains("Other"));
    }

    #[test]
    fn rename_rewrites_everything() {
        let mut st = state(&["Groceries", "Fees"], vec![tx("Lidl", "Groceries"), tx("Bank", "Fees")]);
        st.overrides.set(OverrideKey::merchant_type("Lidl", "POS"), "Groceries");
        let mut editor = CategoryEditor::new();
        editor.start_rename(&st, "Groceries").unwrap();
        assert_eq!(editor.state(), &EditState::Editing("Groceries".into()));

        let outcome = editor.apply_rename(&mut st, "Food").unwrap();
        assert_eq!(outcome, EditOutcome::Recategorize);
        assert_eq!(editor.state(), &EditState::Idle);
        assert_eq!(st.categories.as_slice(), &["Food", "Fees", "Other"]);
        assert_eq!(st.overrides.get(&OverrideKey::merchant_type("Lidl", "POS")), Some("Food"));
        assert_eq!(st.overrides.extract_aliases().get("Groceries"), Some("Food"));
        assert_eq!(st.transactions[0].category_name(), Some("Food"));
        assert_eq!(st.transactions[1].category_name(), Some("Fees"));
    }

    #[test]
    fn blank_or_same_rename_is_a_no_op() {
        let mut st = state(&["Fees"], vec![]);
        let mut editor = CategoryEditor::new();
        editor.start_rename(&st, "Fees").unwrap();
        assert_eq!(editor.apply_rename(&mut st, "  ").unwrap(), EditOutcome::Unchanged);
        assert_eq!(editor.state(), &EditState::Idle);
        editor.start_rename(&st, "Fees").unwrap();
        assert_eq!(editor.apply_rename(&mut st, "Fees").unwrap(), EditOutcome::Unchanged);
        assert!(st.overrides.is_empty());
    }

    #[test]
    fn cancel_returns_to_idle() {
        let st = state(&["Fees"], vec![]);
        let mut editor = CategoryEditor::new();
        editor.start_rename(&st, "Fees").unwrap();
        assert_eq!(
            editor.start_rename(&st, "Fees"),
            Err(EditError::Busy("Fees".into()))
        );
        editor.cancel_rename();
        assert_eq!(editor.state(), &EditState::Idle);
    }

    #[test]
    fn apply_without_start_is_an_error() {
        let mut st = state(&["Fees"], vec![]);
        assert_eq!(
            CategoryEditor::new().apply_rename(&mut st, "X"),
            Err(EditError::NotEditing)
        );
    }

    #[test]
    fn rename_onto_existing_merges() {
        let mut st = state(&["Groceries", "Food"], vec![tx("Lidl", "Groceries")]);
        let mut editor = CategoryEditor::new();
        editor.start_rename(&st, "Groceries").unwrap();
        editor.apply_rename(&mut st, "food").unwrap();
        assert_eq!(st.categories.as_slice(), &["Food", "Other"]);
        assert_eq!(st.transactions[0].category_name(), Some("Food"));
        assert_eq!(st.overrides.extract_aliases().get("Groceries"), Some("Food"));
    }

    #[test]
    fn rename_back_and_forth_leaves_no_cycle() {
        let mut st = state(&["A"], vec![]);
        let mut editor = CategoryEditor::new();
        editor.start_rename(&st, "A").unwrap();
        editor.apply_rename(&mut st, "B").unwrap();
        editor.start_rename(&st, "B").unwrap();
        editor.apply_rename(&mut st, "A").unwrap();
        let aliases = st.overrides.extract_aliases();
        assert_eq!(aliases.get("B"), Some("A"));
        assert_eq!(aliases.get("A"), None);
    }

    #[test]
    fn delete_shopping_cascade() {
        let mut st = state(&["Shopping", "Fees"], vec![tx("Mall", "Shopping"), tx("Bank", "Fees")]);
        st.overrides = OverrideStore::from_wire_pairs([
            ("A||B", "Shopping"),
            ("__CATEGORY_ALIAS__||Old", "Shopping"),
        ]);
        let outcome = CategoryEditor::new().delete_category(&mut st, "Shopping").unwrap();
        assert_eq!(outcome, EditOutcome::Recategorize);
        assert_eq!(st.overrides.get(&OverrideKey::merchant_type("A", "B")), Some("Other"));
        assert!(st.overrides.extract_aliases().is_empty());
        assert_eq!(st.transactions[0].category_name(), Some("Other"));
        assert_eq!(st.transactions[1].category_name(), Some("Fees"));
        assert!(!st.categories.contains("Shopping"));
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let mut st = state(&["Fees"], vec![]);
        assert_eq!(
            CategoryEditor::new().delete_category(&mut st, "Nope"),
            Err(EditError::Category(CategoryError::NotFound("Nope".into())))
        );
    }

    #[test]
    fn add_refuses_duplicates() {
        let mut st = state(&["Fees"], vec![]);
        let mut editor = CategoryEditor::new();
        assert_eq!(editor.add_category(&mut st, " Travel ").unwrap(), EditOutcome::Recategorize);
        assert_eq!(
            editor.add_category(&mut st, "travel"),
            Err(EditError::Category(CategoryError::Duplicate("Travel".into())))
        );
        assert_eq!(
            editor.add_category(&mut st, ""),
            Err(EditError::Category(CategoryError::EmptyName))
        );
    }

    #[test]
    fn fallback_survives_any_sequence() {
        let mut st = state(&["A", "B"], vec![]);
        let mut editor = CategoryEditor::new();
        editor.add_category(&mut st, "C").unwrap();
        editor.start_rename(&st, "A").unwrap();
        editor.apply_rename(&mut st, "other").unwrap();
        editor.delete_category(&mut st, "B").unwrap();
        assert!(st.categories.contains("Other"));
        assert_eq!(st.categories.as_slice(), &["Other", "C"]);
    }

    #[test]
    fn merchant_override_updates_matching_rows() {
        let mut st = state(&["Groceries", "Fees"], vec![tx("Lidl", "Fees"), tx("Lidl", "Fees"), tx("Bank", "Fees")]);
        let target = st.transactions[0].clone();
        let outcome = override_merchant_type(&mut st, &target, "groceries").unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(st.overrides.get(&OverrideKey::for_type_of(&target)), Some("Groceries"));
        let cats: Vec<_> = st.transactions.iter().filter_map(Transaction::category_name).collect();
        assert_eq!(cats, vec!["Groceries", "Groceries", "Fees"]);
    }

    #[test]
    fn single_override_touches_one_row() {
        let mut st = state(&["Groceries", "Fees"], vec![tx("Lidl", "Fees"), tx("Lidl", "Fees")]);
        st.transactions[1].amount = Some(-9.0);
        let target = st.transactions[1].clone();
        override_single_transaction(&mut st, &target, "Groceries").unwrap();
        assert_eq!(st.transactions[0].category_name(), Some("Fees"));
        assert_eq!(st.transactions[1].category_name(), Some("Groceries"));
    }

    #[test]
    fn override_to_unknown_category_is_refused() {
        let mut st = state(&["Fees"], vec![tx("Lidl", "Fees")]);
        let target = st.transactions[0].clone();
        assert!(override_merchant_type(&mut st, &target, "Nope").is_err());
        assert!(st.overrides.is_empty());
    }
}
