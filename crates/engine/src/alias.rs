use spendiq_core::{migrate_legacy_name, CategorySet, Transaction};

use crate::overrides::OverrideStore;
use crate::util::fold;

/// Ordered `old -> new` category renames.
///
/// Lookups compare old names case-insensitively; the first match in insertion
/// order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: Vec<(String, String)>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `old -> new`. An existing entry for the same old name (exact)
    /// is overwritten in place.
    pub fn insert(&mut self, old: &str, new: &str) {
        match self.entries.iter_mut().find(|(o, _)| o == old) {
            Some(entry) => entry.1 = new.to_string(),
            None => self.entries.push((old.to_string(), new.to_string())),
        }
    }

    /// Layers `other` on top of `self`: on conflicts `other` wins.
    pub fn merged_with(mut self, other: &AliasMap) -> AliasMap {
        for (old, new) in &other.entries {
            self.insert(old, new);
        }
        self
    }

    /// Target of the first entry whose old name matches `category`.
    pub fn get(&self, category: &str) -> Option<&str> {
        let wanted = fold(category);
        self.entries
            .iter()
            .find(|(old, _)| fold(old) == wanted)
            .map(|(_, new)| new.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Guesses renames that were never recorded, for data categorized before
/// renames were tracked.
pub trait InferenceStrategy: Send + Sync {
    /// `stale` holds category names in use that are missing from `categories`.
    fn infer(&self, stale: &[String], categories: &CategorySet) -> AliasMap;
}

/// Maps a stale name onto the single current category that contains it or is
/// contained by it (case-insensitive). Zero or several candidates mean the
/// name stays unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringInference;

impl InferenceStrategy for SubstringInference {
    fn infer(&self, stale: &[String], categories: &CategorySet) -> AliasMap {
        let mut aliases = AliasMap::new();
        for old in stale {
            let old_folded = fold(old);
            let mut candidates = categories.iter().filter(|current| {
                let current = fold(current);
                current.contains(&old_folded) || old_folded.contains(&current)
            });
            if let (Some(only), None) = (candidates.next(), candidates.next()) {
                aliases.insert(old, only);
            }
        }
        aliases
    }
}

/// Builds the rename map the orchestrator applies.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver<S = SubstringInference> {
    strategy: S,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: InferenceStrategy> AliasResolver<S> {
    pub fn with_strategy(strategy: S) -> Self {
        Self { strategy }
    }

    /// Inferred renames for `previous`, overlaid with the store's recorded
    /// renames (recorded ones win).
    pub fn resolve(
        &self,
        previous: &[Transaction],
        overrides: &OverrideStore,
        categories: &CategorySet,
    ) -> AliasMap {
        let stale: Vec<String> = used_categories(previous)
            .into_iter()
            .filter(|name| !categories.contains(name))
            .collect();
        let inferred = self.strategy.infer(&stale, categories);
        let explicit = overrides.extract_aliases();
        if !inferred.is_empty() {
            tracing::debug!(
                inferred = inferred.len(),
                explicit = explicit.len(),
                "resolved category aliases"
            );
        }
        inferred.merged_with(&explicit)
    }
}

/// Distinct trimmed category names on `transactions`, in first-seen order.
pub fn used_categories(transactions: &[Transaction]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for name in transactions.iter().filter_map(Transaction::category_name) {
        let name = name.trim();
        if !name.is_empty() && !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

/// Migrates one category: alias lookup, legacy rename, then fallback when the
/// result is not a current category.
pub fn apply_aliases(category: &str, aliases: &AliasMap, categories: &CategorySet) -> String {
    let renamed = aliases.get(category).unwrap_or(category);
    categories.clamp(migrate_legacy_name(renamed)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendiq_core::Direction;

    fn set(names: &[&str]) -> CategorySet {
        CategorySet::from_names(names.iter().copied())
    }

    fn tx_in(category: &str) -> Transaction {
        Transaction::new("2024-01-01", "POS", "Shop", Some(-1.0), Direction::Debit).with_category(category)
    }

    fn stale(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut map = AliasMap::new();
        map.insert("A", "B");
        map.insert("C", "D");
        map.insert("A", "E");
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![("A", "E"), ("C", "D")]);
    }

    #[test]
    fn get_is_case_insensitive_first_match() {
        let mut map = AliasMap::new();
        map.insert("groceries", "Food");
        map.insert("Groceries", "Market");
        assert_eq!(map.get(" GROCERIES "), Some("Food"));
        assert_eq!(map.get("Fees"), None);
    }

    #[test]
    fn substring_inference_single_candidate() {
        let inferred = SubstringInference.infer(&stale(&["Grocery"]), &set(&["Grocery Store", "Fees"]));
        assert_eq!(inferred.get("Grocery"), Some("Grocery Store"));
    }

    #[test]
    fn substring_inference_contained_direction() {
        let inferred = SubstringInference.infer(&stale(&["Utilities & Bills"]), &set(&["Bills"]));
        assert_eq!(inferred.get("Utilities & Bills"), Some("Bills"));
    }

    #[test]
    fn substring_inference_ambiguous_is_skipped() {
        let inferred = SubstringInference.infer(
            &stale(&["Transport"]),
            &set(&["Transport/Fuel", "Public Transport"]),
        );
        assert!(inferred.is_empty());
    }

    #[test]
    fn substring_inference_no_candidate() {
        let inferred = SubstringInference.infer(&stale(&["Pets"]), &set(&["Fees"]));
        assert!(inferred.is_empty());
    }

    #[test]
    fn explicit_beats_inferred() {
        let resolver = AliasResolver::new();
        let previous = vec![tx_in("Grocery")];
        let overrides = OverrideStore::from_wire_pairs([("__CATEGORY_ALIAS__||Grocery", "Fees")]);
        let aliases = resolver.resolve(&previous, &overrides, &set(&["Grocery Store", "Fees"]));
        assert_eq!(aliases.get("Grocery"), Some("Fees"));
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn resolve_ignores_current_categories() {
        let resolver = AliasResolver::new();
        let previous = vec![tx_in("Fees"), tx_in("Fees")];
        let aliases = resolver.resolve(&previous, &OverrideStore::new(), &set(&["Fees", "Bank Fees"]));
        assert!(aliases.is_empty());
    }

    #[test]
    fn custom_strategy_is_pluggable() {
        struct Everything;
        impl InferenceStrategy for Everything {
            fn infer(&self, stale: &[String], _categories: &CategorySet) -> AliasMap {
                let mut map = AliasMap::new();
                for s in stale {
                    map.insert(s, "Fees");
                }
                map
            }
        }
        let resolver = AliasResolver::with_strategy(Everything);
        let aliases = resolver.resolve(&[tx_in("Whatever")], &OverrideStore::new(), &set(&["Fees"]));
        assert_eq!(aliases.get("Whatever"), Some("Fees"));
    }

    #[test]
    fn apply_aliases_pipeline() {
        let categories = set(&["Food", "Restaurants"]);
        let mut aliases = AliasMap::new();
        aliases.insert("Groceries", "Food");
        assert_eq!(apply_aliases("Groceries", &aliases, &categories), "Food");
        assert_eq!(apply_aliases("Dining", &aliases, &categories), "Restaurants");
        assert_eq!(apply_aliases("Unknown", &aliases, &categories), "Other");
        assert_eq!(apply_aliases("Food", &aliases, &categories), "Food");
    }

    #[test]
    fn apply_aliases_is_stable_on_migrated_values() {
        let categories = set(&["Food"]);
        let mut aliases = AliasMap::new();
        aliases.insert("Groceries", "Food");
        let once = apply_aliases("Groceries", &aliases, &categories);
        let twice = apply_aliases(&once, &aliases, &categories);
        assert_eq!(once, twice);
    }

    #[test]
    fn used_categories_dedupes_in_order() {
        let txs = vec![tx_in(" B "), tx_in("A"), tx_in("B"), tx_in("  ")];
        assert_eq!(used_categories(&txs), vec!["B".to_string(), "A".to_string()]);
    }
}
