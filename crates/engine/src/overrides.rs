use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use spendiq_core::{migrate_legacy_name, Transaction, FALLBACK_CATEGORY};
use std::fmt;

use crate::alias::AliasMap;

/// Separator between the segments of a persisted override key.
pub const KEY_DELIMITER: &str = "||";

/// First segment of keys that record a category rename.
pub const ALIAS_PREFIX: &str = "__CATEGORY_ALIAS__";

/// What an override applies to.
///
/// Constructors trim their inputs; comparison is exact and case-sensitive.
/// The delimited string form only exists at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OverrideKey {
    /// Every transaction with this merchant and type (statement title).
    MerchantType { merchant: String, tx_type: String },
    /// One specific transaction.
    SingleTransaction {
        merchant: String,
        title: String,
        date: String,
        amount: String,
    },
    /// A category rename: `old_name` now means the entry's value.
    Alias { old_name: String },
    /// A key this version does not understand, kept verbatim.
    Other(String),
}

impl OverrideKey {
    pub fn merchant_type(merchant: &str, tx_type: &str) -> Self {
        OverrideKey::MerchantType {
            merchant: merchant.trim().to_string(),
            tx_type: tx_type.trim().to_string(),
        }
    }

    /// Merchant+type key of a transaction; its title is the type.
    pub fn for_type_of(tx: &Transaction) -> Self {
        Self::merchant_type(&tx.merchant, &tx.title)
    }

    /// Single-transaction key. Amounts are rounded to two decimals, so amounts
    /// that differ by less than a cent share a key.
    pub fn single_transaction(tx: &Transaction) -> Self {
        OverrideKey::SingleTransaction {
            merchant: tx.merchant.trim().to_string(),
            title: tx.title.trim().to_string(),
            date: tx.date.trim().to_string(),
            amount: tx.amount_key(),
        }
    }

    pub fn alias(old_name: &str) -> Self {
        OverrideKey::Alias {
            old_name: old_name.trim().to_string(),
        }
    }

    /// Reads a persisted key. Never fails: unknown shapes become [`OverrideKey::Other`].
    pub fn parse(raw: &str) -> Self {
        if let Some((head, rest)) = raw.split_once(KEY_DELIMITER) {
            if head == ALIAS_PREFIX {
                return OverrideKey::Alias {
                    old_name: rest.to_string(),
                };
            }
        }
        let segments: Vec<&str> = raw.split(KEY_DELIMITER).collect();
        match segments.as_slice() {
            [merchant, tx_type] => OverrideKey::MerchantType {
                merchant: merchant.to_string(),
                tx_type: tx_type.to_string(),
            },
            [merchant, title, date, amount] => OverrideKey::SingleTransaction {
                merchant: merchant.to_string(),
                title: title.to_string(),
                date: date.to_string(),
                amount: amount.to_string(),
            },
            _ => OverrideKey::Other(raw.to_string()),
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            OverrideKey::MerchantType { merchant, tx_type } => {
                [merchant.as_str(), tx_type.as_str()].join(KEY_DELIMITER)
            }
            OverrideKey::SingleTransaction {
                merchant,
                title,
                date,
                amount,
            } => [merchant.as_str(), title.as_str(), date.as_str(), amount.as_str()].join(KEY_DELIMITER),
            OverrideKey::Alias { old_name } => [ALIAS_PREFIX, old_name.as_str()].join(KEY_DELIMITER),
            OverrideKey::Other(raw) => raw.clone(),
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, OverrideKey::Alias { .. })
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// User corrections and recorded renames, in insertion order.
///
/// Serialized as a JSON object of wire keys, preserving entry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    entries: Vec<(OverrideKey, String)>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_wire_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut store = Self::new();
        for (k, v) in pairs {
            store.set(OverrideKey::parse(k.as_ref()), v.as_ref());
        }
        store
    }

    pub fn to_wire_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_wire(), v.clone()))
            .collect()
    }

    /// Inserts or overwrites. An overwritten entry keeps its position.
    /// Blank categories fall back to `Other` except on alias keys, where a
    /// blank target stays blank and is never treated as a rename. `Dining`
    /// is migrated.
    pub fn set(&mut self, key: OverrideKey, category: &str) {
        let category = match category.trim() {
            "" if key.is_alias() => "",
            "" => FALLBACK_CATEGORY,
            c => migrate_legacy_name(c),
        }
        .to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = category,
            None => self.entries.push((key, category)),
        }
    }

    pub fn get(&self, key: &OverrideKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &OverrideKey) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OverrideKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The override a base categorizer must honor for `tx`, if any.
    /// A single-transaction override beats a merchant+type override.
    pub fn lookup(&self, tx: &Transaction) -> Option<&str> {
        self.get(&OverrideKey::single_transaction(tx))
            .or_else(|| self.get(&OverrideKey::for_type_of(tx)))
    }

    /// Recorded renames as `old -> new`, skipping entries with a blank side.
    pub fn extract_aliases(&self) -> AliasMap {
        let mut aliases = AliasMap::new();
        for (key, new_name) in &self.entries {
            if let OverrideKey::Alias { old_name } = key {
                let (old, new) = (old_name.trim(), new_name.trim());
                if !old.is_empty() && !new.is_empty() {
                    aliases.insert(old, new);
                }
            }
        }
        aliases
    }

    /// Points every entry whose value is `old` at `new`. Returns the count.
    pub fn rename_values(&mut self, old: &str, new: &str) -> usize {
        let mut changed = 0;
        for (_, value) in self.entries.iter_mut().filter(|(_, v)| v == old) {
            *value = new.to_string();
            changed += 1;
        }
        changed
    }

    /// Cascade for a deleted category: drops aliases from or to it and
    /// rewrites other overrides targeting it to the fallback. Keys that only
    /// mention the name are untouched.
    pub fn delete_category(&mut self, name: &str) {
        let name = name.trim();
        self.entries.retain(|(key, value)| match key {
            OverrideKey::Alias { old_name } => old_name.trim() != name && value != name,
            _ => true,
        });
        self.rename_values(name, FALLBACK_CATEGORY);
    }

    /// Rewrites legacy `Dining` values. Returns the number of entries changed.
    pub fn normalize_legacy(&mut self) -> usize {
        let mut changed = 0;
        for (_, value) in &mut self.entries {
            let migrated = migrate_legacy_name(value);
            if migrated != value.as_str() {
                *value = migrated.to_string();
                changed += 1;
            }
        }
        changed
    }
}

impl Serialize for OverrideStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(&key.to_wire(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OverrideStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = OverrideStore;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of override keys to category names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut store = OverrideStore::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    store.set(OverrideKey::parse(&key), &value);
                }
                Ok(store)
            }
        }

        deserializer.deserialize_map(StoreVisitor)
    }
}
