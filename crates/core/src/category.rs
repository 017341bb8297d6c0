use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved category every transaction falls back to. Cannot be renamed or deleted.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Legacy name that is always migrated to [`RESTAURANTS_CATEGORY`].
pub const LEGACY_DINING_CATEGORY: &str = "Dining";
pub const RESTAURANTS_CATEGORY: &str = "Restaurants";

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Groceries",
    "Restaurants",
    "Transport",
    "Transport/Fuel",
    "Utilities",
    "Internet/Phone",
    "Shopping",
    "Home/DIY",
    "Subscriptions",
    "Entertainment",
    "Bills",
    "Fees",
    "Taxes/Fees",
    "Loans",
    "Savings",
    "Transfers",
    "Other",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("Category name is empty")]
    EmptyName,
    #[error("Category already exists: {0}")]
    Duplicate(String),
    #[error("Category not found: {0}")]
    NotFound(String),
    #[error("Category '{0}' is reserved")]
    Reserved(String),
}

/// Rewrites the legacy `Dining` name; every other name passes through.
pub fn migrate_legacy_name(name: &str) -> &str {
    if name == LEGACY_DINING_CATEGORY {
        RESTAURANTS_CATEGORY
    } else {
        name
    }
}

/// Trims and migrates a user-supplied name. Returns `None` for blank input.
pub fn normalize_category_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() {
        return None;
    }
    Some(migrate_legacy_name(name).to_string())
}

pub fn is_fallback(name: &str) -> bool {
    name.trim() == FALLBACK_CATEGORY
}

/// The names currently available for assignment.
///
/// Invariants: names are trimmed, unique under case-insensitive comparison,
/// never `Dining`, and [`FALLBACK_CATEGORY`] is always present. Display order
/// is the order names were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    /// Builds a sanitized set: blanks dropped, legacy names migrated, duplicates
    /// (case-insensitive, first spelling wins) removed, fallback appended.
    pub fn from_names<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = CategorySet { names: Vec::new() };
        for name in raw {
            if let Some(name) = normalize_category_name(name.as_ref()) {
                if set.find(&name).is_none() {
                    set.names.push(name);
                }
            }
        }
        set.ensure_fallback();
        set
    }

    pub fn defaults() -> Self {
        Self::from_names(DEFAULT_CATEGORIES.iter().copied())
    }

    fn ensure_fallback(&mut self) {
        if !self.contains(FALLBACK_CATEGORY) {
            self.names.push(FALLBACK_CATEGORY.to_string());
        }
    }

    /// Exact membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Case-insensitive lookup, returning the stored spelling.
    pub fn find(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.names
            .iter()
            .find(|n| n.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    /// Adds a new category and returns the stored name.
    pub fn add(&mut self, raw: &str) -> Result<String, CategoryError> {
        let name = normalize_category_name(raw).ok_or(CategoryError::EmptyName)?;
        if let Some(existing) = self.find(&name) {
            return Err(CategoryError::Duplicate(existing.to_string()));
        }
        self.names.push(name.clone());
        Ok(name)
    }

    /// Renames `old` in place. When `new` already exists under another entry the
    /// two are merged and `old` disappears. Returns the surviving name.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<String, CategoryError> {
        if is_fallback(old) {
            return Err(CategoryError::Reserved(FALLBACK_CATEGORY.to_string()));
        }
        let new = normalize_category_name(new).ok_or(CategoryError::EmptyName)?;
        let idx = self
            .names
            .iter()
            .position(|n| n == old.trim())
            .ok_or_else(|| CategoryError::NotFound(old.to_string()))?;

        let merge_target = self
            .names
            .iter()
            .enumerate()
            .find(|(i, n)| *i != idx && n.to_lowercase() == new.to_lowercase())
            .map(|(_, n)| n.clone());

        match merge_target {
            Some(existing) => {
                self.names.remove(idx);
                Ok(existing)
            }
            None => {
                self.names[idx] = new.clone();
                Ok(new)
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<(), CategoryError> {
        if is_fallback(name) {
            return Err(CategoryError::Reserved(FALLBACK_CATEGORY.to_string()));
        }
        let idx = self
            .names
            .iter()
            .position(|n| n == name.trim())
            .ok_or_else(|| CategoryError::NotFound(name.to_string()))?;
        self.names.remove(idx);
        Ok(())
    }

    /// Maps a category onto the set: members pass through, anything else
    /// becomes the fallback.
    pub fn clamp<'a>(&self, category: &'a str) -> &'a str {
        if self.contains(category) || !self.contains(FALLBACK_CATEGORY) {
            category
        } else {
            FALLBACK_CATEGORY
        }
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl From<Vec<String>> for CategorySet {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<CategorySet> for Vec<String> {
    fn from(set: CategorySet) -> Self {
        set.names
    }
}
