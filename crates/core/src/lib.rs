pub mod category;
pub mod money;
pub mod transaction;

pub use category::{
    is_fallback, migrate_legacy_name, normalize_category_name, CategoryError, CategorySet,
    DEFAULT_CATEGORIES, FALLBACK_CATEGORY, LEGACY_DINING_CATEGORY, RESTAURANTS_CATEGORY,
};
pub use money::Money;
pub use transaction::{Direction, StatementDetails, Transaction};
