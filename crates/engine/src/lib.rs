pub mod alias;
pub mod categorizer;
pub mod editor;
pub mod orchestrator;
pub mod overrides;
pub mod rules;
pub mod savings;
pub mod statement;
pub mod util;

pub use alias::{apply_aliases, used_categories, AliasMap, AliasResolver, InferenceStrategy, SubstringInference};
pub use categorizer::{BaseCategorizer, CategorizeError, MockCategorizer};
pub use editor::{
    override_merchant_type, override_single_transaction, CategoryEditor, CategoryState, EditError,
    EditOutcome, EditState,
};
pub use orchestrator::{Orchestrator, PassInput};
pub use overrides::{OverrideKey, OverrideStore, ALIAS_PREFIX, KEY_DELIMITER};
pub use rules::{CategoryRule, MatchType, RuleCategorizer};
pub use savings::{
    matches, matches_any, summarize, summarize_by_account, AccountSummary, SavingsAccounts, SavingsFlow,
    SavingsSummary,
};
pub use statement::{JsonStatementParser, ParsedStatement, StatementError, StatementParser};
