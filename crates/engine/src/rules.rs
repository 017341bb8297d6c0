use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use spendiq_core::{Direction, Transaction, FALLBACK_CATEGORY};

use crate::categorizer::{BaseCategorizer, CategorizeError};
use crate::overrides::OverrideStore;
use crate::savings::{self, SavingsAccounts};
use crate::util::{mask_account, normalize_account};

pub const SAVINGS_CATEGORY: &str = "Savings";
pub const LOANS_CATEGORY: &str = "Loans";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub category: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// Built-in rules, checked top to bottom against `"<title> <merchant>"`.
const DEFAULT_RULES: &[(&str, &str)] = &[
    (r"\b(engie)\b", "Utilities"),
    (r"\b(digi|digi romania)\b", "Internet/Phone"),
    (r"\b(orange)\b", "Internet/Phone"),
    (r"\b(hidroelectrica)\b", "Utilities"),
    (r"\b(ghiseul\.ro)\b", "Taxes/Fees"),
    (r"\b(lidl)\b", "Groceries"),
    (r"\b(profi)\b", "Groceries"),
    (r"\b(carrefour)\b", "Groceries"),
    (r"\b(auchan)\b", "Groceries"),
    (r"\b(mol|rompetrol)\b", "Transport/Fuel"),
    (r"\b(rat\s+craiova)\b", "Transport"),
    (r"\b(emag|payu\*emag|twisto_emag)\b", "Shopping"),
    (r"\b(temu|aliexpress|trendyol|answear)\b", "Shopping"),
    (r"\b(dedeman|leroy merlin|jumbo)\b", "Home/DIY"),
    (r"\b(kfc|mcd|burger king)\b", "Restaurants"),
    (r"\b(netflix)\b", "Subscriptions"),
    (r"\b(spotify)\b", "Subscriptions"),
    (r"\b(sk(y)?showtime)\b", "Subscriptions"),
    (r"\b(amazon prime)\b", "Subscriptions"),
    (r"\b(google \*youtubepremium|youtubepremium)\b", "Subscriptions"),
    (r"\b(steam|steamgames\.com|steam purchase)\b", "Entertainment"),
    (r"\b(apple\.com/bill)\b", "Subscriptions"),
    (r"\b(openai \*chatgpt)\b", "Subscriptions"),
    (r"\b(transfer home'bank|transfer)\b", "Transfers"),
    (r"\b(alimentare card credit)\b", "Transfers"),
    (r"\b(plata debit direct)\b", "Bills"),
    (r"\b(tranzactie round up)\b", "Savings"),
    (r"\b(rata credit)\b", "Loans"),
    (r"\b(suma transferata din linia de credit)\b", "Loans"),
    (r"\b(taxe si comisioane)\b", "Fees"),
];

/// Top-level shape of a rules TOML file: `[[rules]]` tables.
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<CategoryRule>,
}

struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<Regex>,
}

/// Rule-based first-pass categorizer.
///
/// Precedence per transaction: single-transaction override, merchant+type
/// override, savings-account flow, rules by descending priority, `Other`.
pub struct RuleCategorizer {
    rules: Vec<CompiledRule>,
}

impl RuleCategorizer {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter_map(|rule| {
                let compiled_regex = match rule.match_type {
                    MatchType::Regex => match Regex::new(&format!("(?i){}", rule.pattern)) {
                        Ok(re) => Some(re),
                        Err(err) => {
                            tracing::warn!(rule = %rule.name, error = %err, "skipping rule with invalid regex");
                            return None;
                        }
                    },
                    MatchType::Contains | MatchType::Exact => None,
                };
                Some(CompiledRule { rule, compiled_regex })
            })
            .collect();
        // Highest priority first; equal priorities keep file order.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        let file: RuleFile =
            toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
        Ok(Self::new(file.rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category for one transaction, ignoring any category it already carries.
    pub fn categorize_one(
        &self,
        tx: &Transaction,
        overrides: &OverrideStore,
        savings_accounts: &SavingsAccounts,
    ) -> String {
        if let Some(category) = overrides.lookup(tx) {
            return category.to_string();
        }
        if let Some(account) = savings_accounts.iter().find(|a| mentions_account(tx, a)) {
            let category = match account_flow(tx, account) {
                Some(AccountFlow::IntoAccount) => SAVINGS_CATEGORY,
                Some(AccountFlow::OutOfAccount) => LOANS_CATEGORY,
                None => match tx.direction {
                    Direction::Credit => SAVINGS_CATEGORY,
                    Direction::Debit => LOANS_CATEGORY,
                },
            };
            tracing::trace!(account = %mask_account(account), category, "savings account rule");
            return category.to_string();
        }
        let text = format!("{} {}", tx.title, tx.merchant);
        self.find_matching_rule(&text)
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }

    pub fn find_matching_rule(&self, text: &str) -> Option<&CategoryRule> {
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, text))
            .map(|cr| &cr.rule)
    }
}

impl Default for RuleCategorizer {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[async_trait]
impl BaseCategorizer for RuleCategorizer {
    async fn categorize(
        &self,
        mut transactions: Vec<Transaction>,
        overrides: &OverrideStore,
        savings_accounts: &SavingsAccounts,
    ) -> Result<Vec<Transaction>, CategorizeError> {
        for tx in &mut transactions {
            let category = self.categorize_one(tx, overrides, savings_accounts);
            tx.category = Some(category);
        }
        Ok(transactions)
    }
}

pub fn default_rules() -> Vec<CategoryRule> {
    DEFAULT_RULES
        .iter()
        .map(|(pattern, category)| CategoryRule {
            name: category.to_string(),
            priority: 0,
            pattern: pattern.to_string(),
            match_type: MatchType::Regex,
            category: category.to_string(),
        })
        .collect()
}

fn rule_matches(cr: &CompiledRule, text: &str) -> bool {
    let haystack = text.to_lowercase();
    let pattern = cr.rule.pattern.to_lowercase();
    match cr.rule.match_type {
        MatchType::Contains => haystack.contains(&pattern),
        MatchType::Exact => haystack.trim() == pattern.trim(),
        MatchType::Regex => cr.compiled_regex.as_ref().is_some_and(|re| re.is_match(text)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountFlow {
    IntoAccount,
    OutOfAccount,
}

/// Role words naming the receiving side of a transfer.
const INTO_MARKERS: &[&str] = &["beneficiar", "destinatar", "catre", "cont beneficiar", "iban beneficiar"];
/// Role words naming the paying side of a transfer.
const OUT_OF_MARKERS: &[&str] = &["ordonator", "platitor", "cont ordonator", "iban ordonator", "din cont"];

/// The account appears in the title, the merchant or any raw statement line.
fn mentions_account(tx: &Transaction, account: &str) -> bool {
    let target = normalize_account(account);
    !target.is_empty()
        && (savings::matches(tx, account)
            || normalize_account(&tx.title).contains(&target)
            || normalize_account(&tx.merchant).contains(&target))
}

/// Which way money moved relative to `account`, strongest signal first:
/// "din contul" / "in contul" markers on or next to a line naming the
/// account, then a transfer whose counterparty is the account itself, then
/// beneficiary/payer role words scored around the lines naming it. `None`
/// when nothing decides.
fn account_flow(tx: &Transaction, account: &str) -> Option<AccountFlow> {
    let target = normalize_account(account);
    let lines: Vec<String> = tx.raw_lines.iter().map(|line| fold_diacritics(line)).collect();
    let mentions: Vec<bool> = tx
        .raw_lines
        .iter()
        .map(|line| normalize_account(line).contains(&target))
        .collect();
    let near = |i: usize| {
        mentions[i]
            || mentions.get(i + 1).copied().unwrap_or(false)
            || (i > 0 && mentions[i - 1])
    };

    for (i, line) in lines.iter().enumerate() {
        if !near(i) {
            continue;
        }
        // "din contul" contains "in contul", so it is checked first.
        if has_marker(line, "din contul") {
            return Some(AccountFlow::OutOfAccount);
        }
        if has_marker(line, "in contul") {
            return Some(AccountFlow::IntoAccount);
        }
    }

    if normalize_account(&tx.merchant) == target {
        match tx.method.as_deref() {
            Some("transfer_out") => return Some(AccountFlow::IntoAccount),
            Some("transfer_in") => return Some(AccountFlow::OutOfAccount),
            _ => {}
        }
    }

    let (mut into, mut out_of) = (0u32, 0u32);
    for (i, line) in lines.iter().enumerate() {
        let names_into = INTO_MARKERS.iter().any(|m| line.contains(m));
        let names_out_of = OUT_OF_MARKERS.iter().any(|m| line.contains(m));
        // Role word and account on one line count double; split key/value
        // layouts still count once.
        if mentions[i] {
            into += 2 * u32::from(names_into);
            out_of += 2 * u32::from(names_out_of);
        }
        if near(i) {
            into += u32::from(names_into);
            out_of += u32::from(names_out_of);
        }
    }
    match into.cmp(&out_of) {
        std::cmp::Ordering::Greater => Some(AccountFlow::IntoAccount),
        std::cmp::Ordering::Less => Some(AccountFlow::OutOfAccount),
        std::cmp::Ordering::Equal => None,
    }
}

/// True when `marker` appears as whole words: preceded by start or whitespace
/// and followed by whitespace, a colon or the end.
fn has_marker(line: &str, marker: &str) -> bool {
    line.match_indices(marker).any(|(start, _)| {
        let before_ok = line[..start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after_ok = line[start + marker.len()..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == ':');
        before_ok && after_ok
    })
}

fn fold_diacritics(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            'ă' | 'â' => 'a',
            'î' => 'i',
            'ș' | 'ş' => 's',
            'ț' | 'ţ' => 't',
            other => other,
        })
        .collect()
}
