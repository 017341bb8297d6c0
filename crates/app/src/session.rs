use serde::{Deserialize, Serialize};
use spendiq_core::{migrate_legacy_name, CategorySet, StatementDetails, Transaction};
use spendiq_engine::{
    override_merchant_type, override_single_transaction, summarize, summarize_by_account,
    AccountSummary, BaseCategorizer, CategorizeError, CategoryEditor, CategoryState, EditError,
    EditOutcome, EditState, Orchestrator, OverrideStore, ParsedStatement, PassInput, SavingsAccounts,
    SavingsSummary, StatementError, StatementParser,
};
use spendiq_storage::{
    savings_accounts_from, set_savings_accounts, CacheStore, DashboardCache, DashboardSnapshot,
    IdentityContext, Settings, StoreError, UserDataStore,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Categorize(#[from] CategorizeError),
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("Failed to save user data: {0}")]
    Store(#[from] StoreError),
    #[error("No transaction at position {0}")]
    NoSuchTransaction(usize),
}

/// What happens to in-memory state when persisting it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitPolicy {
    /// Keep the edit; the error is still reported.
    #[default]
    #[serde(rename = "optimistic")]
    Optimistic,
    /// Restore the state from before the edit.
    #[serde(rename = "rollback")]
    RollbackOnFailure,
}

/// Result of a categorization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Applied { transactions: usize },
    /// A newer pass started while this one was waiting; its result was dropped.
    Superseded,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    data: CategoryState,
    statement_details: Option<StatementDetails>,
    settings: Settings,
    savings_accounts: SavingsAccounts,
    editor: CategoryEditor,
    /// Bumped by every pass, restore and sign-out; a pass only lands while
    /// its own value is current.
    generation: u64,
    /// The generation of the last pass that finished; differs from
    /// `generation` while a pass is running.
    settled: u64,
    /// Bumped whenever categories, overrides or settings change.
    revision: u64,
}

/// The parts of [`SessionState`] a failed commit can restore.
#[derive(Debug, Clone)]
struct Checkpoint {
    data: CategoryState,
    settings: Settings,
    savings_accounts: SavingsAccounts,
}

impl SessionState {
    fn pass_in_flight(&self) -> bool {
        self.generation != self.settled
    }

    /// Starts a new generation with no pass running.
    fn settle_new_generation(&mut self) {
        self.generation += 1;
        self.settled = self.generation;
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            data: self.data.clone(),
            settings: self.settings.clone(),
            savings_accounts: self.savings_accounts.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.data = checkpoint.data;
        self.settings = checkpoint.settings;
        self.savings_accounts = checkpoint.savings_accounts;
        self.revision += 1;
    }

    fn dashboard(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            transactions: self.data.transactions.clone(),
            statement_details: self.statement_details.clone(),
        }
    }
}

/// Which collections a commit writes.
#[derive(Debug, Clone, Copy, Default)]
struct Dirty {
    categories: bool,
    overrides: bool,
    settings: bool,
}

impl Dirty {
    const CATEGORIES_AND_OVERRIDES: Dirty = Dirty {
        categories: true,
        overrides: true,
        settings: false,
    };
    const OVERRIDES: Dirty = Dirty {
        categories: false,
        overrides: true,
        settings: false,
    };
    const SETTINGS: Dirty = Dirty {
        categories: false,
        overrides: false,
        settings: true,
    };
}

/// Read-only copy of what the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub transactions: Vec<Transaction>,
    pub statement_details: Option<StatementDetails>,
    pub categories: CategorySet,
    pub overrides: OverrideStore,
    pub savings_accounts: SavingsAccounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavingsReport {
    pub overall: SavingsSummary,
    pub accounts: Vec<AccountSummary>,
}

/// One user's working session: the categorized statement plus their
/// categories, overrides and settings.
///
/// Cloning is cheap and clones share state. Collaborator and persistence calls
/// run without holding the state lock; edits are last-write-wins.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    orchestrator: Arc<Orchestrator<Arc<dyn BaseCategorizer>>>,
    store: Arc<dyn UserDataStore>,
    cache: Arc<DashboardCache<Arc<dyn CacheStore>>>,
    identity: IdentityContext,
    policy: CommitPolicy,
    default_categories: CategorySet,
}

impl Session {
    pub fn new(
        categorizer: Arc<dyn BaseCategorizer>,
        store: Arc<dyn UserDataStore>,
        cache: Arc<dyn CacheStore>,
        identity: IdentityContext,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            orchestrator: Arc::new(Orchestrator::new(categorizer)),
            store,
            cache: Arc::new(DashboardCache::new(cache)),
            identity,
            policy: CommitPolicy::default(),
            default_categories: CategorySet::defaults(),
        }
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_categories(mut self, categories: CategorySet) -> Self {
        self.default_categories = categories;
        self
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub async fn view(&self) -> SessionView {
        let st = self.state.lock().await;
        SessionView {
            transactions: st.data.transactions.clone(),
            statement_details: st.statement_details.clone(),
            categories: st.data.categories.clone(),
            overrides: st.data.overrides.clone(),
            savings_accounts: st.savings_accounts.clone(),
        }
    }

    pub async fn edit_state(&self) -> EditState {
        self.state.lock().await.editor.state().clone()
    }

    // ── Loading ───────────────────────────────────────────────────────────────

    /// Replaces categories, overrides and settings with the stored ones.
    pub async fn load_user_data(&self) -> Result<(), SessionError> {
        let categories = self.store.get_categories().await?;
        let mut overrides = self.store.get_overrides().await?;
        let settings = self.store.get_settings().await?;

        let migrated = overrides.normalize_legacy();
        let savings_accounts = savings_accounts_from(&settings);

        {
            let mut st = self.state.lock().await;
            st.data.categories = categories;
            st.data.overrides = overrides.clone();
            st.settings = settings;
            st.savings_accounts = savings_accounts;
            st.revision += 1;
        }
        tracing::info!(
            overrides = overrides.len(),
            migrated,
            "user data loaded"
        );
        if migrated > 0 {
            self.store.put_overrides(&overrides).await?;
        }
        Ok(())
    }

    /// Shows the last dashboard cached for this identity. Returns the number of
    /// restored transactions.
    pub async fn restore_dashboard(&self) -> usize {
        let DashboardSnapshot {
            mut transactions,
            statement_details,
        } = self.cache.load(&self.identity);
        for tx in &mut transactions {
            if let Some(category) = tx.category.take() {
                tx.category = Some(migrate_legacy_name(&category).to_string());
            }
        }
        let count = transactions.len();
        let mut st = self.state.lock().await;
        st.settle_new_generation();
        st.data.transactions = transactions;
        st.statement_details = statement_details;
        count
    }

    // ── Categorization passes ─────────────────────────────────────────────────

    pub async fn import_document(
        &self,
        parser: &dyn StatementParser,
        document: &[u8],
    ) -> Result<PassOutcome, SessionError> {
        let parsed = parser.parse(document).await?;
        self.import(parsed).await
    }

    /// Categorizes a freshly parsed statement and replaces the current one.
    pub async fn import(&self, statement: ParsedStatement) -> Result<PassOutcome, SessionError> {
        let ParsedStatement {
            transactions,
            statement_details,
        } = statement;
        self.run_pass(transactions, Some(statement_details)).await
    }

    /// Re-runs categorization over the current transactions.
    pub async fn recategorize(&self) -> Result<PassOutcome, SessionError> {
        let transactions = self.state.lock().await.data.transactions.clone();
        self.run_pass(transactions, None).await
    }

    /// `details` replaces the statement metadata when given.
    ///
    /// A newer pass supersedes this one. User data edited while the
    /// categorizer runs makes the pass start over with the current data.
    async fn run_pass(
        &self,
        transactions: Vec<Transaction>,
        details: Option<Option<StatementDetails>>,
    ) -> Result<PassOutcome, SessionError> {
        let token = {
            let mut st = self.state.lock().await;
            st.generation += 1;
            st.generation
        };

        loop {
            let (revision, categories, overrides, savings_accounts) = {
                let st = self.state.lock().await;
                if st.generation != token {
                    return Ok(PassOutcome::Superseded);
                }
                (
                    st.revision,
                    st.data.categories.clone(),
                    st.data.overrides.clone(),
                    st.savings_accounts.clone(),
                )
            };

            let result = self
                .orchestrator
                .run(PassInput {
                    transactions: &transactions,
                    categories: &categories,
                    overrides: &overrides,
                    savings_accounts: &savings_accounts,
                })
                .await;
            let categorized = match result {
                Ok(categorized) => categorized,
                Err(err) => {
                    let mut st = self.state.lock().await;
                    if st.generation == token {
                        st.settled = token;
                    }
                    return Err(err.into());
                }
            };

            let snapshot = {
                let mut st = self.state.lock().await;
                if st.generation != token {
                    tracing::debug!(token, current = st.generation, "discarding stale categorization result");
                    return Ok(PassOutcome::Superseded);
                }
                if st.revision != revision {
                    tracing::debug!(
                        revision,
                        current = st.revision,
                        "user data changed during categorization, running again"
                    );
                    continue;
                }
                st.settled = token;
                st.data.transactions = categorized;
                if let Some(details) = details {
                    st.statement_details = details;
                }
                st.dashboard()
            };
            self.cache.save(&self.identity, &snapshot);
            tracing::info!(transactions = snapshot.transactions.len(), "categorization applied");
            return Ok(PassOutcome::Applied {
                transactions: snapshot.transactions.len(),
            });
        }
    }

    // ── Category editing ──────────────────────────────────────────────────────

    pub async fn start_rename(&self, name: &str) -> Result<(), SessionError> {
        let mut st = self.state.lock().await;
        let SessionState { data, editor, .. } = &mut *st;
        editor.start_rename(data, name)?;
        Ok(())
    }

    pub async fn cancel_rename(&self) {
        self.state.lock().await.editor.cancel_rename();
    }

    pub async fn apply_rename(&self, new_name: &str) -> Result<EditOutcome, SessionError> {
        self.edit(Dirty::CATEGORIES_AND_OVERRIDES, |st| {
            let SessionState { data, editor, .. } = st;
            editor.apply_rename(data, new_name)
        })
        .await
    }

    /// Convenience for callers without an editing UI: start and apply in one step.
    pub async fn rename_category(&self, old: &str, new_name: &str) -> Result<EditOutcome, SessionError> {
        self.start_rename(old).await?;
        self.apply_rename(new_name).await
    }

    pub async fn delete_category(&self, name: &str) -> Result<EditOutcome, SessionError> {
        self.edit(Dirty::CATEGORIES_AND_OVERRIDES, |st| {
            let SessionState { data, editor, .. } = st;
            editor.delete_category(data, name)
        })
        .await
    }

    pub async fn add_category(&self, name: &str) -> Result<EditOutcome, SessionError> {
        self.edit(
            Dirty {
                categories: true,
                ..Dirty::default()
            },
            |st| {
                let SessionState { data, editor, .. } = st;
                editor.add_category(data, name)
            },
        )
        .await
    }

    /// Overrides every transaction sharing merchant and type with the one at `index`.
    pub async fn override_merchant_type(&self, index: usize, category: &str) -> Result<EditOutcome, SessionError> {
        self.edit_transaction(index, |data, tx| override_merchant_type(data, tx, category))
            .await
    }

    pub async fn override_single_transaction(
        &self,
        index: usize,
        category: &str,
    ) -> Result<EditOutcome, SessionError> {
        self.edit_transaction(index, |data, tx| override_single_transaction(data, tx, category))
            .await
    }

    async fn edit_transaction<F>(&self, index: usize, f: F) -> Result<EditOutcome, SessionError>
    where
        F: FnOnce(&mut CategoryState, &Transaction) -> Result<EditOutcome, EditError>,
    {
        let mut failure = None;
        let outcome = self
            .edit(Dirty::OVERRIDES, |st| {
                let Some(tx) = st.data.transactions.get(index).cloned() else {
                    failure = Some(SessionError::NoSuchTransaction(index));
                    return Ok(EditOutcome::Unchanged);
                };
                f(&mut st.data, &tx)
            })
            .await?;
        match failure {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }

    // ── Savings accounts ──────────────────────────────────────────────────────

    pub async fn add_savings_account(&self, account: &str) -> Result<EditOutcome, SessionError> {
        self.edit_savings(|accounts| accounts.add(account)).await
    }

    pub async fn remove_savings_account(&self, account: &str) -> Result<EditOutcome, SessionError> {
        self.edit_savings(|accounts| accounts.remove(account)).await
    }

    async fn edit_savings<F>(&self, f: F) -> Result<EditOutcome, SessionError>
    where
        F: FnOnce(&mut SavingsAccounts) -> bool,
    {
        let mut encode_error = None;
        let outcome = self
            .edit(Dirty::SETTINGS, |st| {
                if !f(&mut st.savings_accounts) {
                    return Ok(EditOutcome::Unchanged);
                }
                if let Err(err) = set_savings_accounts(&mut st.settings, &st.savings_accounts) {
                    encode_error = Some(err);
                }
                Ok(EditOutcome::Recategorize)
            })
            .await?;
        match encode_error {
            Some(err) => Err(err.into()),
            None => Ok(outcome),
        }
    }

    pub async fn savings_report(&self) -> SavingsReport {
        let st = self.state.lock().await;
        SavingsReport {
            overall: summarize(&st.data.transactions, &st.savings_accounts),
            accounts: summarize_by_account(&st.data.transactions, &st.savings_accounts),
        }
    }

    // ── Account lifecycle ─────────────────────────────────────────────────────

    /// Restores default categories and drops all overrides and settings.
    pub async fn reset_data(&self) -> Result<PassOutcome, SessionError> {
        self.store.reset_data(&self.default_categories).await?;
        let has_transactions = {
            let mut st = self.state.lock().await;
            st.data.categories = self.default_categories.clone();
            st.data.overrides = OverrideStore::new();
            st.settings = Settings::new();
            st.savings_accounts = SavingsAccounts::new();
            st.editor.cancel_rename();
            st.revision += 1;
            !st.data.transactions.is_empty()
        };
        tracing::info!("user data reset");
        if has_transactions {
            self.recategorize().await
        } else {
            Ok(PassOutcome::Applied { transactions: 0 })
        }
    }

    /// Forgets the cached dashboard and everything in memory.
    pub async fn sign_out(&self) {
        self.cache.clear(&self.identity);
        let mut st = self.state.lock().await;
        let generation = st.generation + 1;
        *st = SessionState {
            generation,
            settled: generation,
            ..SessionState::default()
        };
        tracing::info!("signed out");
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    /// Applies `f` to the state, persists what it marks dirty and re-runs
    /// categorization when asked to.
    ///
    /// The re-run also happens when persisting fails but the policy keeps the
    /// edit; the store error is returned afterwards. No re-run is started while
    /// another pass is running, since that pass starts over with the edit.
    async fn edit<F>(&self, dirty: Dirty, f: F) -> Result<EditOutcome, SessionError>
    where
        F: FnOnce(&mut SessionState) -> Result<EditOutcome, EditError>,
    {
        let (outcome, checkpoint, snapshot, pass_in_flight) = {
            let mut st = self.state.lock().await;
            let checkpoint = st.checkpoint();
            let outcome = f(&mut *st)?;
            if outcome.changed() {
                st.revision += 1;
            }
            (outcome, checkpoint, st.dashboard(), st.pass_in_flight())
        };
        if !outcome.changed() {
            return Ok(outcome);
        }
        self.cache.save(&self.identity, &snapshot);

        let committed = self.commit(dirty, checkpoint).await;
        let keeps_edit = committed.is_ok() || self.policy == CommitPolicy::Optimistic;
        // A running pass notices the new revision and starts over on its own.
        if outcome == EditOutcome::Recategorize && keeps_edit && !pass_in_flight {
            let rerun = self.recategorize().await;
            committed?;
            rerun?;
        } else {
            committed?;
        }
        Ok(outcome)
    }

    /// Writes the dirty collections. On failure the error is returned and the
    /// policy decides whether in-memory state keeps the edit.
    async fn commit(&self, dirty: Dirty, checkpoint: Checkpoint) -> Result<(), SessionError> {
        let (categories, overrides, settings) = {
            let st = self.state.lock().await;
            (
                dirty.categories.then(|| st.data.categories.clone()),
                dirty.overrides.then(|| st.data.overrides.clone()),
                dirty.settings.then(|| st.settings.clone()),
            )
        };

        let result = async {
            if let Some(categories) = &categories {
                self.store.put_categories(categories).await?;
            }
            if let Some(overrides) = &overrides {
                self.store.put_overrides(overrides).await?;
            }
            if let Some(settings) = &settings {
                self.store.put_settings(settings).await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;

        let Err(err) = result else {
            return Ok(());
        };
        match self.policy {
            CommitPolicy::Optimistic => {
                tracing::warn!(error = %err, "persisting user data failed; keeping in-memory changes");
            }
            CommitPolicy::RollbackOnFailure => {
                tracing::warn!(error = %err, "persisting user data failed; rolling back");
                let snapshot = {
                    let mut st = self.state.lock().await;
                    st.restore(checkpoint);
                    st.dashboard()
                };
                self.cache.save(&self.identity, &snapshot);
            }
        }
        Err(err.into())
    }
}
