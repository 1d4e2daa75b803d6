//! Transaction ingestion: pull accounts and recent transactions from the
//! aggregation API, classify each transaction, persist the results.
//!
//! Everything is sequential and best-effort. One bad classification never
//! aborts a batch; it downgrades to the conservative manual-review verdict
//! and the loop moves on.

use std::collections::HashSet;
use std::sync::Arc;

use bank_client::{BankSource, BankTransaction};
use chrono::{Duration, NaiveDate, Utc};
use classifier::{DeductionClassifier, ExpenseFacts};
use models::{Account, DeductionVerdict, Transaction};
use serde::Serialize;
use storage::{AccountRepository, TransactionRepository, UserRepository};
use thiserror::Error;

/// Transactions are imported over a fixed trailing window.
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("No bank access token stored for user {0}")]
    MissingBankToken(String),

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// What one sync run did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub accounts_linked: usize,
    pub transactions_processed: usize,
}

/// The import/classify/persist loop, over injected seams.
pub struct IngestPipeline {
    users: Arc<dyn UserRepository>,
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
    bank: Arc<dyn BankSource>,
    classifier: Arc<DeductionClassifier>,
    window_days: i64,
}

impl IngestPipeline {
    pub fn new(
        users: Arc<dyn UserRepository>,
        accounts: Arc<dyn AccountRepository>,
        transactions: Arc<dyn TransactionRepository>,
        bank: Arc<dyn BankSource>,
        classifier: Arc<DeductionClassifier>,
    ) -> Self {
        Self {
            users,
            accounts,
            transactions,
            bank,
            classifier,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    /// Run one full sync for a user.
    ///
    /// Returns the number of transactions processed; that count equals the
    /// number of persistence attempts, regardless of how many individual
    /// classification calls failed along the way.
    pub async fn sync_user(&self, user_id: &str) -> Result<SyncSummary, IngestError> {
        let user = self
            .users
            .fetch(user_id)
            .await?
            .ok_or_else(|| IngestError::UserNotFound(user_id.to_string()))?;

        let token = user
            .plaid_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IngestError::MissingBankToken(user_id.to_string()))?;

        let bank_accounts = self.bank.accounts(&token).await?;
        tracing::info!(user_id, count = bank_accounts.len(), "Fetched bank accounts");

        // One existence set per batch instead of re-querying per account.
        let known: HashSet<String> = self
            .accounts
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(|a| a.account_id)
            .collect();

        let mut accounts_linked = 0;
        for bank_account in &bank_accounts {
            if known.contains(&bank_account.account_id) {
                continue;
            }
            let account = Account {
                account_id: bank_account.account_id.clone(),
                user_id: user_id.to_string(),
                name: Some(bank_account.name.clone()),
                institution_id: None,
                last_cursor: None,
            };
            self.accounts.insert(&account).await?;
            accounts_linked += 1;
        }

        let (start_date, end_date) = trailing_window(Utc::now().date_naive(), self.window_days);

        let mut transactions_processed = 0;
        for bank_account in &bank_accounts {
            let page = self
                .bank
                .transactions(&token, &bank_account.account_id, start_date, end_date)
                .await?;

            if let Some(cursor) = &page.next_cursor {
                if let Err(err) = self.accounts.set_cursor(&bank_account.account_id, cursor).await {
                    tracing::warn!(
                        account_id = %bank_account.account_id,
                        "Failed to store sync cursor: {err:#}"
                    );
                }
            }

            for raw in page.transactions {
                let mut txn = normalize_transaction(raw);

                let verdict = match self
                    .classifier
                    .classify(&expense_facts(&txn), Some(&user))
                    .await
                {
                    Ok(verdict) => verdict,
                    Err(err) => {
                        tracing::warn!(
                            trans_id = %txn.trans_id,
                            "Classification failed, falling back to manual review: {err:#}"
                        );
                        DeductionVerdict::manual_review()
                    }
                };
                txn.apply_verdict(verdict);

                if let Err(err) = self.transactions.upsert(&txn).await {
                    tracing::error!(trans_id = %txn.trans_id, "Failed to persist transaction: {err:#}");
                }
                transactions_processed += 1;
            }
        }

        tracing::info!(user_id, accounts_linked, transactions_processed, "Sync complete");
        Ok(SyncSummary {
            accounts_linked,
            transactions_processed,
        })
    }
}

/// Map a provider ledger entry onto our transaction record: absolute amount,
/// defaulted merchant and category strings.
pub fn normalize_transaction(raw: BankTransaction) -> Transaction {
    let merchant_name = raw
        .merchant_name
        .or(raw.name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown merchant".to_string());

    let category = raw
        .category
        .filter(|labels| !labels.is_empty())
        .map(|labels| labels.join(", "))
        .unwrap_or_else(|| "Uncategorized".to_string());

    Transaction {
        trans_id: raw.transaction_id,
        account_id: raw.account_id,
        date: raw.date,
        amount: raw.amount.abs(),
        merchant_name,
        category,
        is_deductible: None,
        deductible_reason: None,
        deduction_score: None,
    }
}

fn expense_facts(txn: &Transaction) -> ExpenseFacts {
    ExpenseFacts {
        merchant_name: txn.merchant_name.clone(),
        amount: txn.amount,
        date: Some(txn.date),
        category: txn.category.clone(),
    }
}

fn trailing_window(end_date: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    (end_date - Duration::days(days), end_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use bank_client::{BankAccount, Institution, ItemAccess, TransactionsPage};
    use classifier::CompletionBackend;
    use models::{ProfileUpdate, User};

    fn test_user(token: Option<&str>) -> User {
        User {
            id: "user-1".to_string(),
            plaid_token: token.map(|t| t.to_string()),
            full_name: Some("Ada".to_string()),
            profession: Some("freelance designer".to_string()),
            income: Some(90000.0),
            state: Some("CA".to_string()),
            filing_status: Some("single".to_string()),
        }
    }

    fn raw_txn(id: &str, account_id: &str, amount: f64, merchant: Option<&str>) -> BankTransaction {
        BankTransaction {
            transaction_id: id.to_string(),
            account_id: account_id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            amount,
            name: Some("RAW BANK DESCRIPTOR".to_string()),
            merchant_name: merchant.map(|m| m.to_string()),
            category: Some(vec!["Food and Drink".to_string(), "Restaurants".to_string()]),
        }
    }

    struct FakeUsers {
        users: HashMap<String, User>,
    }

    #[async_trait]
    impl UserRepository for FakeUsers {
        async fn fetch(&self, user_id: &str) -> Result<Option<User>> {
            Ok(self.users.get(user_id).cloned())
        }
        async fn set_bank_token(&self, _user_id: &str, _access_token: &str) -> Result<()> {
            Ok(())
        }
        async fn update_profile(&self, _user_id: &str, _update: &ProfileUpdate) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeAccounts {
        existing: Mutex<Vec<Account>>,
        inserted: Mutex<Vec<Account>>,
        cursors: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AccountRepository for FakeAccounts {
        async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
            Ok(self
                .existing
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect())
        }
        async fn insert(&self, account: &Account) -> Result<()> {
            self.inserted.lock().unwrap().push(account.clone());
            Ok(())
        }
        async fn set_cursor(&self, account_id: &str, cursor: &str) -> Result<()> {
            self.cursors
                .lock()
                .unwrap()
                .push((account_id.to_string(), cursor.to_string()));
            Ok(())
        }
        async fn delete(&self, _account_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTransactions {
        persisted: Mutex<Vec<Transaction>>,
        fail_ids: HashSet<String>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl TransactionRepository for FakeTransactions {
        async fn list_for_accounts(&self, _account_ids: &[String]) -> Result<Vec<Transaction>> {
            Ok(self.persisted.lock().unwrap().clone())
        }
        async fn upsert(&self, txn: &Transaction) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            if self.fail_ids.contains(&txn.trans_id) {
                return Err(anyhow!("storage write failed"));
            }
            self.persisted.lock().unwrap().push(txn.clone());
            Ok(())
        }
        async fn delete_for_account(&self, _account_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeBank {
        accounts: Vec<BankAccount>,
        pages: HashMap<String, TransactionsPage>,
    }

    #[async_trait]
    impl BankSource for FakeBank {
        async fn exchange_public_token(&self, _public_token: &str) -> Result<ItemAccess> {
            Err(anyhow!("not used in these tests"))
        }
        async fn accounts(&self, _access_token: &str) -> Result<Vec<BankAccount>> {
            Ok(self.accounts.clone())
        }
        async fn transactions(
            &self,
            _access_token: &str,
            account_id: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<TransactionsPage> {
            Ok(self
                .pages
                .get(account_id)
                .cloned()
                .unwrap_or_else(|| TransactionsPage {
                    transactions: Vec::new(),
                    next_cursor: None,
                }))
        }
        async fn institution(&self, _access_token: &str) -> Result<Institution> {
            Err(anyhow!("not used in these tests"))
        }
    }

    /// Classifier backend that fails whenever the prompt mentions a marker.
    struct ScriptedBackend {
        fail_marker: Option<String>,
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
            if let Some(marker) = &self.fail_marker {
                if user_prompt.contains(marker.as_str()) {
                    return Err(anyhow!("model unavailable"));
                }
            }
            Ok("Yes, Business expense, 80%".to_string())
        }
    }

    fn bank_account(id: &str) -> BankAccount {
        BankAccount {
            account_id: id.to_string(),
            name: format!("Checking {id}"),
            official_name: None,
            account_type: Some("depository".to_string()),
            mask: None,
        }
    }

    struct Fixture {
        accounts: Arc<FakeAccounts>,
        transactions: Arc<FakeTransactions>,
        pipeline: IngestPipeline,
    }

    fn fixture(
        user: User,
        existing_accounts: Vec<Account>,
        bank: FakeBank,
        fail_ids: HashSet<String>,
        fail_marker: Option<&str>,
    ) -> Fixture {
        let users = Arc::new(FakeUsers {
            users: HashMap::from([(user.id.clone(), user)]),
        });
        let accounts = Arc::new(FakeAccounts {
            existing: Mutex::new(existing_accounts),
            ..Default::default()
        });
        let transactions = Arc::new(FakeTransactions {
            fail_ids,
            ..Default::default()
        });
        let bank = Arc::new(bank);
        let classifier = Arc::new(DeductionClassifier::new(Arc::new(ScriptedBackend {
            fail_marker: fail_marker.map(|m| m.to_string()),
        })));

        let pipeline = IngestPipeline::new(
            users,
            accounts.clone(),
            transactions.clone(),
            bank,
            classifier,
        );

        Fixture {
            accounts,
            transactions,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_sync_processes_every_transaction() {
        let bank = FakeBank {
            accounts: vec![bank_account("acc-1"), bank_account("acc-2")],
            pages: HashMap::from([
                (
                    "acc-1".to_string(),
                    TransactionsPage {
                        transactions: vec![
                            raw_txn("t1", "acc-1", -12.0, Some("Cafe")),
                            raw_txn("t2", "acc-1", 30.0, Some("Staples")),
                        ],
                        next_cursor: Some("cursor-1".to_string()),
                    },
                ),
                (
                    "acc-2".to_string(),
                    TransactionsPage {
                        transactions: vec![raw_txn("t3", "acc-2", 99.0, None)],
                        next_cursor: None,
                    },
                ),
            ]),
        };

        let f = fixture(test_user(Some("access-token")), Vec::new(), bank, HashSet::new(), None);
        let summary = f.pipeline.sync_user("user-1").await.unwrap();

        assert_eq!(summary.accounts_linked, 2);
        assert_eq!(summary.transactions_processed, 3);

        let persisted = f.transactions.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 3);
        // Every persisted transaction has been classified.
        for txn in persisted.iter() {
            assert!(txn.is_classified());
            assert!(txn.amount >= 0.0);
        }

        // The cursor from the first page was stored.
        let cursors = f.accounts.cursors.lock().unwrap();
        assert_eq!(cursors.as_slice(), &[("acc-1".to_string(), "cursor-1".to_string())]);
    }

    #[tokio::test]
    async fn test_classification_failure_downgrades_to_manual_review() {
        let bank = FakeBank {
            accounts: vec![bank_account("acc-1")],
            pages: HashMap::from([(
                "acc-1".to_string(),
                TransactionsPage {
                    transactions: vec![
                        raw_txn("t1", "acc-1", 10.0, Some("Good Merchant")),
                        raw_txn("t2", "acc-1", 20.0, Some("Broken Merchant")),
                        raw_txn("t3", "acc-1", 30.0, Some("Good Merchant")),
                    ],
                    next_cursor: None,
                },
            )]),
        };

        let f = fixture(
            test_user(Some("access-token")),
            Vec::new(),
            bank,
            HashSet::new(),
            Some("Broken Merchant"),
        );
        let summary = f.pipeline.sync_user("user-1").await.unwrap();

        // One classification failed, but all three were still persisted.
        assert_eq!(summary.transactions_processed, 3);

        let persisted = f.transactions.persisted.lock().unwrap();
        let broken = persisted.iter().find(|t| t.trans_id == "t2").unwrap();
        assert_eq!(broken.is_deductible, Some(false));
        assert_eq!(broken.deductible_reason.as_deref(), Some("Requires manual review"));
        assert_eq!(broken.deduction_score, Some(0.0));

        let good = persisted.iter().find(|t| t.trans_id == "t1").unwrap();
        assert_eq!(good.is_deductible, Some(true));
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_abort_the_batch() {
        let bank = FakeBank {
            accounts: vec![bank_account("acc-1")],
            pages: HashMap::from([(
                "acc-1".to_string(),
                TransactionsPage {
                    transactions: vec![
                        raw_txn("t1", "acc-1", 10.0, Some("A")),
                        raw_txn("t2", "acc-1", 20.0, Some("B")),
                        raw_txn("t3", "acc-1", 30.0, Some("C")),
                    ],
                    next_cursor: None,
                },
            )]),
        };

        let f = fixture(
            test_user(Some("access-token")),
            Vec::new(),
            bank,
            HashSet::from(["t2".to_string()]),
            None,
        );
        let summary = f.pipeline.sync_user("user-1").await.unwrap();

        // The processed count reflects persistence attempts, not successes.
        assert_eq!(summary.transactions_processed, 3);
        assert_eq!(*f.transactions.attempts.lock().unwrap(), 3);
        assert_eq!(f.transactions.persisted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_already_known_accounts_are_not_reinserted() {
        let bank = FakeBank {
            accounts: vec![bank_account("acc-1"), bank_account("acc-2")],
            pages: HashMap::new(),
        };
        let existing = vec![Account {
            account_id: "acc-1".to_string(),
            user_id: "user-1".to_string(),
            name: Some("Checking acc-1".to_string()),
            institution_id: None,
            last_cursor: None,
        }];

        let f = fixture(test_user(Some("access-token")), existing, bank, HashSet::new(), None);
        let summary = f.pipeline.sync_user("user-1").await.unwrap();

        assert_eq!(summary.accounts_linked, 1);
        let inserted = f.accounts.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].account_id, "acc-2");
        assert_eq!(inserted[0].user_id, "user-1");
    }

    #[tokio::test]
    async fn test_missing_token_is_a_typed_failure() {
        let bank = FakeBank {
            accounts: Vec::new(),
            pages: HashMap::new(),
        };
        let f = fixture(test_user(None), Vec::new(), bank, HashSet::new(), None);

        let err = f.pipeline.sync_user("user-1").await.unwrap_err();
        assert!(matches!(err, IngestError::MissingBankToken(_)));
        // No bank call and no persistence happened.
        assert_eq!(*f.transactions.attempts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_a_typed_failure() {
        let bank = FakeBank {
            accounts: Vec::new(),
            pages: HashMap::new(),
        };
        let f = fixture(test_user(Some("access-token")), Vec::new(), bank, HashSet::new(), None);

        let err = f.pipeline.sync_user("nobody").await.unwrap_err();
        assert!(matches!(err, IngestError::UserNotFound(_)));
    }

    #[test]
    fn test_normalize_takes_absolute_amount_and_defaults() {
        let txn = normalize_transaction(BankTransaction {
            transaction_id: "t1".to_string(),
            account_id: "acc-1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            amount: -42.5,
            name: None,
            merchant_name: None,
            category: None,
        });

        assert_eq!(txn.amount, 42.5);
        assert_eq!(txn.merchant_name, "Unknown merchant");
        assert_eq!(txn.category, "Uncategorized");
        assert!(!txn.is_classified());
    }

    #[test]
    fn test_normalize_prefers_merchant_name_and_joins_categories() {
        let txn = normalize_transaction(raw_txn("t1", "acc-1", 10.0, Some("Starbucks")));
        assert_eq!(txn.merchant_name, "Starbucks");
        assert_eq!(txn.category, "Food and Drink, Restaurants");
    }

    #[test]
    fn test_trailing_window_spans_the_requested_days() {
        let end = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let (start, end) = trailing_window(end, 90);
        assert_eq!(end - start, Duration::days(90));
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
    }
}
