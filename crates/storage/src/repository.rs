use anyhow::{Context, Result};
use async_trait::async_trait;
use models::{Account, ProfileUpdate, Transaction, User};
use serde_json::json;

use crate::rest::RestClient;

/// Read/write access to the `users` table.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<User>>;
    async fn set_bank_token(&self, user_id: &str, access_token: &str) -> Result<()>;
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()>;
}

/// Read/write access to the `accounts` table.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>>;
    async fn insert(&self, account: &Account) -> Result<()>;
    async fn set_cursor(&self, account_id: &str, cursor: &str) -> Result<()>;
    async fn delete(&self, account_id: &str) -> Result<()>;
}

/// Read/write access to the `transactions` table.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Ledger entries for a set of accounts, newest first.
    async fn list_for_accounts(&self, account_ids: &[String]) -> Result<Vec<Transaction>>;
    async fn upsert(&self, txn: &Transaction) -> Result<()>;
    /// Bulk removal; the only way transactions are ever deleted.
    async fn delete_for_account(&self, account_id: &str) -> Result<()>;
}

/// REST-backed user repository with an explicit two-step credential strategy:
/// the privileged (service-key) client first, the public (anon-key) client
/// only when the privileged call fails. Writes always use the privileged
/// client when one is configured.
pub struct RestUserRepository {
    primary: RestClient,
    fallback: Option<RestClient>,
}

impl RestUserRepository {
    pub fn new(primary: RestClient, fallback: Option<RestClient>) -> Self {
        Self { primary, fallback }
    }

    async fn lookup(&self, client: &RestClient, user_id: &str) -> Result<Option<User>> {
        client
            .from("users")
            .select("*")
            .eq("id", user_id)
            .fetch_optional()
            .await
            .context("Fetching user")
    }
}

#[async_trait]
impl UserRepository for RestUserRepository {
    async fn fetch(&self, user_id: &str) -> Result<Option<User>> {
        match self.lookup(&self.primary, user_id).await {
            Ok(user) => Ok(user),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::debug!("Privileged user lookup failed ({err:#}); trying public path");
                    self.lookup(fallback, user_id).await
                }
                None => Err(err),
            },
        }
    }

    async fn set_bank_token(&self, user_id: &str, access_token: &str) -> Result<()> {
        self.primary
            .from("users")
            .eq("id", user_id)
            .update(&json!({ "plaid_token": access_token }))
            .await
            .context("Storing bank access token")
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        self.primary
            .from("users")
            .eq("id", user_id)
            .update(update)
            .await
            .context("Updating user profile")
    }
}

pub struct RestAccountRepository {
    client: RestClient,
}

impl RestAccountRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountRepository for RestAccountRepository {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
        self.client
            .from("accounts")
            .select("*")
            .eq("user_id", user_id)
            .fetch()
            .await
            .context("Listing accounts for user")
    }

    async fn insert(&self, account: &Account) -> Result<()> {
        self.client
            .from("accounts")
            .insert(account)
            .await
            .context("Inserting account")
    }

    async fn set_cursor(&self, account_id: &str, cursor: &str) -> Result<()> {
        self.client
            .from("accounts")
            .eq("account_id", account_id)
            .update(&json!({ "last_cursor": cursor }))
            .await
            .context("Updating account sync cursor")
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        self.client
            .from("accounts")
            .eq("account_id", account_id)
            .delete()
            .await
            .context("Deleting account")
    }
}

pub struct RestTransactionRepository {
    client: RestClient,
}

impl RestTransactionRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionRepository for RestTransactionRepository {
    async fn list_for_accounts(&self, account_ids: &[String]) -> Result<Vec<Transaction>> {
        if account_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.client
            .from("transactions")
            .select("*")
            .in_list("account_id", account_ids)
            .order_desc("date")
            .fetch()
            .await
            .context("Listing transactions for accounts")
    }

    async fn upsert(&self, txn: &Transaction) -> Result<()> {
        self.client
            .from("transactions")
            .upsert(txn)
            .await
            .context("Upserting transaction")
    }

    async fn delete_for_account(&self, account_id: &str) -> Result<()> {
        self.client
            .from("transactions")
            .eq("account_id", account_id)
            .delete()
            .await
            .context("Deleting transactions for account")
    }
}
