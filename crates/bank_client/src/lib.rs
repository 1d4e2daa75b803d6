use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Configuration for the bank-data aggregation API.
///
/// Credentials ride in every request body (aggregation-API convention); the
/// per-user access token obtained by the link-token exchange is passed per
/// call.
#[derive(Debug, Clone)]
pub struct BankClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
}

/// An access token and its item id, as returned by the public-token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemAccess {
    pub access_token: String,
    pub item_id: String,
}

/// A bank account as reported by the aggregation API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
}

/// A ledger entry as reported by the aggregation API. Amounts keep the
/// provider's sign convention (outflows positive); normalization happens at
/// ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub category: Option<Vec<String>>,
}

/// One date-range fetch worth of transactions, plus the opaque sync cursor
/// when the provider returned one.
#[derive(Debug, Clone)]
pub struct TransactionsPage {
    pub transactions: Vec<BankTransaction>,
    pub next_cursor: Option<String>,
}

/// Institution metadata for the item behind an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub institution_id: String,
    pub name: String,
}

/// The aggregation-API operations the rest of the system consumes.
///
/// A trait so the ingestion loop and the HTTP handlers can be exercised with
/// a fake source in tests.
#[async_trait]
pub trait BankSource: Send + Sync {
    async fn exchange_public_token(&self, public_token: &str) -> Result<ItemAccess>;
    async fn accounts(&self, access_token: &str) -> Result<Vec<BankAccount>>;
    async fn transactions(
        &self,
        access_token: &str,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TransactionsPage>;
    async fn institution(&self, access_token: &str) -> Result<Institution>;
}

/// HTTP client for the aggregation API. Each operation is a single
/// best-effort POST; there is no retry or backoff.
#[derive(Debug, Clone)]
pub struct BankClient {
    http: Client,
    base_url: Url,
    client_id: String,
    secret: String,
}

impl BankClient {
    pub fn new(config: BankClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid bank API base URL: {}", config.base_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            client_id: config.client_id,
            secret: config.secret,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let endpoint = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build bank API URL for {path}"))?;

        let response = self
            .http
            .post(endpoint.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {endpoint} returned non-success status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        Ok(response)
    }
}

#[async_trait]
impl BankSource for BankClient {
    /// Exchanges a short-lived link token for a persistent access token.
    async fn exchange_public_token(&self, public_token: &str) -> Result<ItemAccess> {
        let request = ExchangeRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            public_token,
        };
        let response: ExchangeResponse = self.post("item/public_token/exchange", &request).await?;
        Ok(ItemAccess {
            access_token: response.access_token,
            item_id: response.item_id,
        })
    }

    async fn accounts(&self, access_token: &str) -> Result<Vec<BankAccount>> {
        let request = TokenRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
        };
        let response: AccountsResponse = self.post("accounts/get", &request).await?;
        Ok(response.accounts)
    }

    async fn transactions(
        &self,
        access_token: &str,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TransactionsPage> {
        let request = TransactionsRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
            start_date: start_date.format("%Y-%m-%d").to_string(),
            end_date: end_date.format("%Y-%m-%d").to_string(),
            options: TransactionsOptions {
                account_ids: vec![account_id.to_string()],
            },
        };
        let response: TransactionsResponse = self.post("transactions/get", &request).await?;
        Ok(TransactionsPage {
            transactions: response.transactions,
            next_cursor: response.next_cursor,
        })
    }

    /// Two hops: the item tells us the institution id, the institutions
    /// endpoint resolves it to metadata.
    async fn institution(&self, access_token: &str) -> Result<Institution> {
        let request = TokenRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            access_token,
        };
        let item: ItemResponse = self.post("item/get", &request).await?;
        let institution_id = item
            .item
            .institution_id
            .context("Item has no institution id")?;

        let request = InstitutionRequest {
            client_id: &self.client_id,
            secret: &self.secret,
            institution_id: &institution_id,
            country_codes: vec!["US"],
        };
        let response: InstitutionResponse = self.post("institutions/get_by_id", &request).await?;
        Ok(response.institution)
    }
}

// Wire types, private to this crate.

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    public_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<BankAccount>,
}

#[derive(Debug, Serialize)]
struct TransactionsOptions {
    account_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TransactionsRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    start_date: String,
    end_date: String,
    options: TransactionsOptions,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<BankTransaction>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemWire {
    #[serde(default)]
    institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: ItemWire,
}

#[derive(Debug, Serialize)]
struct InstitutionRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    institution_id: &'a str,
    country_codes: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InstitutionResponse {
    institution: Institution,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transactions_response_parses_provider_payload() {
        let raw = json!({
            "transactions": [
                {
                    "transaction_id": "txn-1",
                    "account_id": "acc-1",
                    "date": "2025-06-02",
                    "amount": 23.10,
                    "name": "STARBUCKS STORE 0042",
                    "merchant_name": "Starbucks",
                    "category": ["Food and Drink", "Coffee Shop"]
                },
                {
                    "transaction_id": "txn-2",
                    "account_id": "acc-1",
                    "date": "2025-06-03",
                    "amount": -1200.0
                }
            ],
            "next_cursor": "cursor-abc",
            "total_transactions": 2
        });

        let response: TransactionsResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.transactions.len(), 2);
        assert_eq!(response.next_cursor.as_deref(), Some("cursor-abc"));

        let first = &response.transactions[0];
        assert_eq!(first.merchant_name.as_deref(), Some("Starbucks"));
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());

        // Fields the provider omits stay None.
        let second = &response.transactions[1];
        assert!(second.merchant_name.is_none());
        assert!(second.category.is_none());
    }

    #[test]
    fn test_transactions_response_without_cursor() {
        let raw = json!({"transactions": []});
        let response: TransactionsResponse = serde_json::from_value(raw).unwrap();
        assert!(response.transactions.is_empty());
        assert!(response.next_cursor.is_none());
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let config = BankClientConfig {
            base_url: "not a url".to_string(),
            client_id: "client".to_string(),
            secret: "secret".to_string(),
        };
        assert!(BankClient::new(config).is_err());
    }

    #[test]
    fn test_exchange_request_serializes_credentials_in_body() {
        let request = ExchangeRequest {
            client_id: "client-1",
            secret: "secret-1",
            public_token: "public-sandbox-token",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["client_id"], "client-1");
        assert_eq!(value["public_token"], "public-sandbox-token");
    }
}
