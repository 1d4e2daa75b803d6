use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Client for the hosted relational store's REST interface.
///
/// Tables live under `/rest/v1/<table>`; filters, ordering and limits ride
/// in the query string (`?user_id=eq.abc&order=date.desc`). One client per
/// credential: the server holds a privileged (service-key) client and a
/// public (anon-key) one.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid storage base URL: {base_url}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("Storage API key contains invalid header characters")?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("Storage API key contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    /// Start a query against one table.
    pub fn from(&self, table: &str) -> Query<'_> {
        Query {
            client: self,
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Storage base URL cannot be a base"))?
            .extend(["rest", "v1", table]);
        Ok(url)
    }
}

/// A single filtered query, built up and then executed once.
#[derive(Debug)]
pub struct Query<'a> {
    client: &'a RestClient,
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl<'a> Query<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), format!("gte.{}", value.to_string())));
        self
    }

    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), format!("lte.{}", value.to_string())));
        self
    }

    /// Membership filter: `column=in.(a,b,c)`.
    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        self.filters
            .push((column.to_string(), format!("in.({})", values.join(","))));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.asc"));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.desc"));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn build_url(&self) -> Result<Url> {
        let mut url = self.client.table_url(&self.table)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(select) = &self.select {
                pairs.append_pair("select", select);
            }
            for (column, filter) in &self.filters {
                pairs.append_pair(column, filter);
            }
            if let Some(order) = &self.order {
                pairs.append_pair("order", order);
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    /// Execute as a read, deserializing the JSON array the store returns.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let url = self.build_url()?;
        let rows = self
            .client
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned non-success status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {url}"))?;
        Ok(rows)
    }

    /// Like [`Query::fetch`], but for at most one row.
    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>> {
        let rows = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one or more rows. The store's response body is not needed.
    pub async fn insert<B: Serialize + ?Sized>(self, rows: &B) -> Result<()> {
        self.write(reqwest::Method::POST, Some(rows), "return=minimal").await
    }

    /// Insert-or-replace on the table's primary key.
    pub async fn upsert<B: Serialize + ?Sized>(self, rows: &B) -> Result<()> {
        self.write(
            reqwest::Method::POST,
            Some(rows),
            "resolution=merge-duplicates,return=minimal",
        )
        .await
    }

    /// Patch every row matching the accumulated filters.
    pub async fn update<B: Serialize + ?Sized>(self, patch: &B) -> Result<()> {
        self.write(reqwest::Method::PATCH, Some(patch), "return=minimal").await
    }

    /// Delete every row matching the accumulated filters.
    pub async fn delete(self) -> Result<()> {
        self.write::<()>(reqwest::Method::DELETE, None, "return=minimal").await
    }

    async fn write<B: Serialize + ?Sized>(
        self,
        method: reqwest::Method,
        body: Option<&B>,
        prefer: &str,
    ) -> Result<()> {
        let url = self.build_url()?;
        let mut request = self
            .client
            .http
            .request(method.clone(), url.clone())
            .header("Prefer", prefer);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{method} {url} returned non-success status"))?;
        Ok(())
    }
}
