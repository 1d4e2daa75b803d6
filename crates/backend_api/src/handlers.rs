use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use classifier::ExpenseFacts;
use models::{ProfileUpdate, User};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState, Result};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "writeoff-api"
    }))
}

async fn load_user(state: &AppState, user_id: &str) -> Result<User> {
    state
        .users
        .fetch(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id}")))
}

fn require_bank_token(user: &User) -> Result<String> {
    user.plaid_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::MissingBankToken(user.id.clone()))
}

/// POST /api/link/exchange
/// Exchanges a short-lived public token for a persistent access token and
/// stores it on the user.
#[derive(Debug, Deserialize)]
pub struct ExchangeLinkRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub public_token: String,
}

pub async fn exchange_link_token(
    State(state): State<AppState>,
    Json(req): Json<ExchangeLinkRequest>,
) -> Result<impl IntoResponse> {
    if req.user_id.is_empty() {
        return Err(ApiError::MissingParameter("user_id"));
    }
    if req.public_token.is_empty() {
        return Err(ApiError::MissingParameter("public_token"));
    }

    // The user must exist before we attach a credential to them.
    load_user(&state, &req.user_id).await?;

    let access = state.bank.exchange_public_token(&req.public_token).await?;
    state.users.set_bank_token(&req.user_id, &access.access_token).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "item_id": access.item_id,
    })))
}

/// GET /api/users/:user_id
/// Returns the user's profile. The bank credential itself never leaves the
/// server; only its presence is reported.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub full_name: Option<String>,
    pub profession: Option<String>,
    pub income: Option<f64>,
    pub state: Option<String>,
    pub filing_status: Option<String>,
    pub has_bank_link: bool,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &user_id).await?;
    let has_bank_link = user.has_bank_link();

    Ok(Json(ProfileResponse {
        id: user.id,
        full_name: user.full_name,
        profession: user.profession,
        income: user.income,
        state: user.state,
        filing_status: user.filing_status,
        has_bank_link,
    }))
}

/// PUT /api/users/:user_id
/// Updates profile fields; absent fields are left untouched.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("No profile fields to update".to_string()));
    }

    load_user(&state, &user_id).await?;
    state.users.update_profile(&user_id, &update).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/users/:user_id/accounts
/// Live account list from the aggregation API.
pub async fn list_accounts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &user_id).await?;
    let token = require_bank_token(&user)?;

    let accounts = state.bank.accounts(&token).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "accounts": accounts,
    })))
}

/// GET /api/users/:user_id/transactions
/// The stored, classified ledger for all of the user's accounts, newest
/// first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    load_user(&state, &user_id).await?;

    let account_ids: Vec<String> = state
        .accounts
        .list_for_user(&user_id)
        .await?
        .into_iter()
        .map(|a| a.account_id)
        .collect();
    let transactions = state.transactions.list_for_accounts(&account_ids).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "transactions": transactions,
    })))
}

/// GET /api/users/:user_id/institution
/// Institution metadata for the user's linked item.
pub async fn get_institution(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &user_id).await?;
    let token = require_bank_token(&user)?;

    let institution = state.bank.institution(&token).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "institution": institution,
    })))
}

/// POST /api/sync
/// Runs the full ingestion loop for one user.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub user_id: String,
}

pub async fn sync_transactions(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<impl IntoResponse> {
    if req.user_id.is_empty() {
        return Err(ApiError::MissingParameter("user_id"));
    }

    let summary = state.pipeline.sync_user(&req.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "accounts_linked": summary.accounts_linked,
        "transactions_processed": summary.transactions_processed,
    })))
}

/// POST /api/classify
/// One-off classification for a manually entered expense.
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub merchant_name: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn classify_expense(
    State(state): State<AppState>,
    Json(req): Json<ClassifyRequest>,
) -> Result<impl IntoResponse> {
    if req.merchant_name.is_empty() {
        return Err(ApiError::MissingParameter("merchant_name"));
    }
    let amount = req.amount.ok_or(ApiError::MissingParameter("amount"))?;

    let profile = match &req.user_id {
        Some(user_id) if !user_id.is_empty() => Some(load_user(&state, user_id).await?),
        _ => None,
    };

    let facts = ExpenseFacts {
        merchant_name: req.merchant_name,
        amount: amount.abs(),
        date: req.date,
        category: req.category.unwrap_or_default(),
    };

    let verdict = state.classifier.classify(&facts, profile.as_ref()).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "verdict": verdict,
    })))
}

/// DELETE /api/accounts/:account_id
/// Removes an account and, with it, its transactions in bulk. The only
/// deletion path for transactions.
pub async fn remove_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse> {
    if account_id.is_empty() {
        return Err(ApiError::MissingParameter("account_id"));
    }

    state.transactions.delete_for_account(&account_id).await?;
    state.accounts.delete(&account_id).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}
