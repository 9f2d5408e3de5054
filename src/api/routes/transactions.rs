use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::chain::{ExchangeRates, TokenQuote};
use crate::database::models::{Transaction, DEFAULT_RECEIVE_TOKEN};
use crate::services::{
    BundledRates, ContractStatus, CreateTransaction, GasPrices, PriceHistory, TokenListing, TokenPrice,
    TransactionDetail, TransactionPage,
};

const DEFAULT_PAGE_SIZE: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/quote", get(quote))
        .route("/bundled-rates", get(bundled_rates))
        .route("/exchange-rates", get(exchange_rates))
        .route("/tokens", get(tokens))
        .route("/tokens-with-changes", get(tokens_with_changes))
        .route("/token-history", get(token_history))
        .route("/token-price/:symbol_or_address", get(token_price))
        .route("/gas-prices", get(gas_prices))
        .route("/contract-status", get(contract_status))
        .route("/refresh-cache", post(refresh_cache))
        .route("/:id", get(get_one).put(update_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub source_token: Option<String>,
    pub amount: Option<String>,
    pub target_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BundledQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolsQuery {
    pub symbols: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub symbol: Option<String>,
    pub days: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateTransaction>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let body = json_body(payload)?;
    let tx = state.transactions.create(user.id(), body).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TransactionPage>> {
    let page = int_param(query.page.as_deref(), 1, "Page must be a positive integer")?;
    let limit = int_param(query.limit.as_deref(), DEFAULT_PAGE_SIZE, "Limit must be between 1 and 100")?;
    Ok(Json(state.transactions.list(user.id(), page, limit).await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TransactionDetail>> {
    let id = transaction_id(&id)?;
    Ok(Json(state.transactions.get(user.id(), id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Transaction>> {
    let id = transaction_id(&id)?;
    let body = json_body(payload)?;
    Ok(Json(
        state
            .transactions
            .update_status(user.id(), id, &body.status)
            .await?,
    ))
}

pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Json<TokenQuote>> {
    let quote = state
        .quotes
        .quote(
            query.source_token.as_deref().unwrap_or_default(),
            query.amount.as_deref().unwrap_or_default(),
            query.target_token.as_deref().unwrap_or(DEFAULT_RECEIVE_TOKEN),
        )
        .await?;
    Ok(Json(quote))
}

pub async fn bundled_rates(
    State(state): State<AppState>,
    Query(query): Query<BundledQuery>,
) -> ApiResult<Json<BundledRates>> {
    let rates = state
        .market
        .bundled_rates(query.from.as_deref(), query.to.as_deref(), query.amount.as_deref())
        .await?;
    Ok(Json(rates))
}

pub async fn tokens(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Json<Vec<TokenListing>> {
    Json(
        state
            .market
            .tokens(query.query.as_deref(), query.kind.as_deref())
            .await,
    )
}

pub async fn tokens_with_changes(
    State(state): State<AppState>,
    Query(query): Query<SymbolsQuery>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    let changes = state
        .market
        .price_changes(query.symbols.as_deref().unwrap_or_default())?;
    Ok(Json(changes))
}

pub async fn token_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<PriceHistory>> {
    let history = state
        .market
        .token_history(query.symbol.as_deref().unwrap_or_default(), query.days.as_deref())
        .await?;
    Ok(Json(history))
}

pub async fn token_price(
    State(state): State<AppState>,
    Path(symbol_or_address): Path<String>,
) -> ApiResult<Json<TokenPrice>> {
    Ok(Json(state.market.token_price(&symbol_or_address).await?))
}

pub async fn exchange_rates(State(state): State<AppState>) -> Json<ExchangeRates> {
    Json(state.network.exchange_rates().await)
}

pub async fn gas_prices(State(state): State<AppState>) -> Json<GasPrices> {
    Json(state.network.gas_prices().await)
}

pub async fn contract_status(State(state): State<AppState>) -> Json<ContractStatus> {
    Json(state.network.contract_status().await)
}

pub async fn refresh_cache(State(state): State<AppState>) -> Json<Value> {
    let refresh = state.network.refresh_caches();
    let market = state.market.invalidate();
    Json(json!({
        "success": true,
        "message": "Cache refresh initiated",
        "invalidated": {
            "prices": refresh.prices,
            "quotes": refresh.quotes,
            "network": refresh.network,
            "market": market,
        },
    }))
}

fn transaction_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid transaction ID"))
}

/// Missing means `default`; anything non-integer is rejected with `error`.
fn int_param(raw: Option<&str>, default: i64, error: &str) -> ApiResult<i64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ApiError::bad_request(error)),
    }
}
