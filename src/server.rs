//! The HTTP/JSON API over a `Tracker`.
//!
//! Success bodies carry `"success": true` next to the payload. Failures carry
//! `{"success": false, "errorType": .., "error": ..}` with a status derived from the `ErrorType`.

use crate::aggregate::{CategoryBreakdown, DateRange, MerchantSpend, MonthBucket, RollupTotals};
use crate::error::{Error, ErrorType, IntoResult, Result};
use crate::merchant::MerchantLookup;
use crate::model::{ExpenseRecord, MerchantMemoryEntry, NewExpense, UserId};
use crate::tracker::Tracker;
use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "Money Monitor API";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct AppState {
    tracker: Tracker,
}

/// Builds the router. Exposed so that it can be driven in-process.
pub fn router(tracker: Tracker) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/expenses/add", post(add_expense))
        .route("/expenses/totals/:user_id", get(expense_totals))
        .route("/expenses/update/:user_id/:id", put(update_expense))
        .route("/expenses/delete/:user_id/:id", delete(delete_expense))
        .route("/expenses/:user_id", get(list_expenses))
        .route("/ai/merchant-spend", post(merchant_spend))
        .route("/ai/category-summary", post(category_summary))
        .route("/ai/monthly-trend", post(monthly_trend))
        .route("/merchants/save", post(save_merchant))
        .route("/merchants/lookup/:user_id/:merchant", get(lookup_merchant))
        .with_state(AppState { tracker })
}

/// Serves the API on `bind` until Ctrl-C.
///
/// # Errors
/// - `ErrorType::Service` if the address cannot be bound or the server fails.
pub async fn serve(tracker: Tracker, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Unable to bind {bind}"))
        .pub_result(ErrorType::Service)?;
    let local = listener.local_addr().unwrap_or(bind);
    info!("{SERVICE} {VERSION} listening on http://{local}");
    axum::serve(listener, router(tracker))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("The HTTP server failed")
        .pub_result(ErrorType::Service)?;
    info!("{SERVICE} stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C, the server will run until killed: {e}");
        std::future::pending::<()>().await;
    }
}

/// An `Error` on its way out as an HTTP response.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(value: Error) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self(Error::validation(value.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self(Error::validation(value.body_text()))
    }
}

type QueryResult<T> = std::result::Result<Query<T>, QueryRejection>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error_type: ErrorType,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = self.0.error_type();
        let status = match error_type {
            ErrorType::Validation => StatusCode::BAD_REQUEST,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::StoreUnavailable | ErrorType::SyncLost => StatusCode::SERVICE_UNAVAILABLE,
            ErrorType::Config | ErrorType::Service | ErrorType::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Request failed: {:?}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            success: false,
            error_type,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<Success<T>>, ApiError>;

#[derive(Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Success {
        success: true,
        data,
    }))
}

fn user_id(value: Option<String>) -> Result<UserId> {
    UserId::new(value.unwrap_or_default())
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE,
        "version": VERSION,
        "endpoints": {
            "health": "GET /health",
            "expenses": {
                "add": "POST /expenses/add",
                "list": "GET /expenses/{userId}",
                "totals": "GET /expenses/totals/{userId}",
                "update": "PUT /expenses/update/{userId}/{id}",
                "delete": "DELETE /expenses/delete/{userId}/{id}"
            },
            "ai": {
                "merchantSpend": "POST /ai/merchant-spend",
                "categorySummary": "POST /ai/category-summary",
                "monthlyTrend": "POST /ai/monthly-trend"
            },
            "merchants": {
                "save": "POST /merchants/save",
                "lookup": "GET /merchants/lookup/{userId}/{merchant}"
            }
        }
    }))
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        service: SERVICE,
        version: VERSION,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseWritten {
    message: &'static str,
    expense_id: String,
    expense: ExpenseRecord,
}

async fn add_expense(
    State(state): State<AppState>,
    query: QueryResult<UserQuery>,
    body: std::result::Result<Json<NewExpense>, JsonRejection>,
) -> ApiResult<ExpenseWritten> {
    let Query(query) = query?;
    let user = user_id(query.user_id)?;
    let Json(expense) = body?;
    let expense = state.tracker.add_expense(&user, expense).await?;
    success(ExpenseWritten {
        message: "Expense added successfully",
        expense_id: expense.id.clone(),
        expense,
    })
}

async fn update_expense(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
    body: std::result::Result<Json<NewExpense>, JsonRejection>,
) -> ApiResult<ExpenseWritten> {
    let user = UserId::new(user_id)?;
    let Json(expense) = body?;
    let expense = state.tracker.update_expense(&user, &id, expense).await?;
    success(ExpenseWritten {
        message: "Expense updated successfully",
        expense_id: expense.id.clone(),
        expense,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    message: String,
}

async fn delete_expense(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> ApiResult<Message> {
    let user = UserId::new(user_id)?;
    state.tracker.delete_expense(&user, &id).await?;
    success(Message {
        message: format!("Expense '{id}' deleted"),
    })
}

#[derive(Deserialize)]
struct TypeQuery {
    r#type: Option<String>,
}

#[derive(Serialize)]
struct ExpenseList {
    count: usize,
    expenses: Vec<ExpenseRecord>,
}

async fn list_expenses(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: QueryResult<TypeQuery>,
) -> ApiResult<ExpenseList> {
    let Query(query) = query?;
    let user = UserId::new(user_id)?;
    let expenses = state
        .tracker
        .list_expenses(&user, query.r#type.as_deref())
        .await?;
    success(ExpenseList {
        count: expenses.len(),
        expenses,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Totals {
    user_id: UserId,
    totals: RollupTotals,
}

async fn expense_totals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Totals> {
    let user = UserId::new(user_id)?;
    let totals = state.tracker.totals(&user).await?;
    success(Totals {
        user_id: user,
        totals,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MerchantQuery {
    #[serde(default)]
    merchant: String,
    user_id: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

async fn merchant_spend(
    State(state): State<AppState>,
    body: std::result::Result<Json<MerchantQuery>, JsonRejection>,
) -> ApiResult<MerchantSpend> {
    let Json(query) = body?;
    let user = user_id(query.user_id)?;
    let range = DateRange::new(query.start_date, query.end_date);
    let spend = state
        .tracker
        .merchant_spend(&user, &query.merchant, range)
        .await?;
    success(spend)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterQuery {
    user_id: Option<String>,
    r#type: Option<String>,
}

impl FilterQuery {
    /// The filter as echoed back to the caller.
    fn type_label(&self) -> String {
        self.r#type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("all")
            .to_string()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    user_id: UserId,
    r#type: String,
    #[serde(flatten)]
    breakdown: CategoryBreakdown,
}

async fn category_summary(
    State(state): State<AppState>,
    query: QueryResult<FilterQuery>,
) -> ApiResult<Summary> {
    let Query(query) = query?;
    let r#type = query.type_label();
    let user = user_id(query.user_id)?;
    let breakdown = state
        .tracker
        .category_summary(&user, query.r#type.as_deref())
        .await?;
    success(Summary {
        user_id: user,
        r#type,
        breakdown,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Trend {
    user_id: UserId,
    r#type: String,
    trend: BTreeMap<String, MonthBucket>,
}

async fn monthly_trend(
    State(state): State<AppState>,
    query: QueryResult<FilterQuery>,
) -> ApiResult<Trend> {
    let Query(query) = query?;
    let r#type = query.type_label();
    let user = user_id(query.user_id)?;
    let trend = state
        .tracker
        .monthly_trend(&user, query.r#type.as_deref())
        .await?;
    success(Trend {
        user_id: user,
        r#type,
        trend,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveMerchantQuery {
    user_id: Option<String>,
    #[serde(default)]
    merchant: String,
    #[serde(default)]
    category: String,
    r#type: Option<String>,
}

#[derive(Serialize)]
struct MerchantSaved {
    message: String,
    entry: MerchantMemoryEntry,
}

async fn save_merchant(
    State(state): State<AppState>,
    query: QueryResult<SaveMerchantQuery>,
) -> ApiResult<MerchantSaved> {
    let Query(query) = query?;
    let user = user_id(query.user_id)?;
    let entry = state
        .tracker
        .merchants()
        .save(&user, &query.merchant, &query.category, query.r#type.as_deref())
        .await?;
    success(MerchantSaved {
        message: format!(
            "Merchant '{}' saved with category '{}'",
            query.merchant.trim(),
            entry.category
        ),
        entry,
    })
}

async fn lookup_merchant(
    State(state): State<AppState>,
    Path((user_id, merchant)): Path<(String, String)>,
) -> ApiResult<MerchantLookup> {
    let user = UserId::new(user_id)?;
    let lookup = state.tracker.merchants().lookup(&user, &merchant).await?;
    success(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), router(Tracker::new(store)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn add(app: &Router, user: &str, body: Value) -> String {
        let (status, value) = send(app, "POST", &format!("/expenses/add?userId={user}"), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{value}");
        value["expenseId"].as_str().unwrap().to_string()
    }

    async fn seed_scenario(app: &Router) {
        add(
            app,
            "u1",
            json!({"item": "petrol", "amount": 100, "type": "personal", "category": "consumable"}),
        )
        .await;
        add(
            app,
            "u1",
            json!({"item": "client lunch", "amount": 50.0, "type": "business", "category": "food"}),
        )
        .await;
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let (_store, app) = app();
        let (status, value) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["service"], SERVICE);

        let (status, value) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["endpoints"]["health"], "GET /health");
    }

    #[tokio::test]
    async fn test_add_list_and_totals() {
        let (_store, app) = app();
        seed_scenario(&app).await;

        let (status, value) = send(&app, "GET", "/expenses/u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["success"], true);
        assert_eq!(value["count"], 2);
        assert_eq!(value["expenses"][0]["item"], "client lunch");

        let (_, value) = send(&app, "GET", "/expenses/u1?type=personal", None).await;
        assert_eq!(value["count"], 1);

        let (status, value) = send(&app, "GET", "/expenses/totals/u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["totals"]["total"].as_f64(), Some(150.0));
        assert_eq!(value["totals"]["personal"].as_f64(), Some(100.0));
        assert_eq!(value["totals"]["business"].as_f64(), Some(50.0));
    }

    #[tokio::test]
    async fn test_add_validation_errors() {
        let (_store, app) = app();
        let (status, value) = send(
            &app,
            "POST",
            "/expenses/add?userId=u1",
            Some(json!({"item": "", "amount": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["success"], false);
        assert_eq!(value["errorType"], "validation");

        let (status, _) = send(
            &app,
            "POST",
            "/expenses/add?userId=u1",
            Some(json!({"item": "tea"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, value) = send(
            &app,
            "POST",
            "/expenses/add",
            Some(json!({"item": "tea", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["error"].as_str().unwrap().contains("userId"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation() {
        let (_store, app) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/expenses/add?userId=u1")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_query_is_validation() {
        let (_store, app) = app();
        for (method, uri) in [
            ("POST", "/ai/category-summary?userId=u1&userId=u2"),
            ("POST", "/ai/monthly-trend?userId=u1&type=a&type=b"),
            ("GET", "/expenses/u1?type=a&type=b"),
            ("POST", "/merchants/save?userId=u1&userId=u2&merchant=x&category=y"),
        ] {
            let (status, value) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
            assert_eq!(value["success"], false, "{method} {uri}");
            assert_eq!(value["errorType"], "validation", "{method} {uri}");
        }

        let (status, value) = send(
            &app,
            "POST",
            "/expenses/add?userId=u1&userId=u2",
            Some(json!({"item": "tea", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["errorType"], "validation");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_store, app) = app();
        let id = add(&app, "u1", json!({"item": "tea", "amount": "3.50"})).await;

        let (status, value) = send(
            &app,
            "PUT",
            &format!("/expenses/update/u1/{id}"),
            Some(json!({"item": "coffee", "amount": 4, "type": "business"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["expense"]["item"], "coffee");
        assert_eq!(value["expense"]["type"], "business");

        let (status, _) = send(&app, "DELETE", &format!("/expenses/delete/u1/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, value) =
            send(&app, "DELETE", &format!("/expenses/delete/u1/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["errorType"], "not_found");
    }

    #[tokio::test]
    async fn test_category_summary_and_trend() {
        let (_store, app) = app();
        seed_scenario(&app).await;

        let (status, value) = send(&app, "POST", "/ai/category-summary?userId=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["type"], "all");
        assert_eq!(value["totalSpent"].as_f64(), Some(150.0));
        let consumable = &value["categories"]["consumable"];
        assert_eq!(consumable["count"], 1);
        assert_eq!(consumable["percentage"].as_f64(), Some(66.7));
        assert_eq!(value["categories"]["food"]["percentage"].as_f64(), Some(33.3));

        let (status, value) = send(
            &app,
            "POST",
            "/ai/monthly-trend?userId=u1&type=business",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["type"], "business");
        let months = value["trend"].as_object().unwrap();
        assert_eq!(months.len(), 1);
        let bucket = months.values().next().unwrap();
        assert_eq!(bucket["count"], 1);
        assert_eq!(bucket["total"].as_f64(), Some(50.0));
    }

    #[tokio::test]
    async fn test_merchant_spend() {
        let (_store, app) = app();
        add(&app, "u1", json!({"item": "bank", "amount": 500, "note": "HDFC Transfer"})).await;
        add(&app, "u1", json!({"item": "bank", "amount": 300, "note": "HDFC Transfer"})).await;
        add(&app, "u1", json!({"item": "petrol", "amount": 100})).await;

        let (status, value) = send(
            &app,
            "POST",
            "/ai/merchant-spend",
            Some(json!({"merchant": "HDFC", "userId": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["merchant"], "HDFC");
        assert_eq!(value["totalSpent"].as_f64(), Some(800.0));
        assert_eq!(value["transactionCount"], 2);
        assert_eq!(value["byCategory"]["Uncategorized"].as_f64(), Some(800.0));
        assert_eq!(value["expenses"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &app,
            "POST",
            "/ai/merchant-spend",
            Some(json!({"merchant": "HDFC", "userId": "u1", "startDate": "not a date"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_merchant_save_and_lookup() {
        let (_store, app) = app();
        let (status, value) = send(&app, "GET", "/merchants/lookup/u1/Swiggy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["found"], false);
        assert_eq!(value["merchant"], "Swiggy");

        let (status, value) = send(
            &app,
            "POST",
            "/merchants/save?userId=u1&merchant=HDFC%20Bank&category=banking&type=business",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["entry"]["merchantKey"], "hdfc bank");

        let (status, value) =
            send(&app, "GET", "/merchants/lookup/u1/hdfc%20BANK", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["found"], true);
        assert_eq!(value["category"], "banking");
        assert_eq!(value["type"], "business");
    }

    #[tokio::test]
    async fn test_store_offline_is_503() {
        let (store, app) = app();
        store.set_online(false);
        let (status, value) = send(&app, "GET", "/expenses/totals/u1", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(value["errorType"], "store_unavailable");
    }
}
