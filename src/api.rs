use chrono::{SecondsFormat, Utc};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::{self, Json};
use rocket::tokio::task::spawn_blocking;
use rocket::{Catcher, Route, State};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::aggregate::{self, DAILY_WINDOW_DAYS};
use crate::categorize::resolve_category;
use crate::classifier::SharedClassifier;
use crate::config::AppConfig;
use crate::dates::{self, trailing_window, DateFilter};
use crate::db::{self, CategoryUpdate, DbPool};
use crate::error::{ApiError, ApiResult, StoreError};
use crate::insights::{generate_insight, InsightError};
use crate::models::{
    CategorizeRequest, NewCategory, NewTransaction, TransactionKind, DEFAULT_EXPENSE_CATEGORIES,
    DEFAULT_INCOME_CATEGORIES, DEFAULT_OWNER,
};

/// Header carrying the caller's opaque user id.
pub const OWNER_HEADER: &str = "X-User-ID";

/// The caller, resolved once per request from [`OWNER_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Owner {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one(OWNER_HEADER).map(str::trim) {
            Some(id) if !id.is_empty() && id != DEFAULT_OWNER => {
                Outcome::Success(Owner(id.to_string()))
            }
            _ => Outcome::Error((Status::Unauthorized, ApiError::Unauthenticated)),
        }
    }
}

#[derive(Debug, FromForm)]
pub struct RangeQuery {
    filter: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl RangeQuery {
    fn date_filter(&self) -> ApiResult<DateFilter> {
        DateFilter::from_query(
            self.filter.as_deref(),
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )
    }
}

#[derive(Debug, FromForm)]
pub struct CategoryQuery {
    #[field(name = "type")]
    kind: Option<String>,
}

impl CategoryQuery {
    /// `expense` when absent or blank; anything else must name a kind.
    fn kind(&self) -> ApiResult<TransactionKind> {
        match self.kind.as_deref().map(str::trim) {
            None | Some("") => Ok(TransactionKind::Expense),
            Some(name) => TransactionKind::from_type(name)
                .ok_or_else(|| ApiError::validation(format!("Unknown category type: {name}"))),
        }
    }
}

fn parse_limit(raw: &str) -> ApiResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(limit) if limit >= 1 => Ok(limit),
        _ => Err(ApiError::validation("limit must be a positive integer")),
    }
}

fn invalid_body(err: json::Error<'_>) -> ApiError {
    ApiError::validation(format!("Invalid request body: {err}"))
}

fn fetch_failed(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Expense => "Failed to fetch expenses",
        TransactionKind::Income => "Failed to fetch income",
    }
}

fn create_failed(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Expense => "Failed to create expense",
        TransactionKind::Income => "Failed to create income",
    }
}

fn delete_failed(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Expense => "Failed to delete expense",
        TransactionKind::Income => "Failed to delete income",
    }
}

#[get("/api/health")]
fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

#[get("/api/<kind>?<limit>&<range..>", rank = 2)]
fn list_transactions(
    owner: Owner,
    pool: &State<DbPool>,
    kind: TransactionKind,
    limit: Option<String>,
    range: RangeQuery,
) -> ApiResult<Json<Value>> {
    let date_range = range.date_filter()?.range(dates::today());
    let limit = limit.as_deref().map(parse_limit).transpose()?;

    let conn = pool.get().map_err(ApiError::store(fetch_failed(kind)))?;
    let rows = db::list_transactions(&conn, owner.id(), kind, date_range, limit)
        .map_err(ApiError::store(fetch_failed(kind)))?;
    Ok(Json(json!({ kind.collection(): rows })))
}

#[post("/api/<kind>", data = "<body>", rank = 2)]
fn create_transaction(
    owner: Owner,
    pool: &State<DbPool>,
    kind: TransactionKind,
    body: Result<Json<NewTransaction>, json::Error<'_>>,
) -> ApiResult<Json<Value>> {
    let txn = body.map_err(invalid_body)?.into_inner().validated()?;

    let conn = pool.get().map_err(ApiError::store(create_failed(kind)))?;
    let created = db::insert_transaction(&conn, owner.id(), kind, &txn)
        .map_err(ApiError::store(create_failed(kind)))?
        .ok_or_else(|| ApiError::validation(format!("Unknown {kind} category: {}", txn.category)))?;

    info!(owner = owner.id(), %kind, id = created.id, "transaction created");
    Ok(Json(json!({ kind.as_str(): created })))
}

#[delete("/api/<kind>/<id>", rank = 2)]
fn delete_transaction(
    owner: Owner,
    pool: &State<DbPool>,
    kind: TransactionKind,
    id: i64,
) -> ApiResult<Json<Value>> {
    let conn = pool.get().map_err(ApiError::store(delete_failed(kind)))?;
    let deleted = db::delete_transaction(&conn, owner.id(), kind, id)
        .map_err(ApiError::store(delete_failed(kind)))?;
    if !deleted {
        return Err(ApiError::NotFoundOrForbidden(delete_failed(kind)));
    }

    info!(owner = owner.id(), %kind, id, "transaction deleted");
    Ok(Json(json!({ "success": true })))
}

#[get("/api/categories?<query..>")]
fn list_categories(
    owner: Owner,
    pool: &State<DbPool>,
    query: CategoryQuery,
) -> ApiResult<Json<Value>> {
    let kind = query.kind()?;
    let conn = pool.get().map_err(ApiError::store("Failed to fetch categories"))?;
    let categories = db::list_categories(&conn, owner.id(), kind)
        .map_err(ApiError::store("Failed to fetch categories"))?;
    Ok(Json(json!({ "categories": categories })))
}

fn category_exists(name: &str) -> ApiError {
    ApiError::validation(format!("Category already exists: {name}"))
}

#[post("/api/categories", data = "<body>")]
fn create_category(
    owner: Owner,
    pool: &State<DbPool>,
    body: Result<Json<NewCategory>, json::Error<'_>>,
) -> ApiResult<Json<Value>> {
    let category = body.map_err(invalid_body)?.into_inner().validated()?;

    let conn = pool.get().map_err(ApiError::store("Failed to create category"))?;
    let created = db::insert_category(&conn, owner.id(), &category)
        .map_err(ApiError::store("Failed to create category"))?
        .ok_or_else(|| category_exists(&category.name))?;

    info!(owner = owner.id(), id = created.id, "category created");
    Ok(Json(json!({ "category": created })))
}

#[put("/api/categories/<id>", data = "<body>")]
fn update_category(
    owner: Owner,
    pool: &State<DbPool>,
    id: i64,
    body: Result<Json<NewCategory>, json::Error<'_>>,
) -> ApiResult<Json<Value>> {
    let category = body.map_err(invalid_body)?.into_inner().validated()?;

    let conn = pool.get().map_err(ApiError::store("Failed to update category"))?;
    let outcome = db::update_category(&conn, owner.id(), id, &category)
        .map_err(ApiError::store("Failed to update category"))?;
    match outcome {
        CategoryUpdate::Updated(updated) => Ok(Json(json!({ "category": updated }))),
        CategoryUpdate::NameTaken => Err(category_exists(&category.name)),
        CategoryUpdate::NotFound => Err(ApiError::NotFoundOrForbidden("Failed to update category")),
    }
}

#[delete("/api/categories/<id>")]
fn delete_category(owner: Owner, pool: &State<DbPool>, id: i64) -> ApiResult<Json<Value>> {
    let conn = pool.get().map_err(ApiError::store("Failed to delete category"))?;
    let deleted = db::delete_category(&conn, owner.id(), id)
        .map_err(ApiError::store("Failed to delete category"))?;
    if !deleted {
        return Err(ApiError::NotFoundOrForbidden("Failed to delete category"));
    }
    Ok(Json(json!({ "success": true })))
}

#[get("/api/analytics?<range..>")]
fn analytics(owner: Owner, pool: &State<DbPool>, range: RangeQuery) -> ApiResult<Json<Value>> {
    let today = dates::today();
    let selected = range.date_filter()?.range(today);
    let recent_window = trailing_window(today, DAILY_WINDOW_DAYS + 1);

    let conn = pool.get().map_err(ApiError::store("Failed to compute analytics"))?;
    let load = |kind, window| {
        db::list_transactions(&conn, owner.id(), kind, window, None)
            .map_err(ApiError::store("Failed to compute analytics"))
    };
    let expenses = load(TransactionKind::Expense, selected)?;
    let recent = load(TransactionKind::Expense, recent_window)?;
    let income = load(TransactionKind::Income, selected)?;

    let analytics = aggregate::analytics(&expenses, &recent, &income, today);
    Ok(Json(json!({ "analytics": analytics })))
}

#[get("/api/insights")]
async fn insights(
    owner: Owner,
    pool: &State<DbPool>,
    classifier: &State<SharedClassifier>,
) -> ApiResult<Json<Value>> {
    let classifier = classifier.inner().as_ref();
    let insight = generate_insight(pool.inner(), classifier, owner.id(), dates::today())
        .await
        .map_err(|err| match err {
            InsightError::Store(source) => ApiError::Store {
                message: "Failed to generate insights",
                source,
            },
            InsightError::Classifier(source) => ApiError::Classifier {
                message: "Failed to generate insights",
                source,
            },
        })?;
    Ok(Json(json!({ "insight": insight })))
}

async fn load_taxonomy(
    pool: &DbPool,
    owner: &str,
    kind: TransactionKind,
) -> Result<Vec<String>, StoreError> {
    let pool = pool.clone();
    let owner = owner.to_string();
    spawn_blocking(move || -> Result<Vec<String>, StoreError> {
        let conn = pool.get()?;
        Ok(db::category_names(&conn, &owner, kind)?)
    })
    .await?
}

fn default_taxonomy(kind: TransactionKind) -> Vec<String> {
    let defaults = match kind {
        TransactionKind::Expense => DEFAULT_EXPENSE_CATEGORIES,
        TransactionKind::Income => DEFAULT_INCOME_CATEGORIES,
    };
    defaults.iter().map(|(name, _)| name.to_string()).collect()
}

#[post("/api/categorize", data = "<body>")]
async fn categorize(
    owner: Owner,
    pool: &State<DbPool>,
    classifier: &State<SharedClassifier>,
    config: &State<AppConfig>,
    body: Result<Json<CategorizeRequest>, json::Error<'_>>,
) -> ApiResult<Json<Value>> {
    let request = body.map_err(invalid_body)?.into_inner();
    let description = request.description.trim();
    if description.is_empty() {
        return Err(ApiError::validation("Description is required"));
    }
    let kind = request.kind.unwrap_or(TransactionKind::Expense);

    let categories = match load_taxonomy(pool.inner(), owner.id(), kind).await {
        Ok(categories) => categories,
        Err(err) => {
            warn!(error = %err, "could not load categories, offering defaults");
            default_taxonomy(kind)
        }
    };

    let category = resolve_category(
        classifier.inner().as_ref(),
        description,
        kind,
        request.category.as_deref(),
        &categories,
        config.classifier.categorize_max_tokens,
    )
    .await;
    Ok(Json(json!({ "category": category })))
}

#[catch(401)]
fn unauthenticated() -> Json<Value> {
    Json(json!({ "error": ApiError::Unauthenticated.to_string() }))
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request<'_>) -> (Status, Json<Value>) {
    let message = status.reason().unwrap_or("Request failed");
    (status, Json(json!({ "error": message })))
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        list_transactions,
        create_transaction,
        delete_transaction,
        list_categories,
        create_category,
        update_category,
        delete_category,
        analytics,
        insights,
        categorize,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthenticated, default_catcher]
}
