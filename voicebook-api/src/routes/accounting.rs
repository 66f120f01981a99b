/// Bookkeeping endpoints
///
/// Free text goes in, a structured entry lands in the caller's ledger, and
/// the read endpoints aggregate it back out. Both Google sessions and bound
/// API tokens may call these; an unbound API token gets 403.
///
/// # Endpoints
///
/// - `POST /api/accounting/record` - Parse text and append an entry
/// - `POST /api/accounting/query` - Ask a question about this month
/// - `GET /api/accounting/stats` - Totals for one month
/// - `GET /api/accounting/stats/trend` - Totals for the last N months
/// - `GET /api/accounting/records` - Entries in a date range
/// - `GET /api/accounting/records/recent` - Most recent entries
/// - `GET /api/accounting/trend/daily` - Daily totals for the last N days
/// - `GET /api/accounting/categories` - The fixed category set (public)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicebook_shared::{
    assistant::{record_feedback, AnswerContext, ParseContext},
    auth::SessionIdentity,
    ledger::{
        entry::CATEGORIES, DailyTotal, LedgerEntry, LedgerRecord, MonthlyStats, PartitionKey,
    },
};

/// Records handed to the answerer as context
const CONTEXT_RECORDS: usize = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordRequest {
    #[validate(length(min = 1, max = 500, message = "text must be 1-500 characters"))]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    pub entry: LedgerEntry,

    /// Partition the entry was written to (`YYYY-MM`)
    pub partition: String,

    pub sheet_url: String,

    /// Omitted when the answerer was unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 500, message = "query must be 1-500 characters"))]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// `YYYY-MM`; defaults to the current month in the user's timezone
    pub month: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,

    #[serde(flatten)]
    pub stats: MonthlyStats,

    pub monthly_budget: Option<i64>,

    /// Fraction of the budget spent
    pub budget_usage: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrendQuery {
    #[validate(range(min = 1, max = 12, message = "months must be between 1 and 12"))]
    pub months: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendResponse {
    pub success: bool,
    pub months: Vec<MonthlyStats>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecentQuery {
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub success: bool,
    pub count: usize,
    pub records: Vec<LedgerRecord>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DailyTrendQuery {
    #[validate(range(min = 1, max = 90, message = "days must be between 1 and 90"))]
    pub days: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyTrendResponse {
    pub success: bool,
    pub days: Vec<DailyTotal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub success: bool,
    pub categories: Vec<String>,
}

/// Record an expense from free text
///
/// # Endpoint
///
/// ```text
/// POST /api/accounting/record
/// Authorization: Bearer <access token or API token>
///
/// { "text": "午餐 120" }
/// ```
///
/// # Errors
///
/// - `400 PARSE_FAILED`: The text could not be turned into an entry
/// - `403 TOKEN_NOT_LINKED`: API token not bound to a user
/// - `404 NOT_FOUND`: No ledger selected
/// - `502 LEDGER_WRITE_FAILED`: The spreadsheet rejected the append
///
/// Feedback is best effort and never fails a successful write.
pub async fn record(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<RecordRequest>,
) -> ApiResult<Json<RecordResponse>> {
    req.validate()?;
    let user_id = identity.require_user()?;
    let user = state.user(user_id).await?;
    let tz = user.tz();

    let context = ParseContext {
        now: Utc::now().with_timezone(&tz),
        default_currency: state.config.ledger.default_currency.clone(),
    };
    let entry = state.parser.parse(req.text.trim(), &context).await?;
    entry
        .validate()
        .map_err(|message| ApiError::invalid_field("text", message))?;

    let (binding, ledger) = state.ledger_for(user_id).await?;
    let partition = state.ledger.append(&ledger, &entry).await?;

    let feedback = match state.ledger.monthly_stats(&ledger, partition).await {
        Ok(stats) => {
            let extras = AnswerContext {
                monthly_budget: user.monthly_budget,
                recent_records: Vec::new(),
                timezone: Some(user.timezone.clone()),
            };
            record_feedback(state.answerer.as_ref(), &entry, &stats, &extras).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not load stats for feedback");
            None
        }
    };

    tracing::info!(
        user_id = %user_id,
        partition = %partition,
        category = %entry.category,
        "Entry recorded"
    );

    Ok(Json(RecordResponse {
        success: true,
        entry,
        partition: partition.to_string(),
        sheet_url: binding.ledger_url,
        feedback,
    }))
}

/// Answer a question about this month's spending
pub async fn query(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    req.validate()?;
    let user_id = identity.require_user()?;
    let user = state.user(user_id).await?;
    let tz = user.tz();

    let (_, ledger) = state.ledger_for(user_id).await?;
    let month = PartitionKey::current(tz);
    let (stats, recent_records) = tokio::try_join!(
        state.ledger.monthly_stats(&ledger, month),
        state.ledger.recent_records(&ledger, CONTEXT_RECORDS, tz),
    )?;

    let extras = AnswerContext {
        monthly_budget: user.monthly_budget,
        recent_records,
        timezone: Some(user.timezone.clone()),
    };
    let answer = state.answerer.answer(req.query.trim(), &stats, &extras).await?;

    Ok(Json(QueryResponse {
        success: true,
        answer,
    }))
}

/// Totals for one month, with budget usage
pub async fn monthly_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let user_id = identity.require_user()?;
    let user = state.user(user_id).await?;

    let month = match query.month.as_deref() {
        Some(month) => month.parse::<PartitionKey>()?,
        None => PartitionKey::current(user.tz()),
    };

    let (_, ledger) = state.ledger_for(user_id).await?;
    let stats = state.ledger.monthly_stats(&ledger, month).await?;
    let budget_usage = stats.budget_usage(user.monthly_budget);

    Ok(Json(StatsResponse {
        success: true,
        stats,
        monthly_budget: user.monthly_budget,
        budget_usage,
    }))
}

/// Totals for the last N months (default 6), oldest first
pub async fn stats_trend(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Json<TrendResponse>> {
    query.validate()?;
    let user_id = identity.require_user()?;
    let tz = state.user_tz(user_id).await?;

    let keys = PartitionKey::current(tz).trailing(query.months.unwrap_or(6));
    let (_, ledger) = state.ledger_for(user_id).await?;
    let months = state.ledger.multi_month_stats(&ledger, &keys).await?;

    Ok(Json(TrendResponse {
        success: true,
        months,
    }))
}

/// Entries dated within `[start, end]`, oldest first
pub async fn records_in_range(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<RecordsResponse>> {
    let user_id = identity.require_user()?;
    let start = parse_date("start", &query.start)?;
    let end = parse_date("end", &query.end)?;

    let (_, ledger) = state.ledger_for(user_id).await?;
    let records = state.ledger.records_in_range(&ledger, start, end).await?;

    Ok(Json(RecordsResponse {
        success: true,
        count: records.len(),
        records,
    }))
}

/// Most recent entries (default 10), newest first
pub async fn recent_records(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<RecordsResponse>> {
    query.validate()?;
    let user_id = identity.require_user()?;
    let tz = state.user_tz(user_id).await?;

    let (_, ledger) = state.ledger_for(user_id).await?;
    let records = state
        .ledger
        .recent_records(&ledger, query.limit.unwrap_or(10), tz)
        .await?;

    Ok(Json(RecordsResponse {
        success: true,
        count: records.len(),
        records,
    }))
}

/// Daily totals for the last N days (default 7), zero-filled
pub async fn daily_trend(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<DailyTrendQuery>,
) -> ApiResult<Json<DailyTrendResponse>> {
    query.validate()?;
    let user_id = identity.require_user()?;
    let tz = state.user_tz(user_id).await?;

    let (_, ledger) = state.ledger_for(user_id).await?;
    let days = state
        .ledger
        .daily_trend(&ledger, query.days.unwrap_or(7), tz)
        .await?;

    Ok(Json(DailyTrendResponse {
        success: true,
        days,
    }))
}

pub async fn categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        success: true,
        categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
    })
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_field(field, "expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("start", "2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(
            parse_date("start", "2024/02/29"),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_query_limits() {
        assert!(RecentQuery { limit: Some(101) }.validate().is_err());
        assert!(RecentQuery { limit: None }.validate().is_ok());
        assert!(DailyTrendQuery { days: Some(90) }.validate().is_ok());
        assert!(DailyTrendQuery { days: Some(0) }.validate().is_err());
        assert!(TrendQuery { months: Some(13) }.validate().is_err());
    }
}
