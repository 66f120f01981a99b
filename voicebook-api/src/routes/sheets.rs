/// Ledger binding endpoints
///
/// A user keeps their ledger in one spreadsheet of their own. These
/// endpoints create, pick or link that spreadsheet. They act on the user's
/// Drive, so only a Google session may call them.
///
/// # Endpoints
///
/// - `GET /api/sheets/list` - Spreadsheets the user can choose from
/// - `GET /api/sheets/my-sheet` - Current binding, if any
/// - `POST /api/sheets/create` - Create a new ledger and bind it
/// - `POST /api/sheets/select` - Bind an existing spreadsheet by id
/// - `POST /api/sheets/link` - Bind an existing spreadsheet by URL

use crate::{
    app::{require_session_login, AppState},
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicebook_shared::{
    auth::SessionIdentity,
    ledger::{
        sheets::{extract_ledger_id, ledger_url, LedgerSummary},
        LedgerRef,
    },
    models::ledger_binding::{LedgerBinding, DEFAULT_LEDGER_NAME},
};

/// Title used for spreadsheets created without one
pub const DEFAULT_LEDGER_TITLE: &str = "語音記帳";

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateLedgerRequest {
    #[validate(length(max = 100, message = "title must be at most 100 characters"))]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectLedgerRequest {
    #[validate(length(min = 1, message = "sheet_id is required"))]
    pub sheet_id: String,

    pub sheet_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LinkLedgerRequest {
    #[validate(length(min = 1, message = "sheet_url is required"))]
    pub sheet_url: String,
}

/// Binding as shown to the frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct SheetInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl From<LedgerBinding> for SheetInfo {
    fn from(binding: LedgerBinding) -> Self {
        Self {
            id: binding.ledger_id,
            name: binding.ledger_name,
            url: binding.ledger_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SheetResponse {
    pub success: bool,
    pub sheet: Option<SheetInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLedgerResponse {
    pub success: bool,

    /// False when an existing binding was returned unchanged
    pub created: bool,

    pub sheet: SheetInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListLedgersResponse {
    pub success: bool,
    pub sheets: Vec<LedgerSummary>,
}

pub async fn list_ledgers(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<ListLedgersResponse>> {
    let user_id = require_session_login(&identity)?;
    let access_token = state.access_token(user_id).await?;
    let sheets = state.ledger.list_ledgers(&access_token).await?;

    Ok(Json(ListLedgersResponse {
        success: true,
        sheets,
    }))
}

/// Current binding; `sheet` is null when none is set
pub async fn my_ledger(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<SheetResponse>> {
    let user_id = require_session_login(&identity)?;
    let binding = state.store.find_ledger_binding(user_id).await?;

    Ok(Json(SheetResponse {
        success: true,
        sheet: binding.map(SheetInfo::from),
    }))
}

/// Create a ledger spreadsheet and bind it
///
/// Returns the existing binding unchanged if the user already has one.
pub async fn create_ledger(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<CreateLedgerRequest>,
) -> ApiResult<Json<CreateLedgerResponse>> {
    req.validate()?;
    let user_id = require_session_login(&identity)?;

    if let Some(existing) = state.store.find_ledger_binding(user_id).await? {
        return Ok(Json(CreateLedgerResponse {
            success: true,
            created: false,
            sheet: existing.into(),
        }));
    }

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_LEDGER_TITLE);

    let tz = state.user_tz(user_id).await?;
    let access_token = state.access_token(user_id).await?;
    let created = state.ledger.create_ledger(&access_token, title, tz).await?;

    let binding = state
        .store
        .save_ledger_binding(&LedgerBinding {
            user_id: user_id.to_string(),
            ledger_id: created.id,
            ledger_url: created.url,
            ledger_name: created.name,
            updated_at: Utc::now(),
        })
        .await?;

    Ok(Json(CreateLedgerResponse {
        success: true,
        created: true,
        sheet: binding.into(),
    }))
}

/// Bind an existing spreadsheet by id
///
/// # Errors
///
/// - `502 SHEETS_ERROR`: The spreadsheet cannot be read with the user's credential
pub async fn select_ledger(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<SelectLedgerRequest>,
) -> ApiResult<Json<SheetResponse>> {
    req.validate()?;
    let user_id = require_session_login(&identity)?;

    let binding = bind(&state, user_id, req.sheet_id.trim(), req.sheet_name).await?;
    Ok(Json(SheetResponse {
        success: true,
        sheet: Some(binding.into()),
    }))
}

/// Bind an existing spreadsheet by its share URL
pub async fn link_ledger(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<LinkLedgerRequest>,
) -> ApiResult<Json<SheetResponse>> {
    req.validate()?;
    let user_id = require_session_login(&identity)?;

    let ledger_id = extract_ledger_id(req.sheet_url.trim())
        .ok_or_else(|| ApiError::invalid_field("sheet_url", "無效的 Google Sheets 網址"))?;

    let binding = bind(&state, user_id, ledger_id, None).await?;
    Ok(Json(SheetResponse {
        success: true,
        sheet: Some(binding.into()),
    }))
}

async fn bind(
    state: &AppState,
    user_id: &str,
    ledger_id: &str,
    name: Option<String>,
) -> ApiResult<LedgerBinding> {
    let access_token = state.access_token(user_id).await?;
    state
        .ledger
        .verify_access(&LedgerRef::new(ledger_id, access_token))
        .await?;

    let binding = state
        .store
        .save_ledger_binding(&LedgerBinding {
            user_id: user_id.to_string(),
            ledger_id: ledger_id.to_string(),
            ledger_url: ledger_url(ledger_id),
            ledger_name: name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LEDGER_NAME.to_string()),
            updated_at: Utc::now(),
        })
        .await?;

    tracing::info!(user_id = %user_id, ledger_id = %ledger_id, "Ledger bound");
    Ok(binding)
}
