/// User settings endpoints
///
/// # Endpoints
///
/// - `GET /api/auth/settings/timezones` - Common timezones (public)
/// - `GET|PUT /api/auth/settings/timezone` - The caller's timezone
/// - `GET|PUT /api/auth/settings/budget` - The caller's monthly budget

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicebook_shared::auth::SessionIdentity;

/// Timezones offered in the settings picker
pub const COMMON_TIMEZONES: [&str; 13] = [
    "Asia/Taipei",
    "Asia/Tokyo",
    "Asia/Shanghai",
    "Asia/Hong_Kong",
    "Asia/Singapore",
    "America/New_York",
    "America/Los_Angeles",
    "America/Chicago",
    "Europe/London",
    "Europe/Paris",
    "Europe/Berlin",
    "Australia/Sydney",
    "Pacific/Auckland",
];

#[derive(Debug, Serialize, Deserialize)]
pub struct TimezonesResponse {
    pub success: bool,
    pub timezones: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimezoneResponse {
    pub success: bool,
    pub timezone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTimezoneRequest {
    #[validate(length(min = 1, message = "timezone is required"))]
    pub timezone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetResponse {
    pub success: bool,
    pub monthly_budget: Option<i64>,
}

/// A null budget clears it
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBudgetRequest {
    #[validate(range(min = 0, message = "預算不能為負數"))]
    pub monthly_budget: Option<i64>,
}

pub async fn list_timezones() -> Json<TimezonesResponse> {
    Json(TimezonesResponse {
        success: true,
        timezones: COMMON_TIMEZONES.iter().map(|tz| tz.to_string()).collect(),
    })
}

pub async fn get_timezone(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<TimezoneResponse>> {
    let user = state.user(identity.require_user()?).await?;

    Ok(Json(TimezoneResponse {
        success: true,
        timezone: user.timezone,
    }))
}

/// Update the caller's timezone
///
/// # Errors
///
/// - `422 VALIDATION_ERROR`: Not an IANA timezone name
pub async fn update_timezone(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<UpdateTimezoneRequest>,
) -> ApiResult<Json<TimezoneResponse>> {
    req.validate()?;
    let user_id = identity.require_user()?;

    let timezone = req.timezone.trim();
    if timezone.parse::<Tz>().is_err() {
        return Err(ApiError::invalid_field(
            "timezone",
            format!("無效的時區: {}", timezone),
        ));
    }

    let user = state
        .store
        .update_user_timezone(user_id, timezone)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user_id, timezone = %user.timezone, "Timezone updated");

    Ok(Json(TimezoneResponse {
        success: true,
        timezone: user.timezone,
    }))
}

pub async fn get_budget(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<BudgetResponse>> {
    let user = state.user(identity.require_user()?).await?;

    Ok(Json(BudgetResponse {
        success: true,
        monthly_budget: user.monthly_budget,
    }))
}

/// Set or clear the caller's monthly budget
pub async fn update_budget(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<UpdateBudgetRequest>,
) -> ApiResult<Json<BudgetResponse>> {
    req.validate()?;
    let user_id = identity.require_user()?;

    let user = state
        .store
        .update_user_budget(user_id, req.monthly_budget)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(BudgetResponse {
        success: true,
        monthly_budget: user.monthly_budget,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_timezones_are_valid() {
        for name in COMMON_TIMEZONES {
            assert!(name.parse::<Tz>().is_ok(), "{} should parse", name);
        }
    }

    #[test]
    fn test_negative_budget_rejected() {
        let req = UpdateBudgetRequest {
            monthly_budget: Some(-1),
        };
        assert!(req.validate().is_err());

        let cleared = UpdateBudgetRequest { monthly_budget: None };
        assert!(cleared.validate().is_ok());
    }
}
