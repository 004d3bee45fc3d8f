//! Copy-generation quota routes

use axum::extract::{Path, State};
use axum::Json;

use copyspark_billing::CopyAllowance;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn check_allowance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CopyAllowance>> {
    let allowance = state.billing.quota.check_allowance(&user_id).await?;
    Ok(Json(allowance))
}
