use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use common_claims::{ClaimsError, ClaimsMap, ClaimsUpdate, ProviderError, StaffRole};
use common_http_errors::{ApiError, ApiResult};
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::AdminAuth;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRoleRequest {
    pub facility_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRoleRequest {
    pub facility_id: String,
    pub patient_id: String,
    pub date_of_birth: String,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn assign_staff_role(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(identity_id): Path<String>,
    payload: Result<Json<StaffRoleRequest>, JsonRejection>,
) -> ApiResult<Json<ClaimsUpdate>> {
    let request = json_body(payload)?;
    let role = request
        .role
        .as_deref()
        .map(str::parse::<StaffRole>)
        .transpose()
        .map_err(|err| ApiError::bad_request("invalid_role", err.to_string()))?;

    let update = state
        .manager
        .assign_staff_role(&identity_id, &request.facility_id, role)
        .await
        .map_err(claims_error)?;
    Ok(Json(update))
}

pub async fn assign_patient_role(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(identity_id): Path<String>,
    payload: Result<Json<PatientRoleRequest>, JsonRejection>,
) -> ApiResult<Json<ClaimsUpdate>> {
    let request = json_body(payload)?;
    let update = state
        .manager
        .assign_patient_role(
            &identity_id,
            &request.facility_id,
            &request.patient_id,
            &request.date_of_birth,
        )
        .await
        .map_err(claims_error)?;
    Ok(Json(update))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(identity_id): Path<String>,
) -> ApiResult<Json<ClaimsUpdate>> {
    let update = state
        .manager
        .revoke_role(&identity_id)
        .await
        .map_err(claims_error)?;
    Ok(Json(update))
}

pub async fn read_role(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(identity_id): Path<String>,
) -> ApiResult<Json<ClaimsMap>> {
    let claims = state
        .manager
        .read_role(&identity_id)
        .await
        .map_err(claims_error)?;
    Ok(Json(claims))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request("invalid_body", rejection.body_text()))
}

fn claims_error(err: ClaimsError) -> ApiError {
    match err {
        ClaimsError::InvalidIdentityId(id) => ApiError::bad_request(
            "invalid_identity_id",
            format!("identity id '{id}' cannot address a mirror document"),
        ),
        ClaimsError::Provider(ProviderError::NotFound(id)) => ApiError::NotFound {
            code: "identity_not_found",
            message: Some(format!("identity '{id}' not found")),
        },
        ClaimsError::Provider(err) => ApiError::bad_gateway("provider_error", err),
        ClaimsError::Store(err) => ApiError::bad_gateway("store_error", err),
    }
}
